use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::err::Error;

/// Host metadata exposed to workbook functions that report on the
/// environment (system name, release, available memory and the like).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineInfo {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub directory: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub osversion: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub memavail: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub totmem: Option<f64>,
}

impl EngineInfo {
	/// Merge an update into this record, validating every field before any
	/// of them is applied. A rejected update leaves the prior state
	/// untouched. Empty strings clear a field back to its default; numeric
	/// fields must be finite.
	pub fn merge(&self, update: &Json) -> Result<EngineInfo, Error> {
		let obj = update.as_object().ok_or_else(|| Error::InvalidField {
			field: "info".to_owned(),
			message: "expected an object".to_owned(),
		})?;
		let mut next = self.clone();
		for (key, value) in obj {
			match key.as_str() {
				"directory" => next.directory = string_field(key, value)?,
				"osversion" => next.osversion = string_field(key, value)?,
				"release" => next.release = string_field(key, value)?,
				"system" => next.system = string_field(key, value)?,
				"memavail" => next.memavail = number_field(key, value)?,
				"totmem" => next.totmem = number_field(key, value)?,
				_ => {
					return Err(Error::InvalidField {
						field: key.clone(),
						message: "unknown engine info field".to_owned(),
					})
				}
			}
		}
		Ok(next)
	}
}

fn string_field(field: &str, value: &Json) -> Result<Option<String>, Error> {
	match value {
		Json::Null => Ok(None),
		Json::String(s) if s.is_empty() => Ok(None),
		Json::String(s) => Ok(Some(s.clone())),
		_ => Err(Error::InvalidField {
			field: field.to_owned(),
			message: "expected a string".to_owned(),
		}),
	}
}

fn number_field(field: &str, value: &Json) -> Result<Option<f64>, Error> {
	match value {
		Json::Null => Ok(None),
		Json::String(s) if s.is_empty() => Ok(None),
		Json::Number(n) => match n.as_f64() {
			Some(v) if v.is_finite() => Ok(Some(v)),
			_ => Err(Error::InvalidField {
				field: field.to_owned(),
				message: "must be a finite number".to_owned(),
			}),
		},
		_ => Err(Error::InvalidField {
			field: field.to_owned(),
			message: "must be a finite number".to_owned(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn merge_applies_valid_updates() {
		let info = EngineInfo::default();
		let next = info.merge(&json!({"system": "pcdos", "memavail": 1024.0})).unwrap();
		assert_eq!(next.system.as_deref(), Some("pcdos"));
		assert_eq!(next.memavail, Some(1024.0));
	}

	#[test]
	fn invalid_number_rejects_whole_update() {
		let info = EngineInfo {
			system: Some("pcdos".to_owned()),
			..Default::default()
		};
		// one bad field rejects the update without mutating prior state
		let res = info.merge(&json!({"system": "other", "totmem": "lots"}));
		assert!(res.is_err());
		assert_eq!(info.system.as_deref(), Some("pcdos"));
	}

	#[test]
	fn empty_string_clears() {
		let info = EngineInfo {
			release: Some("12.0".to_owned()),
			memavail: Some(5.0),
			..Default::default()
		};
		let next = info.merge(&json!({"release": "", "memavail": ""})).unwrap();
		assert!(next.release.is_none());
		assert!(next.memavail.is_none());
	}
}
