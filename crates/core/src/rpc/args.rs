use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::exe::CellUpdate;
use crate::rpc::method::Method;
use crate::rpc::rpc_error::RpcError;
use crate::wbk::address::Address;
use crate::wbk::ops::EditOp;
use crate::wbk::style::FormatRun;

/// Deserialize a method's params object, naming the method in the failure
/// message so callers can see which field was at fault.
pub fn take<T>(method: Method, params: Json) -> Result<T, RpcError>
where
	T: DeserializeOwned,
{
	// absent params mean an empty object
	let params = match params {
		Json::Null => Json::Object(Default::default()),
		other => other,
	};
	serde_json::from_value(params)
		.map_err(|e| RpcError::InvalidParams(format!("{}: {e}", method.to_str())))
}

#[derive(Debug, Deserialize)]
pub struct SetCellsParams {
	pub updates: Vec<CellUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct CellValueParams {
	#[serde(default)]
	pub sheet: Option<String>,
	pub address: String,
	pub value: Json,
}

#[derive(Debug, Deserialize)]
pub struct SetRangeParams {
	#[serde(default)]
	pub sheet: Option<String>,
	pub range: String,
	pub values: Vec<Vec<Json>>,
}

#[derive(Debug, Deserialize)]
pub struct SheetParams {
	#[serde(default)]
	pub sheet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetCellParams {
	pub address: String,
	#[serde(default)]
	pub sheet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetRangeParams {
	pub range: String,
	#[serde(default)]
	pub sheet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InternStyleParams {
	pub style: Json,
}

/// Params for `setCellStyleId`.
///
/// A `null` style id means "clear the style". Alongside the canonical
/// object shape, the positional shapes of both current (sheet-first) and
/// legacy (sheet-last) kernel signatures are accepted; the legacy shape is
/// detected by probing whether the first element is an address.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCellStyleIdParams {
	#[serde(default)]
	pub sheet: Option<String>,
	pub address: String,
	pub style_id: Option<u32>,
}

impl SetCellStyleIdParams {
	pub fn from_params(params: Json) -> Result<Self, RpcError> {
		match params {
			Json::Array(items) => Self::from_positional(items),
			other => take(Method::SetCellStyleId, other),
		}
	}

	fn from_positional(items: Vec<Json>) -> Result<Self, RpcError> {
		let invalid = || {
			RpcError::InvalidParams(
				"setCellStyleId: expected [sheet, address, styleId] or [address, styleId, sheet]"
					.to_owned(),
			)
		};
		if items.len() != 3 {
			return Err(invalid());
		}
		let first_is_address =
			items[0].as_str().map(|s| Address::parse(s).is_ok()).unwrap_or(false);
		let (sheet, address, style_id) = if first_is_address {
			// legacy sheet-last signature
			(items[2].clone(), items[0].clone(), items[1].clone())
		} else {
			(items[0].clone(), items[1].clone(), items[2].clone())
		};
		let address = address.as_str().ok_or_else(invalid)?.to_owned();
		let sheet = match sheet {
			Json::Null => None,
			Json::String(s) => Some(s),
			_ => return Err(invalid()),
		};
		let style_id = match style_id {
			Json::Null => None,
			Json::Number(n) => Some(n.as_u64().ok_or_else(invalid)? as u32),
			_ => return Err(invalid()),
		};
		Ok(SetCellStyleIdParams {
			sheet,
			address,
			style_id,
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowStyleParams {
	pub sheet: String,
	pub row: u32,
	pub style_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColStyleParams {
	pub sheet: String,
	pub col: u32,
	pub style_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetStyleParams {
	pub sheet: String,
	pub style_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ColWidthParams {
	pub sheet: String,
	pub col: u32,
	pub width: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColWidthCharsParams {
	pub sheet: String,
	pub col: u32,
	pub width_chars: f64,
}

#[derive(Debug, Deserialize)]
pub struct ColHiddenParams {
	pub sheet: String,
	pub col: u32,
	pub hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct FormatRunsParams {
	pub sheet: String,
	pub col: u32,
	pub runs: Vec<FormatRun>,
}

#[derive(Debug, Deserialize)]
pub struct SheetDimensionsParams {
	pub sheet: String,
	pub rows: u32,
	pub cols: u32,
}

#[derive(Debug, Deserialize)]
pub struct SheetOriginParams {
	pub sheet: String,
	pub origin: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyOperationParams {
	pub op: EditOp,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSeekParams {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sheet: Option<String>,
	pub target_cell: String,
	pub target_value: f64,
	pub changing_cell: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub derivative_step: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SetEngineInfoParams {
	pub info: Json,
}

#[derive(Debug, Deserialize)]
pub struct LoadEncryptedParams {
	pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct FormulaParams {
	pub formula: String,
	#[serde(default)]
	pub cursor: Option<usize>,
	#[serde(default)]
	pub options: Option<Json>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleInfoParams {
	pub locale_id: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn take_names_the_method_on_failure() {
		let err =
			take::<SetCellsParams>(Method::SetCells, json!({"updates": "nope"})).unwrap_err();
		assert!(err.to_string().contains("setCells"));
	}

	#[test]
	fn style_params_accept_object_shape() {
		let p = SetCellStyleIdParams::from_params(
			json!({"sheet": "Sheet1", "address": "A1", "styleId": 3}),
		)
		.unwrap();
		assert_eq!(p.sheet.as_deref(), Some("Sheet1"));
		assert_eq!(p.style_id, Some(3));
	}

	#[test]
	fn style_params_accept_sheet_first_positional() {
		let p = SetCellStyleIdParams::from_params(json!(["Sheet1", "B2", 4])).unwrap();
		assert_eq!(p.sheet.as_deref(), Some("Sheet1"));
		assert_eq!(p.address, "B2");
		assert_eq!(p.style_id, Some(4));
	}

	#[test]
	fn style_params_probe_legacy_sheet_last() {
		let p = SetCellStyleIdParams::from_params(json!(["B2", 4, "Sheet1"])).unwrap();
		assert_eq!(p.sheet.as_deref(), Some("Sheet1"));
		assert_eq!(p.address, "B2");
		assert_eq!(p.style_id, Some(4));
	}

	#[test]
	fn null_style_id_means_clear() {
		let p = SetCellStyleIdParams::from_params(
			json!({"sheet": "Sheet1", "address": "A1", "styleId": null}),
		)
		.unwrap();
		assert_eq!(p.style_id, None);
	}
}
