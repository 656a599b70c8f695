use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A scalar or rich value held by a cell.
///
/// Scalar values map one-to-one onto the JSON wire values; a rich value is
/// an opaque object produced and consumed by the kernel (formatted text
/// runs, entities and the like).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
	Null,
	Bool(bool),
	Number(f64),
	Text(String),
	Rich(Json),
}

impl Default for CellValue {
	fn default() -> Self {
		CellValue::Null
	}
}

impl CellValue {
	pub fn is_null(&self) -> bool {
		matches!(self, CellValue::Null)
	}

	/// Convert a JSON wire value into a cell value. `null` clears.
	pub fn from_json(v: &Json) -> Self {
		match v {
			Json::Null => CellValue::Null,
			Json::Bool(b) => CellValue::Bool(*b),
			Json::Number(n) => CellValue::Number(n.as_f64().unwrap_or(0.0)),
			Json::String(s) => CellValue::Text(s.clone()),
			other => CellValue::Rich(other.clone()),
		}
	}

	/// Render the value back onto the wire. Cleared cells are explicit
	/// `null`, never absent, so deltas can be applied positionally.
	pub fn to_json(&self) -> Json {
		match self {
			CellValue::Null => Json::Null,
			CellValue::Bool(b) => Json::Bool(*b),
			CellValue::Number(n) => serde_json::Number::from_f64(*n)
				.map(Json::Number)
				.unwrap_or(Json::Null),
			CellValue::Text(s) => Json::String(s.clone()),
			CellValue::Rich(v) => v.clone(),
		}
	}
}

/// One stored cell: the raw input (formula source or literal) and the
/// computed value, plus an optional interned style.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input: Option<String>,
	pub value: CellValue,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub style_id: Option<u32>,
}

impl Cell {
	pub fn is_empty(&self) -> bool {
		self.input.is_none() && self.value.is_null() && self.style_id.is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn json_round_trip() {
		for v in [json!(null), json!(true), json!(1.5), json!("x"), json!({"runs": []})] {
			assert_eq!(CellValue::from_json(&v).to_json(), v);
		}
	}

	#[test]
	fn null_clears() {
		assert!(CellValue::from_json(&json!(null)).is_null());
	}
}
