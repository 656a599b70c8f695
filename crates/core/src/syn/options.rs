use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::err::Error;
use crate::syn::locale::DEFAULT_LOCALE_ID;

/// How cell references are written in formula text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceStyle {
	#[default]
	A1,
	R1C1,
}

/// Options accepted by the formula lexing and parsing entrypoints.
///
/// Two shapes are accepted on the wire: the current
/// `{ localeId?, referenceStyle? }` form, and the legacy full form
/// `{ locale, reference_style, normalize_relative_to }`. Anything else is
/// rejected before a request is sent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference_style: Option<ReferenceStyle>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub normalize_relative_to: Option<String>,
}

/// The message every malformed options object is rejected with. Callers
/// match on the prefix to distinguish shape errors from engine errors.
pub const OPTIONS_SHAPE_MESSAGE: &str =
	"options must be { localeId?: string, referenceStyle?: \"A1\" | \"R1C1\" }";

impl ParseOptions {
	pub fn locale_id(&self) -> &str {
		self.locale_id.as_deref().unwrap_or(DEFAULT_LOCALE_ID)
	}

	pub fn reference_style(&self) -> ReferenceStyle {
		self.reference_style.unwrap_or_default()
	}

	/// Validate and normalize an options value supplied by a caller.
	///
	/// `None` and `null` mean defaults. An object is accepted if it is the
	/// current camelCase shape or the legacy snake_case full shape; any
	/// other shape (for example a misspelled `localeID`) fails with a
	/// message starting with [`OPTIONS_SHAPE_MESSAGE`].
	pub fn from_value(value: Option<&Json>) -> Result<ParseOptions, Error> {
		let value = match value {
			None | Some(Json::Null) => return Ok(ParseOptions::default()),
			Some(v) => v,
		};
		let obj = match value.as_object() {
			Some(obj) => obj,
			None => return Err(shape_error("expected an object")),
		};
		let mut out = ParseOptions::default();
		for (key, v) in obj {
			match key.as_str() {
				"localeId" | "locale" => match v {
					Json::Null => {}
					Json::String(s) => out.locale_id = Some(s.clone()),
					_ => return Err(shape_error("localeId must be a string")),
				},
				"referenceStyle" | "reference_style" => match v {
					Json::Null => {}
					Json::String(s) if s == "A1" => {
						out.reference_style = Some(ReferenceStyle::A1)
					}
					Json::String(s) if s == "R1C1" => {
						out.reference_style = Some(ReferenceStyle::R1C1)
					}
					_ => return Err(shape_error("referenceStyle must be \"A1\" or \"R1C1\"")),
				},
				"normalize_relative_to" | "normalizeRelativeTo" => match v {
					Json::Null => {}
					Json::String(s) => out.normalize_relative_to = Some(s.clone()),
					_ => return Err(shape_error("normalize_relative_to must be a string")),
				},
				other => {
					return Err(shape_error(&format!("unknown field `{other}`")));
				}
			}
		}
		Ok(out)
	}
}

fn shape_error(detail: &str) -> Error {
	Error::Thrown(format!("{OPTIONS_SHAPE_MESSAGE}; {detail}"))
}
