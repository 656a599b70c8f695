use serde_json::{json, Value as Json};

use gridbook_core::rpc::method::Method;

use crate::method::from_json;
use crate::opt::{self, CallOptions, CursorOrOptions};
use crate::{Engine, Result};

impl Engine {
	pub async fn supported_locale_ids(&self) -> Result<Vec<String>> {
		from_json(
			self.call(Method::SupportedLocaleIds, Json::Null, None, CallOptions::default())
				.await?,
		)
	}

	pub async fn get_locale_info(&self, locale_id: &str) -> Result<Json> {
		let params = json!({ "localeId": locale_id });
		self.call(Method::GetLocaleInfo, params, None, CallOptions::default()).await
	}

	/// Lex a complete formula into tokens.
	///
	/// A malformed options object rejects here, before anything is sent.
	pub async fn lex_formula(&self, formula: &str, options: Option<Json>) -> Result<Json> {
		let options = opt::validate_options(options.as_ref())?;
		let params = json!({ "formula": formula, "options": options });
		self.call(Method::LexFormula, params, None, CallOptions::default()).await
	}

	/// Lex a formula still being typed, keeping error tokens. The second
	/// argument takes either a cursor offset or an options object.
	pub async fn lex_formula_partial(
		&self,
		formula: &str,
		cursor: impl Into<CursorOrOptions>,
		options: Option<Json>,
	) -> Result<Json> {
		let (cursor, options) = opt::disambiguate(cursor.into(), options.as_ref())?;
		let params = json!({ "formula": formula, "cursor": cursor, "options": options });
		self.call(Method::LexFormulaPartial, params, None, CallOptions::default()).await
	}

	/// Report the call context at a cursor inside a partial formula.
	pub async fn parse_formula_partial(
		&self,
		formula: &str,
		cursor: impl Into<CursorOrOptions>,
		options: Option<Json>,
	) -> Result<Json> {
		let (cursor, options) = opt::disambiguate(cursor.into(), options.as_ref())?;
		let params = json!({ "formula": formula, "cursor": cursor, "options": options });
		self.call(Method::ParseFormulaPartial, params, None, CallOptions::default()).await
	}
}
