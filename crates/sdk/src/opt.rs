use std::time::Duration;

use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use gridbook_core::syn::options::ParseOptions;

use crate::err::{Error, ErrorKind};
use crate::Result;

/// Per-call options: an abort signal and a time budget.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
	pub signal: Option<CancellationToken>,
	pub timeout: Option<Duration>,
}

impl CallOptions {
	pub fn new() -> Self {
		CallOptions::default()
	}

	pub fn with_signal(mut self, signal: CancellationToken) -> Self {
		self.signal = Some(signal);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}

/// Connection configuration for [`crate::connect`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
	/// The kernel module the worker should load.
	pub module_url: String,
	/// An explicit kernel binary, when the module does not embed one.
	pub binary_url: Option<String>,
	/// How long to wait for the ready handshake; the crate default
	/// applies when unset.
	pub timeout: Option<Duration>,
	/// Aborts the handshake when fired.
	pub signal: Option<CancellationToken>,
}

impl EngineConfig {
	pub fn new(module_url: impl Into<String>) -> Self {
		EngineConfig {
			module_url: module_url.into(),
			binary_url: None,
			timeout: None,
			signal: None,
		}
	}

	pub fn with_binary_url(mut self, url: impl Into<String>) -> Self {
		self.binary_url = Some(url.into());
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn with_signal(mut self, signal: CancellationToken) -> Self {
		self.signal = Some(signal);
		self
	}
}

/// The second positional argument of the partial formula entrypoints:
/// either a cursor offset or a parse-options object.
#[derive(Clone, Debug, Default)]
pub enum CursorOrOptions {
	#[default]
	None,
	Cursor(usize),
	Options(Json),
}

impl From<usize> for CursorOrOptions {
	fn from(cursor: usize) -> Self {
		CursorOrOptions::Cursor(cursor)
	}
}

impl From<Option<usize>> for CursorOrOptions {
	fn from(cursor: Option<usize>) -> Self {
		match cursor {
			Some(cursor) => CursorOrOptions::Cursor(cursor),
			None => CursorOrOptions::None,
		}
	}
}

impl From<Json> for CursorOrOptions {
	fn from(options: Json) -> Self {
		CursorOrOptions::Options(options)
	}
}

/// Split the overloaded (cursor, options) argument pair into its parts,
/// validating the options object before anything goes on the wire.
pub(crate) fn disambiguate(
	second: CursorOrOptions,
	options: Option<&Json>,
) -> Result<(Option<usize>, Option<Json>)> {
	match second {
		CursorOrOptions::Cursor(cursor) => {
			Ok((Some(cursor), validate_options(options)?))
		}
		CursorOrOptions::Options(value) => {
			if options.is_some() {
				return Err(ErrorKind::Validation
					.with_message("options were passed in both argument positions"));
			}
			Ok((None, validate_options(Some(&value))?))
		}
		CursorOrOptions::None => Ok((None, validate_options(options)?)),
	}
}

/// Validate a parse-options value client-side. A malformed object fails
/// here, synchronously, and nothing is sent. A call-options object passed
/// in the parse-options slot by mistake is treated as absent.
pub(crate) fn validate_options(value: Option<&Json>) -> Result<Option<Json>> {
	let value = match value {
		None | Some(Json::Null) => return Ok(None),
		Some(v) => v,
	};
	if is_call_options_shape(value) {
		return Ok(None);
	}
	ParseOptions::from_value(Some(value))
		.map_err(|e| map_options_error(e))
		.map(|_| Some(value.clone()))
}

fn map_options_error(e: gridbook_core::err::Error) -> Error {
	ErrorKind::Validation.with_message(e.to_string())
}

// An object whose keys all belong to the RPC call options was passed in
// the wrong slot; it carries no parse options.
fn is_call_options_shape(value: &Json) -> bool {
	match value.as_object() {
		Some(obj) if !obj.is_empty() => {
			obj.keys().all(|k| matches!(k.as_str(), "timeoutMs" | "signal"))
		}
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn malformed_options_fail_synchronously() {
		let err = validate_options(Some(&json!({"localeID": "en-US"}))).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Validation);
		assert!(err
			.to_string()
			.starts_with("options must be { localeId?: string, referenceStyle?:"));
	}

	#[test]
	fn call_options_in_the_wrong_slot_are_ignored() {
		let out = validate_options(Some(&json!({"timeoutMs": 50}))).unwrap();
		assert!(out.is_none());
	}

	#[test]
	fn cursor_and_options_disambiguate_by_type() {
		let (cursor, options) = disambiguate(CursorOrOptions::Cursor(4), None).unwrap();
		assert_eq!(cursor, Some(4));
		assert!(options.is_none());

		let (cursor, options) =
			disambiguate(CursorOrOptions::Options(json!({"localeId": "de-DE"})), None).unwrap();
		assert!(cursor.is_none());
		assert_eq!(options.unwrap()["localeId"], json!("de-DE"));
	}
}
