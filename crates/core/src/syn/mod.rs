//! Formula text tooling: a locale-aware lexer, a lenient partial lexer
//! for editors, and a partial parser which reports the call context at a
//! cursor position. No evaluation happens here.
pub mod lexer;
pub mod locale;
pub mod options;

use serde::{Deserialize, Serialize};

use crate::err::Error;
use crate::syn::lexer::{Lexer, Token, TokenKind};
use crate::syn::locale::{locale, Locale};
use crate::syn::options::ParseOptions;

/// Lex a complete formula. Fails on the first malformed region.
pub fn lex(formula: &str, opts: &ParseOptions) -> Result<Vec<Token>, Error> {
	let loc = resolve_locale(opts)?;
	let tokens = Lexer::new(formula, loc, opts.reference_style(), false).run();
	if let Some(err) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
		return Err(Error::Thrown(format!(
			"unexpected `{}` at offset {} in formula",
			err.text, err.start
		)));
	}
	Ok(tokens)
}

/// Lex as much of a formula as possible, keeping error tokens. Used by
/// editors while the user is still typing.
pub fn lex_partial(formula: &str, opts: &ParseOptions) -> Result<Vec<Token>, Error> {
	let loc = resolve_locale(opts)?;
	Ok(Lexer::new(formula, loc, opts.reference_style(), true).run())
}

/// The surroundings of a cursor position inside a partially written
/// formula: the innermost function call, the argument being written, and
/// whether the cursor sits inside a string literal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub arg_index: Option<u32>,
	pub in_string: bool,
	pub paren_depth: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_at_cursor: Option<Token>,
}

/// Parse a partially written formula up to `cursor` and report the call
/// context there.
pub fn parse_partial(
	formula: &str,
	cursor: Option<usize>,
	opts: &ParseOptions,
) -> Result<FormulaContext, Error> {
	let cursor = cursor.unwrap_or(formula.len()).min(formula.len());
	let tokens = lex_partial(formula, opts)?;

	// (function name, argument index) for each unclosed call
	let mut stack: Vec<(Option<String>, u32)> = Vec::new();
	let mut in_string = false;
	let mut token_at_cursor = None;

	for (ix, token) in tokens.iter().enumerate() {
		if token.start >= cursor {
			break;
		}
		if token.end > cursor || (token.end == cursor && token.start < cursor) {
			token_at_cursor = Some(token.clone());
		}
		if token.end > cursor {
			// the cursor is inside this token
			if token.kind == TokenKind::String
				|| (token.kind == TokenKind::Error && token.text.starts_with('"'))
			{
				in_string = true;
			}
			break;
		}
		match token.kind {
			TokenKind::OpenParen => {
				let func = tokens
					.get(ix.wrapping_sub(1))
					.filter(|_| ix > 0)
					.filter(|t| t.kind == TokenKind::FuncName)
					.map(|t| t.text.clone());
				stack.push((func, 0));
			}
			TokenKind::CloseParen => {
				stack.pop();
			}
			TokenKind::ArgSeparator => {
				if let Some((_, arg)) = stack.last_mut() {
					*arg += 1;
				}
			}
			TokenKind::Error if token.text.starts_with('"') && token.end >= cursor => {
				in_string = true;
			}
			_ => {}
		}
	}

	let paren_depth = stack.len() as u32;
	let innermost = stack.into_iter().rev().find(|(f, _)| f.is_some());
	let (function, arg_index) = match innermost {
		Some((f, arg)) => (f, Some(arg)),
		None => (None, None),
	};
	Ok(FormulaContext {
		function,
		arg_index,
		in_string,
		paren_depth,
		token_at_cursor,
	})
}

fn resolve_locale(opts: &ParseOptions) -> Result<&'static Locale, Error> {
	locale(opts.locale_id()).ok_or_else(|| Error::InvalidField {
		field: "localeId".to_owned(),
		message: format!("unsupported locale `{}`", opts.locale_id()),
	})
}
