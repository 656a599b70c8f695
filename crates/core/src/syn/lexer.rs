use serde::{Deserialize, Serialize};

use crate::syn::locale::Locale;
use crate::syn::options::ReferenceStyle;
use crate::wbk::address::Address;

/// The classification of one lexed region of formula text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
	Number,
	String,
	Bool,
	Ident,
	FuncName,
	CellRef,
	RangeRef,
	Operator,
	ArgSeparator,
	OpenParen,
	CloseParen,
	OpenBrace,
	CloseBrace,
	Percent,
	Error,
}

/// One lexed token with its byte span in the source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	pub kind: TokenKind,
	pub start: usize,
	pub end: usize,
	pub text: String,
}

pub(super) struct Lexer<'a> {
	src: &'a str,
	bytes: &'a [u8],
	pos: usize,
	locale: &'static Locale,
	style: ReferenceStyle,
	/// Lenient mode keeps error tokens instead of stopping.
	lenient: bool,
}

impl<'a> Lexer<'a> {
	pub(super) fn new(
		src: &'a str,
		locale: &'static Locale,
		style: ReferenceStyle,
		lenient: bool,
	) -> Self {
		Lexer {
			src,
			bytes: src.as_bytes(),
			pos: 0,
			locale,
			style,
			lenient,
		}
	}

	pub(super) fn run(mut self) -> Vec<Token> {
		let mut out = Vec::new();
		// a leading `=` marks formula input and lexes as an operator
		while let Some(token) = self.next_token() {
			let stop = token.kind == TokenKind::Error && !self.lenient;
			out.push(token);
			if stop {
				break;
			}
		}
		out
	}

	fn peek(&self) -> Option<u8> {
		self.bytes.get(self.pos).copied()
	}

	fn peek_at(&self, offset: usize) -> Option<u8> {
		self.bytes.get(self.pos + offset).copied()
	}

	fn token(&self, kind: TokenKind, start: usize) -> Token {
		Token {
			kind,
			start,
			end: self.pos,
			text: self.src[start..self.pos].to_owned(),
		}
	}

	fn next_token(&mut self) -> Option<Token> {
		while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
			self.pos += 1;
		}
		let start = self.pos;
		let c = self.peek()?;
		// strings first, since separators may appear inside them
		if c == b'"' {
			return Some(self.scan_string(start));
		}
		if c == b'{' {
			self.pos += 1;
			return Some(self.token(TokenKind::OpenBrace, start));
		}
		if c == b'}' {
			self.pos += 1;
			return Some(self.token(TokenKind::CloseBrace, start));
		}
		if c == b'(' {
			self.pos += 1;
			return Some(self.token(TokenKind::OpenParen, start));
		}
		if c == b')' {
			self.pos += 1;
			return Some(self.token(TokenKind::CloseParen, start));
		}
		if c == b'%' {
			self.pos += 1;
			return Some(self.token(TokenKind::Percent, start));
		}
		if c as char == self.locale.argument_separator {
			self.pos += 1;
			return Some(self.token(TokenKind::ArgSeparator, start));
		}
		if c.is_ascii_digit()
			|| (c as char == self.locale.decimal_separator
				&& self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
		{
			return Some(self.scan_number(start));
		}
		if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c == b'\'' {
			return Some(self.scan_word(start));
		}
		match c {
			b'<' => {
				self.pos += 1;
				if matches!(self.peek(), Some(b'=') | Some(b'>')) {
					self.pos += 1;
				}
				Some(self.token(TokenKind::Operator, start))
			}
			b'>' => {
				self.pos += 1;
				if self.peek() == Some(b'=') {
					self.pos += 1;
				}
				Some(self.token(TokenKind::Operator, start))
			}
			b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b':' => {
				self.pos += 1;
				Some(self.token(TokenKind::Operator, start))
			}
			_ => {
				// advance a whole character so the span stays sliceable
				let width = self.src[self.pos..]
					.chars()
					.next()
					.map(char::len_utf8)
					.unwrap_or(1);
				self.pos += width;
				Some(self.token(TokenKind::Error, start))
			}
		}
	}

	fn scan_string(&mut self, start: usize) -> Token {
		self.pos += 1;
		loop {
			match self.peek() {
				Some(b'"') => {
					// doubled quotes escape a literal quote
					if self.peek_at(1) == Some(b'"') {
						self.pos += 2;
					} else {
						self.pos += 1;
						return self.token(TokenKind::String, start);
					}
				}
				Some(_) => self.pos += 1,
				None => return self.token(TokenKind::Error, start),
			}
		}
	}

	fn scan_number(&mut self, start: usize) -> Token {
		while self.peek().is_some_and(|c| c.is_ascii_digit()) {
			self.pos += 1;
		}
		if self.peek().map(|c| c as char) == Some(self.locale.decimal_separator)
			&& self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
		{
			self.pos += 1;
			while self.peek().is_some_and(|c| c.is_ascii_digit()) {
				self.pos += 1;
			}
		}
		if matches!(self.peek(), Some(b'e') | Some(b'E')) {
			let mut ahead = 1;
			if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
				ahead = 2;
			}
			if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
				self.pos += ahead;
				while self.peek().is_some_and(|c| c.is_ascii_digit()) {
					self.pos += 1;
				}
			}
		}
		self.token(TokenKind::Number, start)
	}

	// Words cover booleans, function names, bare identifiers, and cell or
	// range references, optionally qualified with a sheet prefix.
	fn scan_word(&mut self, start: usize) -> Token {
		if self.peek() == Some(b'\'') {
			// quoted sheet prefix, e.g. 'My Sheet'!A1
			self.pos += 1;
			while self.peek().is_some_and(|c| c != b'\'') {
				self.pos += 1;
			}
			if self.peek() != Some(b'\'') {
				return self.token(TokenKind::Error, start);
			}
			self.pos += 1;
			if self.peek() != Some(b'!') {
				return self.token(TokenKind::Error, start);
			}
			self.pos += 1;
			return self.scan_reference_tail(start);
		}
		while self
			.peek()
			.is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'$')
		{
			self.pos += 1;
		}
		if self.peek() == Some(b'!') {
			self.pos += 1;
			return self.scan_reference_tail(start);
		}
		let text = &self.src[start..self.pos];
		if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
			return self.token(TokenKind::Bool, start);
		}
		if self.is_reference(text) {
			return self.reference_or_range(start);
		}
		if self.peek() == Some(b'(') {
			return self.token(TokenKind::FuncName, start);
		}
		self.token(TokenKind::Ident, start)
	}

	// After `Sheet!` the remainder must be an address or address range.
	fn scan_reference_tail(&mut self, start: usize) -> Token {
		let tail_start = self.pos;
		while self
			.peek()
			.is_some_and(|c| c.is_ascii_alphanumeric() || c == b'$' || c == b'[' || c == b']' || c == b'-')
		{
			self.pos += 1;
		}
		if !self.is_reference(&self.src[tail_start..self.pos]) {
			return self.token(TokenKind::Error, start);
		}
		self.reference_or_range(start)
	}

	fn reference_or_range(&mut self, start: usize) -> Token {
		if self.peek() == Some(b':') {
			let mark = self.pos;
			self.pos += 1;
			let tail_start = self.pos;
			while self
				.peek()
				.is_some_and(|c| c.is_ascii_alphanumeric() || c == b'$' || c == b'[' || c == b']' || c == b'-')
			{
				self.pos += 1;
			}
			if self.is_reference(&self.src[tail_start..self.pos]) {
				return self.token(TokenKind::RangeRef, start);
			}
			self.pos = mark;
		}
		self.token(TokenKind::CellRef, start)
	}

	fn is_reference(&self, text: &str) -> bool {
		if text.is_empty() {
			return false;
		}
		match self.style {
			ReferenceStyle::A1 => Address::parse(text).is_ok(),
			ReferenceStyle::R1C1 => is_r1c1(text) || Address::parse(text).is_ok(),
		}
	}
}

// R1C1 references: R<row>C<col>, with either part relative in brackets,
// e.g. R[2]C[-1], R1C1, RC[3].
fn is_r1c1(text: &str) -> bool {
	let rest = match text.strip_prefix(['R', 'r']) {
		Some(rest) => rest,
		None => return false,
	};
	let rest = match strip_r1c1_index(rest) {
		Some(rest) => rest,
		None => return false,
	};
	let rest = match rest.strip_prefix(['C', 'c']) {
		Some(rest) => rest,
		None => return false,
	};
	matches!(strip_r1c1_index(rest), Some(""))
}

fn strip_r1c1_index(s: &str) -> Option<&str> {
	if let Some(inner) = s.strip_prefix('[') {
		let close = inner.find(']')?;
		let body = &inner[..close];
		let body = body.strip_prefix('-').unwrap_or(body);
		if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
			return None;
		}
		return Some(&inner[close + 1..]);
	}
	let digits = s.bytes().take_while(|b| b.is_ascii_digit()).count();
	Some(&s[digits..])
}
