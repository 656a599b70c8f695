use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cnf::MAX_COLUMN;
use crate::err::Error;

/// A single cell coordinate within a sheet.
///
/// Rows and columns are 0-indexed internally; the A1 rendering is produced
/// on display. Anchors (`$`) are accepted on parse and recorded so that a
/// round trip preserves them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address {
	pub row: u32,
	pub col: u32,
	#[serde(default, skip_serializing_if = "is_false")]
	pub col_anchored: bool,
	#[serde(default, skip_serializing_if = "is_false")]
	pub row_anchored: bool,
}

fn is_false(v: &bool) -> bool {
	!*v
}

impl Address {
	pub fn new(row: u32, col: u32) -> Self {
		Address {
			row,
			col,
			col_anchored: false,
			row_anchored: false,
		}
	}

	/// Parse an address in A1 notation, with optional `$` anchors.
	pub fn parse(s: &str) -> Result<Self, Error> {
		let input = s.trim();
		let bytes = input.as_bytes();
		let mut pos = 0;
		let col_anchored = bytes.first() == Some(&b'$');
		if col_anchored {
			pos += 1;
		}
		let col_start = pos;
		while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
			pos += 1;
		}
		if pos == col_start {
			return Err(Error::InvalidAddress(s.to_owned()));
		}
		let col = column_from_name(&input[col_start..pos])
			.ok_or_else(|| Error::InvalidAddress(s.to_owned()))?;
		let row_anchored = bytes.get(pos) == Some(&b'$');
		if row_anchored {
			pos += 1;
		}
		let row_start = pos;
		while pos < bytes.len() && bytes[pos].is_ascii_digit() {
			pos += 1;
		}
		if row_start == pos || pos != bytes.len() {
			return Err(Error::InvalidAddress(s.to_owned()));
		}
		let row: u32 = input[row_start..]
			.parse()
			.ok()
			.filter(|r| *r >= 1)
			.ok_or_else(|| Error::InvalidAddress(s.to_owned()))?;
		Ok(Address {
			row: row - 1,
			col,
			col_anchored,
			row_anchored,
		})
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.col_anchored {
			f.write_str("$")?;
		}
		f.write_str(&column_name(self.col))?;
		if self.row_anchored {
			f.write_str("$")?;
		}
		write!(f, "{}", self.row + 1)
	}
}

/// Convert a 0-indexed column into its base-26 name, 'A' = column 0.
pub fn column_name(col: u32) -> String {
	let mut n = col + 1;
	let mut out = Vec::new();
	while n > 0 {
		let rem = ((n - 1) % 26) as u8;
		out.push(b'A' + rem);
		n = (n - 1) / 26;
	}
	out.reverse();
	// Only ascii uppercase letters are pushed above
	String::from_utf8(out).unwrap_or_default()
}

/// Convert a base-26 column name into a 0-indexed column number.
///
/// Returns `None` for empty names, non-alphabetic characters, and columns
/// beyond the addressable limit.
pub fn column_from_name(name: &str) -> Option<u32> {
	if name.is_empty() {
		return None;
	}
	let mut col: u64 = 0;
	for c in name.chars() {
		let c = c.to_ascii_uppercase();
		if !c.is_ascii_uppercase() {
			return None;
		}
		col = col * 26 + (c as u64 - 'A' as u64 + 1);
		if col > MAX_COLUMN as u64 {
			return None;
		}
	}
	Some((col - 1) as u32)
}

/// A rectangular cell range within a sheet.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CellRange {
	pub start: Address,
	pub end: Address,
}

impl CellRange {
	/// Parse a range in A1 notation. A single address denotes a 1x1 range.
	pub fn parse(s: &str) -> Result<Self, Error> {
		let input = s.trim();
		match input.split_once(':') {
			Some((a, b)) => {
				let start = Address::parse(a).map_err(|_| Error::InvalidRange(s.to_owned()))?;
				let end = Address::parse(b).map_err(|_| Error::InvalidRange(s.to_owned()))?;
				if end.row < start.row || end.col < start.col {
					return Err(Error::InvalidRange(s.to_owned()));
				}
				Ok(CellRange {
					start,
					end,
				})
			}
			None => {
				let at = Address::parse(input).map_err(|_| Error::InvalidRange(s.to_owned()))?;
				Ok(CellRange {
					start: at,
					end: at,
				})
			}
		}
	}

	pub fn rows(&self) -> u32 {
		self.end.row - self.start.row + 1
	}

	pub fn cols(&self) -> u32 {
		self.end.col - self.start.col + 1
	}

	pub fn contains(&self, row: u32, col: u32) -> bool {
		row >= self.start.row && row <= self.end.row && col >= self.start.col && col <= self.end.col
	}
}

impl fmt::Display for CellRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.start == self.end {
			write!(f, "{}", self.start)
		} else {
			write!(f, "{}:{}", self.start, self.end)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_simple() {
		let at = Address::parse("A1").unwrap();
		assert_eq!(at.row, 0);
		assert_eq!(at.col, 0);
		assert_eq!(at.to_string(), "A1");
	}

	#[test]
	fn parse_anchored() {
		let at = Address::parse("$B$2").unwrap();
		assert_eq!(at.row, 1);
		assert_eq!(at.col, 1);
		assert!(at.col_anchored);
		assert!(at.row_anchored);
		assert_eq!(at.to_string(), "$B$2");
	}

	#[test]
	fn parse_last_column() {
		let at = Address::parse("XFD1").unwrap();
		assert_eq!(at.col, MAX_COLUMN - 1);
	}

	#[test]
	fn reject_beyond_last_column() {
		assert!(Address::parse("XFE1").is_err());
		assert!(Address::parse("ZZZZZ1").is_err());
	}

	#[test]
	fn reject_malformed() {
		assert!(Address::parse("").is_err());
		assert!(Address::parse("A0").is_err());
		assert!(Address::parse("1A").is_err());
		assert!(Address::parse("A1B").is_err());
	}

	#[test]
	fn column_names_round_trip() {
		for col in [0, 1, 25, 26, 27, 701, 702, MAX_COLUMN - 1] {
			assert_eq!(column_from_name(&column_name(col)), Some(col));
		}
		assert_eq!(column_name(0), "A");
		assert_eq!(column_name(25), "Z");
		assert_eq!(column_name(26), "AA");
		assert_eq!(column_name(MAX_COLUMN - 1), "XFD");
	}

	#[test]
	fn parse_range() {
		let rng = CellRange::parse("A1:B3").unwrap();
		assert_eq!(rng.rows(), 3);
		assert_eq!(rng.cols(), 2);
		let single = CellRange::parse("C2").unwrap();
		assert_eq!(single.rows(), 1);
		assert_eq!(single.cols(), 1);
		assert!(CellRange::parse("B2:A1").is_err());
	}
}
