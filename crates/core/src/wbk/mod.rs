//! The workbook model: sheets, cells, addresses, styles and structural
//! edit operations. This is the substrate the reference kernel computes
//! over; it carries no formula semantics of its own.
pub mod address;
pub mod info;
pub mod ops;
pub mod sheet;
pub mod style;
pub mod value;

use serde::{Deserialize, Serialize};

use crate::cnf::DEFAULT_SHEET_NAME;
use crate::err::Error;
use crate::wbk::info::EngineInfo;
use crate::wbk::sheet::Sheet;
use crate::wbk::style::StyleTable;

/// The root aggregate: an ordered collection of named sheets plus the
/// workbook-wide style table and host metadata.
///
/// Sheet order is insertion order and is observable through
/// recalculation delta ordering and workbook info.
#[derive(Clone, Debug)]
pub struct Workbook {
	pub sheets: Vec<Sheet>,
	pub styles: StyleTable,
	pub info: EngineInfo,
	pub path: Option<String>,
	pub origin_path: Option<String>,
}

impl Default for Workbook {
	fn default() -> Self {
		Workbook::new()
	}
}

impl Workbook {
	/// Create a workbook with a single default sheet.
	pub fn new() -> Self {
		Workbook {
			sheets: vec![Sheet::new(DEFAULT_SHEET_NAME)],
			styles: StyleTable::new(),
			info: EngineInfo::default(),
			path: None,
			origin_path: None,
		}
	}

	/// The canonical name of the first sheet.
	pub fn first_sheet_name(&self) -> &str {
		self.sheets.first().map(|s| s.name.as_str()).unwrap_or(DEFAULT_SHEET_NAME)
	}

	/// Resolve a sheet name to its position. Names are trimmed; an empty
	/// or absent name resolves to the first sheet.
	pub fn resolve_sheet(&self, name: Option<&str>) -> Result<usize, Error> {
		let name = name.map(str::trim).filter(|n| !n.is_empty());
		match name {
			None => {
				if self.sheets.is_empty() {
					Err(Error::SheetNotFound(DEFAULT_SHEET_NAME.to_owned()))
				} else {
					Ok(0)
				}
			}
			Some(name) => self
				.sheets
				.iter()
				.position(|s| s.name == name)
				.ok_or_else(|| Error::SheetNotFound(name.to_owned())),
		}
	}

	pub fn sheet(&self, index: usize) -> &Sheet {
		&self.sheets[index]
	}

	pub fn sheet_mut(&mut self, index: usize) -> &mut Sheet {
		&mut self.sheets[index]
	}

	/// Fetch an existing sheet by name, or append a new one.
	pub fn sheet_named_mut(&mut self, name: &str) -> &mut Sheet {
		match self.sheets.iter().position(|s| s.name == name) {
			Some(ix) => &mut self.sheets[ix],
			None => {
				self.sheets.push(Sheet::new(name));
				let last = self.sheets.len() - 1;
				&mut self.sheets[last]
			}
		}
	}

	/// The workbook summary returned by metadata queries.
	pub fn workbook_info(&self) -> WorkbookInfo {
		WorkbookInfo {
			path: self.path.clone(),
			origin_path: self.origin_path.clone(),
			sheets: self
				.sheets
				.iter()
				.map(|s| {
					let (rows, cols) = s.dimensions();
					SheetInfo {
						name: s.name.clone(),
						rows,
						cols,
						origin: s.origin.clone(),
					}
				})
				.collect(),
		}
	}
}

/// Workbook metadata as reported over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkbookInfo {
	pub path: Option<String>,
	pub origin_path: Option<String>,
	pub sheets: Vec<SheetInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
	pub name: String,
	pub rows: u32,
	pub cols: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_sheet_name_resolves_to_first() {
		let wb = Workbook::new();
		assert_eq!(wb.resolve_sheet(None).unwrap(), 0);
		assert_eq!(wb.resolve_sheet(Some("")).unwrap(), 0);
		assert_eq!(wb.resolve_sheet(Some("   ")).unwrap(), 0);
		assert_eq!(wb.resolve_sheet(Some("Sheet1")).unwrap(), 0);
		assert!(wb.resolve_sheet(Some("Missing")).is_err());
	}

	#[test]
	fn sheet_order_is_insertion_order() {
		let mut wb = Workbook::new();
		wb.sheet_named_mut("Data");
		wb.sheet_named_mut("Summary");
		let names: Vec<_> = wb.sheets.iter().map(|s| s.name.as_str()).collect();
		assert_eq!(names, vec!["Sheet1", "Data", "Summary"]);
	}
}
