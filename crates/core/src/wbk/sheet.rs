use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::wbk::style::FormatRun;
use crate::wbk::value::Cell;

/// One addressable grid of cells.
///
/// The cell population is sparse: cleared cells are removed from the map so
/// an export never writes them out.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sheet {
	pub name: String,
	/// Sparse cell population keyed by (row, col), both 0-indexed.
	pub cells: BTreeMap<(u32, u32), Cell>,
	/// Explicitly declared dimensions, if any; the used range can exceed
	/// neither when set.
	pub rows: Option<u32>,
	pub cols: Option<u32>,
	/// The anchor cell this sheet's grid is displayed from.
	pub origin: Option<String>,
	pub col_widths: BTreeMap<u32, f64>,
	pub col_widths_chars: BTreeMap<u32, f64>,
	pub hidden_cols: BTreeSet<u32>,
	pub row_styles: BTreeMap<u32, u32>,
	pub col_styles: BTreeMap<u32, u32>,
	pub default_style: Option<u32>,
	pub format_runs: BTreeMap<u32, Vec<FormatRun>>,
}

impl Sheet {
	pub fn new(name: impl Into<String>) -> Self {
		Sheet {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn get(&self, row: u32, col: u32) -> Option<&Cell> {
		self.cells.get(&(row, col))
	}

	/// Insert or replace a cell. Inserting an empty cell removes the slot
	/// so the population stays sparse.
	pub fn put(&mut self, row: u32, col: u32, cell: Cell) {
		if cell.is_empty() {
			self.cells.remove(&(row, col));
		} else {
			self.cells.insert((row, col), cell);
		}
	}

	pub fn clear(&mut self, row: u32, col: u32) {
		self.cells.remove(&(row, col));
	}

	/// The dimensions reported to callers: the declared dimensions when
	/// set, otherwise the extent of the used range.
	pub fn dimensions(&self) -> (u32, u32) {
		match (self.rows, self.cols) {
			(Some(r), Some(c)) => (r, c),
			_ => {
				let mut rows = 0;
				let mut cols = 0;
				for (row, col) in self.cells.keys() {
					rows = rows.max(row + 1);
					cols = cols.max(col + 1);
				}
				(self.rows.unwrap_or(rows), self.cols.unwrap_or(cols))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wbk::value::CellValue;

	#[test]
	fn sparse_population() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(0, 0, Cell {
			input: None,
			value: CellValue::Number(1.0),
			style_id: None,
		});
		assert_eq!(sheet.cells.len(), 1);
		// clearing a cell removes the slot entirely
		sheet.put(0, 0, Cell::default());
		assert!(sheet.cells.is_empty());
	}

	#[test]
	fn derived_dimensions() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(4, 2, Cell {
			input: None,
			value: CellValue::Bool(true),
			style_id: None,
		});
		assert_eq!(sheet.dimensions(), (5, 3));
		sheet.rows = Some(100);
		sheet.cols = Some(10);
		assert_eq!(sheet.dimensions(), (100, 10));
	}
}
