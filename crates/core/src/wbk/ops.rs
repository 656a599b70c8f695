use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::err::Error;
use crate::wbk::address::{Address, CellRange};
use crate::wbk::sheet::Sheet;

/// A structural edit applied to a sheet.
///
/// Row and column indices are 0-indexed; address and range parameters use
/// A1 notation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EditOp {
	InsertRows {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		row: u32,
		count: u32,
	},
	DeleteRows {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		row: u32,
		count: u32,
	},
	InsertCols {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		col: u32,
		count: u32,
	},
	DeleteCols {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		col: u32,
		count: u32,
	},
	InsertCellsShiftRight {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		range: String,
	},
	InsertCellsShiftDown {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		range: String,
	},
	DeleteCellsShiftLeft {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		range: String,
	},
	DeleteCellsShiftUp {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		range: String,
	},
	MoveRange {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		from: String,
		to: String,
	},
	CopyRange {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		from: String,
		to: String,
	},
	Fill {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		sheet: Option<String>,
		from: String,
		to: String,
	},
}

impl EditOp {
	/// The sheet this operation targets, if one was named.
	pub fn sheet(&self) -> Option<&str> {
		match self {
			EditOp::InsertRows {
				sheet, ..
			}
			| EditOp::DeleteRows {
				sheet, ..
			}
			| EditOp::InsertCols {
				sheet, ..
			}
			| EditOp::DeleteCols {
				sheet, ..
			}
			| EditOp::InsertCellsShiftRight {
				sheet, ..
			}
			| EditOp::InsertCellsShiftDown {
				sheet, ..
			}
			| EditOp::DeleteCellsShiftLeft {
				sheet, ..
			}
			| EditOp::DeleteCellsShiftUp {
				sheet, ..
			}
			| EditOp::MoveRange {
				sheet, ..
			}
			| EditOp::CopyRange {
				sheet, ..
			}
			| EditOp::Fill {
				sheet, ..
			} => sheet.as_deref(),
		}
	}

	/// Apply the operation to a sheet, shifting the cell population and the
	/// affected row/column metadata.
	pub fn apply(&self, sheet: &mut Sheet) -> Result<(), Error> {
		match self {
			EditOp::InsertRows {
				row,
				count,
				..
			} => {
				remap_cells(sheet, |(r, c)| {
					if r >= *row {
						Some((r + count, c))
					} else {
						Some((r, c))
					}
				});
				sheet.row_styles = shift_keys_up(&sheet.row_styles, *row, *count);
				Ok(())
			}
			EditOp::DeleteRows {
				row,
				count,
				..
			} => {
				remap_cells(sheet, |(r, c)| {
					if r >= *row && r < row + count {
						None
					} else if r >= row + count {
						Some((r - count, c))
					} else {
						Some((r, c))
					}
				});
				sheet.row_styles = shift_keys_down(&sheet.row_styles, *row, *count);
				Ok(())
			}
			EditOp::InsertCols {
				col,
				count,
				..
			} => {
				remap_cells(sheet, |(r, c)| {
					if c >= *col {
						Some((r, c + count))
					} else {
						Some((r, c))
					}
				});
				sheet.col_styles = shift_keys_up(&sheet.col_styles, *col, *count);
				sheet.col_widths = shift_keys_up(&sheet.col_widths, *col, *count);
				sheet.col_widths_chars = shift_keys_up(&sheet.col_widths_chars, *col, *count);
				sheet.format_runs = shift_keys_up(&sheet.format_runs, *col, *count);
				let hidden = sheet
					.hidden_cols
					.iter()
					.map(|c| if *c >= *col { c + count } else { *c })
					.collect();
				sheet.hidden_cols = hidden;
				Ok(())
			}
			EditOp::DeleteCols {
				col,
				count,
				..
			} => {
				remap_cells(sheet, |(r, c)| {
					if c >= *col && c < col + count {
						None
					} else if c >= col + count {
						Some((r, c - count))
					} else {
						Some((r, c))
					}
				});
				sheet.col_styles = shift_keys_down(&sheet.col_styles, *col, *count);
				sheet.col_widths = shift_keys_down(&sheet.col_widths, *col, *count);
				sheet.col_widths_chars = shift_keys_down(&sheet.col_widths_chars, *col, *count);
				sheet.format_runs = shift_keys_down(&sheet.format_runs, *col, *count);
				let hidden = sheet
					.hidden_cols
					.iter()
					.filter(|c| **c < *col || **c >= col + count)
					.map(|c| if *c >= col + count { c - count } else { *c })
					.collect();
				sheet.hidden_cols = hidden;
				Ok(())
			}
			EditOp::InsertCellsShiftRight {
				range, ..
			} => {
				let rng = CellRange::parse(range)?;
				let width = rng.cols();
				remap_cells(sheet, |(r, c)| {
					if r >= rng.start.row && r <= rng.end.row && c >= rng.start.col {
						Some((r, c + width))
					} else {
						Some((r, c))
					}
				});
				Ok(())
			}
			EditOp::InsertCellsShiftDown {
				range, ..
			} => {
				let rng = CellRange::parse(range)?;
				let height = rng.rows();
				remap_cells(sheet, |(r, c)| {
					if c >= rng.start.col && c <= rng.end.col && r >= rng.start.row {
						Some((r + height, c))
					} else {
						Some((r, c))
					}
				});
				Ok(())
			}
			EditOp::DeleteCellsShiftLeft {
				range, ..
			} => {
				let rng = CellRange::parse(range)?;
				let width = rng.cols();
				remap_cells(sheet, |(r, c)| {
					if r >= rng.start.row && r <= rng.end.row {
						if c >= rng.start.col && c <= rng.end.col {
							None
						} else if c > rng.end.col {
							Some((r, c - width))
						} else {
							Some((r, c))
						}
					} else {
						Some((r, c))
					}
				});
				Ok(())
			}
			EditOp::DeleteCellsShiftUp {
				range, ..
			} => {
				let rng = CellRange::parse(range)?;
				let height = rng.rows();
				remap_cells(sheet, |(r, c)| {
					if c >= rng.start.col && c <= rng.end.col {
						if r >= rng.start.row && r <= rng.end.row {
							None
						} else if r > rng.end.row {
							Some((r - height, c))
						} else {
							Some((r, c))
						}
					} else {
						Some((r, c))
					}
				});
				Ok(())
			}
			EditOp::MoveRange {
				from,
				to,
				..
			} => {
				let src = CellRange::parse(from)?;
				let dst = Address::parse(to)?;
				let moved: Vec<_> = sheet
					.cells
					.iter()
					.filter(|((r, c), _)| src.contains(*r, *c))
					.map(|(k, v)| (*k, v.clone()))
					.collect();
				for ((r, c), _) in &moved {
					sheet.clear(*r, *c);
				}
				// the destination footprint is cleared before the move lands
				for dr in 0..src.rows() {
					for dc in 0..src.cols() {
						sheet.clear(dst.row + dr, dst.col + dc);
					}
				}
				for ((r, c), cell) in moved {
					let dr = r - src.start.row;
					let dc = c - src.start.col;
					sheet.put(dst.row + dr, dst.col + dc, cell);
				}
				Ok(())
			}
			EditOp::CopyRange {
				from,
				to,
				..
			} => {
				let src = CellRange::parse(from)?;
				let dst = Address::parse(to)?;
				let copied: Vec<_> = sheet
					.cells
					.iter()
					.filter(|((r, c), _)| src.contains(*r, *c))
					.map(|(k, v)| (*k, v.clone()))
					.collect();
				for dr in 0..src.rows() {
					for dc in 0..src.cols() {
						sheet.clear(dst.row + dr, dst.col + dc);
					}
				}
				for ((r, c), cell) in copied {
					let dr = r - src.start.row;
					let dc = c - src.start.col;
					sheet.put(dst.row + dr, dst.col + dc, cell);
				}
				Ok(())
			}
			EditOp::Fill {
				from,
				to,
				..
			} => {
				let src = CellRange::parse(from)?;
				let dst = CellRange::parse(to)?;
				let pattern: BTreeMap<(u32, u32), _> = sheet
					.cells
					.iter()
					.filter(|((r, c), _)| src.contains(*r, *c))
					.map(|((r, c), v)| ((r - src.start.row, c - src.start.col), v.clone()))
					.collect();
				for dr in 0..dst.rows() {
					for dc in 0..dst.cols() {
						let key = (dr % src.rows(), dc % src.cols());
						let row = dst.start.row + dr;
						let col = dst.start.col + dc;
						match pattern.get(&key) {
							Some(cell) => sheet.put(row, col, cell.clone()),
							None => sheet.clear(row, col),
						}
					}
				}
				Ok(())
			}
		}
	}
}

fn remap_cells<F>(sheet: &mut Sheet, f: F)
where
	F: Fn((u32, u32)) -> Option<(u32, u32)>,
{
	let cells = std::mem::take(&mut sheet.cells);
	for (key, cell) in cells {
		if let Some(key) = f(key) {
			sheet.cells.insert(key, cell);
		}
	}
}

fn shift_keys_up<V: Clone>(map: &BTreeMap<u32, V>, at: u32, count: u32) -> BTreeMap<u32, V> {
	map.iter()
		.map(|(k, v)| {
			if *k >= at {
				(k + count, v.clone())
			} else {
				(*k, v.clone())
			}
		})
		.collect()
}

fn shift_keys_down<V: Clone>(map: &BTreeMap<u32, V>, at: u32, count: u32) -> BTreeMap<u32, V> {
	map.iter()
		.filter(|(k, _)| **k < at || **k >= at + count)
		.map(|(k, v)| {
			if *k >= at + count {
				(k - count, v.clone())
			} else {
				(*k, v.clone())
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wbk::value::{Cell, CellValue};
	use serde_json::json;

	fn cell(n: f64) -> Cell {
		Cell {
			input: None,
			value: CellValue::Number(n),
			style_id: None,
		}
	}

	#[test]
	fn tag_serialization() {
		let op = EditOp::InsertRows {
			sheet: None,
			row: 2,
			count: 3,
		};
		assert_eq!(
			serde_json::to_value(&op).unwrap(),
			json!({"type": "InsertRows", "row": 2, "count": 3})
		);
	}

	#[test]
	fn insert_rows_shifts_below() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(0, 0, cell(1.0));
		sheet.put(2, 0, cell(2.0));
		EditOp::InsertRows {
			sheet: None,
			row: 1,
			count: 2,
		}
		.apply(&mut sheet)
		.unwrap();
		assert!(sheet.get(0, 0).is_some());
		assert!(sheet.get(2, 0).is_none());
		assert!(sheet.get(4, 0).is_some());
	}

	#[test]
	fn delete_cols_drops_and_shifts() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(0, 0, cell(1.0));
		sheet.put(0, 1, cell(2.0));
		sheet.put(0, 3, cell(3.0));
		EditOp::DeleteCols {
			sheet: None,
			col: 1,
			count: 2,
		}
		.apply(&mut sheet)
		.unwrap();
		assert_eq!(sheet.get(0, 0), Some(&cell(1.0)));
		assert_eq!(sheet.get(0, 1), Some(&cell(3.0)));
		assert!(sheet.get(0, 3).is_none());
	}

	#[test]
	fn move_range_clears_source() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(0, 0, cell(1.0));
		sheet.put(1, 0, cell(2.0));
		EditOp::MoveRange {
			sheet: None,
			from: "A1:A2".to_owned(),
			to: "C1".to_owned(),
		}
		.apply(&mut sheet)
		.unwrap();
		assert!(sheet.get(0, 0).is_none());
		assert_eq!(sheet.get(0, 2), Some(&cell(1.0)));
		assert_eq!(sheet.get(1, 2), Some(&cell(2.0)));
	}

	#[test]
	fn fill_tiles_pattern() {
		let mut sheet = Sheet::new("Sheet1");
		sheet.put(0, 0, cell(7.0));
		EditOp::Fill {
			sheet: None,
			from: "A1".to_owned(),
			to: "B1:B4".to_owned(),
		}
		.apply(&mut sheet)
		.unwrap();
		for row in 0..4 {
			assert_eq!(sheet.get(row, 1), Some(&cell(7.0)));
		}
	}
}
