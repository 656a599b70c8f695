use std::collections::HashSet;

use bytes::Bytes;
use serde_json::Value as Json;

use crate::err::Error;
use crate::exe::{CellDelta, CellSnapshot, CellUpdate, Kernel, KernelError};
use crate::syn;
use crate::syn::locale;
use crate::syn::options::ParseOptions;
use crate::wbk::address::{Address, CellRange};
use crate::wbk::ops::EditOp;
use crate::wbk::style::FormatRun;
use crate::wbk::value::{Cell, CellValue};
use crate::wbk::Workbook;

/// The built-in reference kernel.
///
/// It maintains the workbook substrate and the formula tooling but does
/// not evaluate formulas: a cell set to `=SUM(A1:A2)` keeps the formula as
/// its input and reports a null value until a computing kernel replaces
/// this one. Recalculation reports every cell touched since the previous
/// pass, in (sheet, row, col) order.
pub struct GridKernel {
	wb: Workbook,
	dirty: HashSet<(String, u32, u32)>,
}

impl Default for GridKernel {
	fn default() -> Self {
		GridKernel::new()
	}
}

impl GridKernel {
	pub fn new() -> Self {
		GridKernel {
			wb: Workbook::new(),
			dirty: HashSet::new(),
		}
	}

	fn sheet_index(&self, sheet: Option<&str>) -> Result<usize, KernelError> {
		Ok(self.wb.resolve_sheet(sheet)?)
	}

	fn mark_dirty(&mut self, sheet_ix: usize, row: u32, col: u32) {
		let name = self.wb.sheet(sheet_ix).name.clone();
		self.dirty.insert((name, row, col));
	}

	fn mark_sheet_dirty(&mut self, sheet_ix: usize) {
		let name = self.wb.sheet(sheet_ix).name.clone();
		let keys: Vec<_> = self.wb.sheet(sheet_ix).cells.keys().copied().collect();
		for (row, col) in keys {
			self.dirty.insert((name.clone(), row, col));
		}
	}

	fn write_cell(&mut self, sheet_ix: usize, at: Address, value: &Json, rich: bool) {
		let existing_style = self.wb.sheet(sheet_ix).get(at.row, at.col).and_then(|c| c.style_id);
		let cell = match value {
			Json::String(s) if !rich && s.starts_with('=') => Cell {
				input: Some(s.clone()),
				value: CellValue::Null,
				style_id: existing_style,
			},
			v => Cell {
				input: None,
				value: CellValue::from_json(v),
				style_id: existing_style,
			},
		};
		self.wb.sheet_mut(sheet_ix).put(at.row, at.col, cell);
		self.mark_dirty(sheet_ix, at.row, at.col);
	}

	fn snapshot(&self, sheet_ix: usize, at: Address) -> CellSnapshot {
		let sheet = self.wb.sheet(sheet_ix);
		let cell = sheet.get(at.row, at.col);
		CellSnapshot {
			sheet: sheet.name.clone(),
			address: Address::new(at.row, at.col).to_string(),
			input: cell.and_then(|c| c.input.clone()),
			value: cell.map(|c| c.value.to_json()).unwrap_or(Json::Null),
		}
	}

	fn style_checked(&self, style_id: u32) -> Result<Option<u32>, KernelError> {
		if style_id == crate::cnf::CLEAR_STYLE_ID {
			return Ok(None);
		}
		if !self.wb.styles.is_known(style_id) {
			return Err(KernelError::Workbook(Error::InvalidField {
				field: "styleId".to_owned(),
				message: format!("style {style_id} has not been interned"),
			}));
		}
		Ok(Some(style_id))
	}
}

impl Kernel for GridKernel {
	fn new_workbook(&mut self) -> Result<(), KernelError> {
		self.wb = Workbook::new();
		self.dirty.clear();
		Ok(())
	}

	fn load_from_xlsx_bytes(&mut self, bytes: Bytes) -> Result<(), KernelError> {
		if bytes.is_empty() {
			return Err(KernelError::Thrown("workbook payload is empty".to_owned()));
		}
		// The codec lives outside the reference kernel; loading resets to a
		// fresh workbook tracked as an opened file.
		self.wb = Workbook::new();
		self.wb.path = Some("workbook.xlsx".to_owned());
		self.dirty.clear();
		Ok(())
	}

	fn set_cell(
		&mut self,
		sheet: Option<&str>,
		address: &str,
		value: &Json,
	) -> Result<(), KernelError> {
		let ix = self.sheet_index(sheet)?;
		let at = Address::parse(address)?;
		self.write_cell(ix, at, value, false);
		Ok(())
	}

	fn set_cells(&mut self, updates: &[CellUpdate]) -> Result<(), KernelError> {
		for update in updates {
			self.set_cell(update.sheet.as_deref(), &update.address, &update.value)?;
		}
		Ok(())
	}

	fn set_cell_rich(
		&mut self,
		sheet: Option<&str>,
		address: &str,
		value: &Json,
	) -> Result<(), KernelError> {
		let ix = self.sheet_index(sheet)?;
		let at = Address::parse(address)?;
		self.write_cell(ix, at, value, true);
		Ok(())
	}

	fn set_range(
		&mut self,
		sheet: Option<&str>,
		range: &str,
		values: &[Vec<Json>],
	) -> Result<(), KernelError> {
		let ix = self.sheet_index(sheet)?;
		let rng = CellRange::parse(range)?;
		for (dr, row) in values.iter().enumerate().take(rng.rows() as usize) {
			for (dc, value) in row.iter().enumerate().take(rng.cols() as usize) {
				let at = Address::new(rng.start.row + dr as u32, rng.start.col + dc as u32);
				self.write_cell(ix, at, value, false);
			}
		}
		Ok(())
	}

	fn get_cell(&self, sheet: Option<&str>, address: &str) -> Result<CellSnapshot, KernelError> {
		let ix = self.sheet_index(sheet)?;
		let at = Address::parse(address)?;
		Ok(self.snapshot(ix, at))
	}

	fn get_cell_rich(
		&self,
		sheet: Option<&str>,
		address: &str,
	) -> Result<CellSnapshot, KernelError> {
		self.get_cell(sheet, address)
	}

	fn get_range_compact(
		&self,
		sheet: Option<&str>,
		range: &str,
	) -> Result<Vec<Vec<Json>>, KernelError> {
		let ix = self.sheet_index(sheet)?;
		let rng = CellRange::parse(range)?;
		let sheet = self.wb.sheet(ix);
		let mut out = Vec::with_capacity(rng.rows() as usize);
		for row in rng.start.row..=rng.end.row {
			let mut cells = Vec::with_capacity(rng.cols() as usize);
			for col in rng.start.col..=rng.end.col {
				let cell = sheet.get(row, col);
				let input =
					cell.and_then(|c| c.input.clone()).map(Json::String).unwrap_or(Json::Null);
				let value = cell.map(|c| c.value.to_json()).unwrap_or(Json::Null);
				cells.push(Json::Array(vec![input, value]));
			}
			out.push(cells);
		}
		Ok(out)
	}

	fn recalculate(&mut self, _sheet: Option<&str>) -> Result<Vec<CellDelta>, KernelError> {
		// deltas are never filtered by the sheet argument
		let mut touched: Vec<_> = self.dirty.drain().collect();
		let order: Vec<String> = self.wb.sheets.iter().map(|s| s.name.clone()).collect();
		touched.retain(|(name, _, _)| order.contains(name));
		touched.sort_by_key(|(name, row, col)| {
			(order.iter().position(|n| n == name).unwrap_or(usize::MAX), *row, *col)
		});
		let mut out = Vec::with_capacity(touched.len());
		for (name, row, col) in touched {
			let ix = self.wb.resolve_sheet(Some(&name))?;
			let value = self
				.wb
				.sheet(ix)
				.get(row, col)
				.map(|c| c.value.to_json())
				.unwrap_or(Json::Null);
			out.push(CellDelta {
				sheet: name,
				address: Address::new(row, col).to_string(),
				value,
			});
		}
		Ok(out)
	}

	fn intern_style(&mut self, style: &Json) -> Result<u32, KernelError> {
		Ok(self.wb.styles.intern(style))
	}

	fn set_cell_style_id(
		&mut self,
		sheet: &str,
		address: &str,
		style_id: u32,
	) -> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		let at = Address::parse(address)?;
		let style = self.style_checked(style_id)?;
		let sheet = self.wb.sheet_mut(ix);
		let mut cell = sheet.get(at.row, at.col).cloned().unwrap_or_default();
		cell.style_id = style;
		sheet.put(at.row, at.col, cell);
		Ok(())
	}

	fn set_row_style_id(&mut self, sheet: &str, row: u32, style_id: u32)
		-> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		let style = self.style_checked(style_id)?;
		match style {
			Some(id) => self.wb.sheet_mut(ix).row_styles.insert(row, id),
			None => self.wb.sheet_mut(ix).row_styles.remove(&row),
		};
		Ok(())
	}

	fn set_col_style_id(&mut self, sheet: &str, col: u32, style_id: u32)
		-> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		let style = self.style_checked(style_id)?;
		match style {
			Some(id) => self.wb.sheet_mut(ix).col_styles.insert(col, id),
			None => self.wb.sheet_mut(ix).col_styles.remove(&col),
		};
		Ok(())
	}

	fn set_sheet_default_style_id(&mut self, sheet: &str, style_id: u32)
		-> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		self.wb.sheet_mut(ix).default_style = self.style_checked(style_id)?;
		Ok(())
	}

	fn set_col_width(&mut self, sheet: &str, col: u32, width: f64) -> Result<(), KernelError> {
		if !width.is_finite() || width < 0.0 {
			return Err(KernelError::Workbook(Error::InvalidField {
				field: "width".to_owned(),
				message: "must be a finite nonnegative number".to_owned(),
			}));
		}
		let ix = self.sheet_index(Some(sheet))?;
		self.wb.sheet_mut(ix).col_widths.insert(col, width);
		Ok(())
	}

	fn set_col_width_chars(
		&mut self,
		sheet: &str,
		col: u32,
		width_chars: f64,
	) -> Result<(), KernelError> {
		if !width_chars.is_finite() || width_chars < 0.0 {
			return Err(KernelError::Workbook(Error::InvalidField {
				field: "widthChars".to_owned(),
				message: "must be a finite nonnegative number".to_owned(),
			}));
		}
		let ix = self.sheet_index(Some(sheet))?;
		self.wb.sheet_mut(ix).col_widths_chars.insert(col, width_chars);
		Ok(())
	}

	fn set_col_hidden(&mut self, sheet: &str, col: u32, hidden: bool) -> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		if hidden {
			self.wb.sheet_mut(ix).hidden_cols.insert(col);
		} else {
			self.wb.sheet_mut(ix).hidden_cols.remove(&col);
		}
		Ok(())
	}

	fn set_format_runs_by_col(
		&mut self,
		sheet: &str,
		col: u32,
		runs: &[FormatRun],
	) -> Result<(), KernelError> {
		for run in runs {
			if run.end_row_exclusive <= run.start_row {
				return Err(KernelError::Workbook(Error::InvalidField {
					field: "runs".to_owned(),
					message: "endRowExclusive must be greater than startRow".to_owned(),
				}));
			}
			self.style_checked(run.style_id)?;
		}
		let ix = self.sheet_index(Some(sheet))?;
		if runs.is_empty() {
			self.wb.sheet_mut(ix).format_runs.remove(&col);
		} else {
			self.wb.sheet_mut(ix).format_runs.insert(col, runs.to_vec());
		}
		Ok(())
	}

	fn set_sheet_dimensions(&mut self, sheet: &str, rows: u32, cols: u32)
		-> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		let target = self.wb.sheet_mut(ix);
		target.rows = Some(rows);
		target.cols = Some(cols);
		Ok(())
	}

	fn get_sheet_dimensions(&self, sheet: Option<&str>) -> Result<(u32, u32), KernelError> {
		let ix = self.sheet_index(sheet)?;
		Ok(self.wb.sheet(ix).dimensions())
	}

	fn set_sheet_origin(&mut self, sheet: &str, origin: &str) -> Result<(), KernelError> {
		let ix = self.sheet_index(Some(sheet))?;
		Address::parse(origin)?;
		self.wb.sheet_mut(ix).origin = Some(origin.trim().to_owned());
		Ok(())
	}

	fn apply_operation(&mut self, op: &EditOp) -> Result<(), KernelError> {
		let ix = self.sheet_index(op.sheet())?;
		// both the pre-image and the post-image of the edit show up as deltas
		self.mark_sheet_dirty(ix);
		op.apply(self.wb.sheet_mut(ix))?;
		self.mark_sheet_dirty(ix);
		Ok(())
	}

	fn set_engine_info(&mut self, info: &Json) -> Result<(), KernelError> {
		self.wb.info = self.wb.info.merge(info)?;
		Ok(())
	}

	fn workbook_info(&self) -> Result<Json, KernelError> {
		Ok(serde_json::to_value(self.wb.workbook_info()).map_err(Error::from)?)
	}

	fn first_sheet_name(&self) -> String {
		self.wb.first_sheet_name().to_owned()
	}

	fn supported_locale_ids(&self) -> Vec<String> {
		locale::supported_locale_ids().iter().map(|id| (*id).to_owned()).collect()
	}

	fn locale_info(&self, id: &str) -> Result<Json, KernelError> {
		let loc = locale::locale(id).ok_or_else(|| {
			KernelError::Workbook(Error::InvalidField {
				field: "localeId".to_owned(),
				message: format!("unsupported locale `{id}`"),
			})
		})?;
		Ok(serde_json::to_value(loc).map_err(Error::from)?)
	}

	fn lex_formula(&self, formula: &str, opts: &ParseOptions) -> Result<Json, KernelError> {
		let tokens = syn::lex(formula, opts)?;
		Ok(serde_json::to_value(tokens).map_err(Error::from)?)
	}

	fn lex_formula_partial(
		&self,
		formula: &str,
		_cursor: Option<usize>,
		opts: &ParseOptions,
	) -> Result<Json, KernelError> {
		let tokens = syn::lex_partial(formula, opts)?;
		Ok(serde_json::to_value(tokens).map_err(Error::from)?)
	}

	fn parse_formula_partial(
		&self,
		formula: &str,
		cursor: Option<usize>,
		opts: &ParseOptions,
	) -> Result<Json, KernelError> {
		let ctx = syn::parse_partial(formula, cursor, opts)?;
		Ok(serde_json::to_value(ctx).map_err(Error::from)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn set_then_recalculate_then_get() {
		let mut kernel = GridKernel::new();
		kernel.set_cell(None, "A1", &json!(42.0)).unwrap();
		let deltas = kernel.recalculate(None).unwrap();
		assert_eq!(deltas.len(), 1);
		assert_eq!(deltas[0].address, "A1");
		assert_eq!(deltas[0].value, json!(42.0));
		let snap = kernel.get_cell(None, "A1").unwrap();
		assert_eq!(snap.value, json!(42.0));
		assert_eq!(snap.sheet, "Sheet1");
	}

	#[test]
	fn null_clears_and_reports_explicit_null() {
		let mut kernel = GridKernel::new();
		kernel.set_cell(None, "B2", &json!(1.0)).unwrap();
		kernel.recalculate(None).unwrap();
		kernel.set_cell(None, "B2", &json!(null)).unwrap();
		let deltas = kernel.recalculate(None).unwrap();
		assert_eq!(deltas.len(), 1);
		assert_eq!(deltas[0].value, Json::Null);
		// the cell slot itself is gone
		assert!(kernel.wb.sheet(0).cells.is_empty());
	}

	#[test]
	fn delta_order_is_sheet_row_col() {
		let mut kernel = GridKernel::new();
		kernel.wb.sheet_named_mut("Later");
		kernel.set_cell(Some("Later"), "A1", &json!(1)).unwrap();
		kernel.set_cell(None, "C3", &json!(2)).unwrap();
		kernel.set_cell(None, "A2", &json!(3)).unwrap();
		let deltas = kernel.recalculate(None).unwrap();
		let got: Vec<_> =
			deltas.iter().map(|d| (d.sheet.as_str(), d.address.as_str())).collect();
		assert_eq!(got, vec![("Sheet1", "A2"), ("Sheet1", "C3"), ("Later", "A1")]);
	}

	#[test]
	fn formula_input_is_kept_not_evaluated() {
		let mut kernel = GridKernel::new();
		kernel.set_cell(None, "A1", &json!("=1+2")).unwrap();
		let snap = kernel.get_cell(None, "A1").unwrap();
		assert_eq!(snap.input.as_deref(), Some("=1+2"));
		assert_eq!(snap.value, Json::Null);
	}

	#[test]
	fn style_clear_sentinel() {
		let mut kernel = GridKernel::new();
		let id = kernel.intern_style(&json!({"bold": true})).unwrap();
		kernel.set_cell(None, "A1", &json!(1)).unwrap();
		kernel.set_cell_style_id("Sheet1", "A1", id).unwrap();
		assert_eq!(kernel.wb.sheet(0).get(0, 0).unwrap().style_id, Some(id));
		kernel.set_cell_style_id("Sheet1", "A1", 0).unwrap();
		assert_eq!(kernel.wb.sheet(0).get(0, 0).unwrap().style_id, None);
	}

	#[test]
	fn encrypted_load_is_unavailable() {
		let mut kernel = GridKernel::new();
		let err = kernel
			.load_from_encrypted_xlsx_bytes(Bytes::from_static(b"abcd"), "pw")
			.unwrap_err();
		assert!(matches!(err, KernelError::NotAvailable(_)));
	}

	#[test]
	fn range_round_trip() {
		let mut kernel = GridKernel::new();
		kernel
			.set_range(None, "A1:B2", &[
				vec![json!(1), json!(2)],
				vec![json!(3), json!(4)],
			])
			.unwrap();
		let compact = kernel.get_range_compact(None, "A1:B2").unwrap();
		assert_eq!(compact[0][1], json!([null, 2.0]));
		assert_eq!(compact[1][0], json!([null, 3.0]));
	}
}
