use bytes::Bytes;
use serde_json::{json, Value as Json};
use tokio::sync::Mutex;

use crate::cnf::CLEAR_STYLE_ID;
use crate::exe::{CellUpdate, Kernel, KernelError};
use crate::rpc::args::{self, *};
use crate::rpc::method::Method;
use crate::rpc::rpc_error::RpcError;
use crate::syn::options::ParseOptions;

/// The request surface a connection executes against.
///
/// Handlers lock the kernel for the duration of one call, so requests may
/// overlap at the dispatch level while kernel entrypoints stay serialized.
#[allow(async_fn_in_trait)]
pub trait RpcContext {
	/// The kernel driven by this connection generation.
	fn kernel(&self) -> &Mutex<Box<dyn Kernel>>;

	async fn execute(
		&self,
		method: &str,
		params: Json,
		bytes: Option<Bytes>,
	) -> Result<Json, RpcError> {
		match Method::parse(method) {
			Method::Unknown => Err(RpcError::MethodNotFound(method.to_owned())),
			Method::Ping => Ok(Json::from("pong")),
			Method::NewWorkbook => self.new_workbook().await,
			Method::LoadFromXlsxBytes => self.load_from_xlsx_bytes(bytes).await,
			Method::LoadFromEncryptedXlsxBytes => {
				self.load_from_encrypted_xlsx_bytes(params, bytes).await
			}
			Method::SetCell => self.set_cell(params).await,
			Method::SetCells => self.set_cells(params).await,
			Method::SetCellRich => self.set_cell_rich(params).await,
			Method::SetRange => self.set_range(params).await,
			Method::SetSheetDimensions => self.set_sheet_dimensions(params).await,
			Method::GetSheetDimensions => self.get_sheet_dimensions(params).await,
			Method::Recalculate => self.recalculate(params).await,
			Method::GetCell => self.get_cell(params).await,
			Method::GetCellRich => self.get_cell_rich(params).await,
			Method::GetRangeCompact => self.get_range_compact(params).await,
			Method::InternStyle => self.intern_style(params).await,
			Method::SetCellStyleId => self.set_cell_style_id(params).await,
			Method::SetRowStyleId => self.set_row_style_id(params).await,
			Method::SetColStyleId => self.set_col_style_id(params).await,
			Method::SetSheetDefaultStyleId => self.set_sheet_default_style_id(params).await,
			Method::SetColWidth => self.set_col_width(params).await,
			Method::SetColWidthChars => self.set_col_width_chars(params).await,
			Method::SetColHidden => self.set_col_hidden(params).await,
			Method::SetFormatRunsByCol => self.set_format_runs_by_col(params).await,
			Method::SetSheetOrigin => self.set_sheet_origin(params).await,
			Method::ApplyOperation => self.apply_operation(params).await,
			Method::GoalSeek => self.goal_seek(params).await,
			Method::SetEngineInfo => self.set_engine_info(params).await,
			Method::SupportedLocaleIds => self.supported_locale_ids().await,
			Method::GetLocaleInfo => self.get_locale_info(params).await,
			Method::LexFormula => self.lex_formula(params).await,
			Method::LexFormulaPartial => self.lex_formula_partial(params).await,
			Method::ParseFormulaPartial => self.parse_formula_partial(params).await,
			Method::GetWorkbookInfo => self.get_workbook_info().await,
		}
	}

	// ------------------------------
	// Methods for workbook lifecycle
	// ------------------------------

	async fn new_workbook(&self) -> Result<Json, RpcError> {
		let mut kernel = self.kernel().lock().await;
		kernel.new_workbook()?;
		Ok(Json::Null)
	}

	async fn load_from_xlsx_bytes(&self, bytes: Option<Bytes>) -> Result<Json, RpcError> {
		let bytes = bytes.ok_or_else(|| {
			RpcError::InvalidParams("loadFromXlsxBytes: bytes payload is missing".to_owned())
		})?;
		let mut kernel = self.kernel().lock().await;
		kernel.load_from_xlsx_bytes(bytes)?;
		Ok(Json::Null)
	}

	async fn load_from_encrypted_xlsx_bytes(
		&self,
		params: Json,
		bytes: Option<Bytes>,
	) -> Result<Json, RpcError> {
		let p: LoadEncryptedParams = args::take(Method::LoadFromEncryptedXlsxBytes, params)?;
		let bytes = bytes.ok_or_else(|| {
			RpcError::InvalidParams(
				"loadFromEncryptedXlsxBytes: bytes payload is missing".to_owned(),
			)
		})?;
		let mut kernel = self.kernel().lock().await;
		kernel.load_from_encrypted_xlsx_bytes(bytes, &p.password)?;
		Ok(Json::Null)
	}

	// ------------------------------
	// Methods for editing cells
	// ------------------------------

	async fn set_cell(&self, params: Json) -> Result<Json, RpcError> {
		let p: CellValueParams = args::take(Method::SetCell, params)?;
		let mut kernel = self.kernel().lock().await;
		kernel.set_cell(normalize_sheet(p.sheet.as_deref()), &p.address, &p.value)?;
		Ok(Json::Null)
	}

	async fn set_cells(&self, params: Json) -> Result<Json, RpcError> {
		let p: SetCellsParams = args::take(Method::SetCells, params)?;
		let updates: Vec<CellUpdate> = p
			.updates
			.into_iter()
			.map(|u| CellUpdate {
				sheet: u.sheet.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()),
				address: u.address,
				value: u.value,
			})
			.collect();
		let mut kernel = self.kernel().lock().await;
		match kernel.set_cells(&updates) {
			// kernels without a bulk entrypoint take the edits one by one
			Err(KernelError::NoBulkEntrypoint) => {
				for update in &updates {
					kernel.set_cell(update.sheet.as_deref(), &update.address, &update.value)?;
				}
				Ok(Json::Null)
			}
			Err(e) => Err(e.into()),
			Ok(()) => Ok(Json::Null),
		}
	}

	async fn set_cell_rich(&self, params: Json) -> Result<Json, RpcError> {
		let p: CellValueParams = args::take(Method::SetCellRich, params)?;
		let mut kernel = self.kernel().lock().await;
		kernel.set_cell_rich(normalize_sheet(p.sheet.as_deref()), &p.address, &p.value)?;
		Ok(Json::Null)
	}

	async fn set_range(&self, params: Json) -> Result<Json, RpcError> {
		let p: SetRangeParams = args::take(Method::SetRange, params)?;
		let mut kernel = self.kernel().lock().await;
		kernel.set_range(normalize_sheet(p.sheet.as_deref()), &p.range, &p.values)?;
		Ok(Json::Null)
	}

	// ------------------------------
	// Methods for reading cells
	// ------------------------------

	async fn get_cell(&self, params: Json) -> Result<Json, RpcError> {
		let p: GetCellParams = args::take(Method::GetCell, params)?;
		let kernel = self.kernel().lock().await;
		let snap = kernel.get_cell(normalize_sheet(p.sheet.as_deref()), &p.address)?;
		Ok(serde_json::to_value(snap).map_err(crate::err::Error::from)?)
	}

	async fn get_cell_rich(&self, params: Json) -> Result<Json, RpcError> {
		let p: GetCellParams = args::take(Method::GetCellRich, params)?;
		let kernel = self.kernel().lock().await;
		let snap = kernel.get_cell_rich(normalize_sheet(p.sheet.as_deref()), &p.address)?;
		Ok(serde_json::to_value(snap).map_err(crate::err::Error::from)?)
	}

	async fn get_range_compact(&self, params: Json) -> Result<Json, RpcError> {
		let p: GetRangeParams = args::take(Method::GetRangeCompact, params)?;
		let kernel = self.kernel().lock().await;
		let rows = kernel.get_range_compact(normalize_sheet(p.sheet.as_deref()), &p.range)?;
		Ok(serde_json::to_value(rows).map_err(crate::err::Error::from)?)
	}

	async fn recalculate(&self, params: Json) -> Result<Json, RpcError> {
		let p: SheetParams = args::take(Method::Recalculate, params)?;
		let mut kernel = self.kernel().lock().await;
		let deltas = kernel.recalculate(normalize_sheet(p.sheet.as_deref()))?;
		let value = serde_json::to_value(deltas).map_err(crate::err::Error::from)?;
		Ok(normalize_deltas(value))
	}

	// ------------------------------
	// Methods for styling
	// ------------------------------

	async fn intern_style(&self, params: Json) -> Result<Json, RpcError> {
		let p: InternStyleParams = args::take(Method::InternStyle, params)?;
		let mut kernel = self.kernel().lock().await;
		let id = kernel.intern_style(&p.style)?;
		Ok(Json::from(id))
	}

	async fn set_cell_style_id(&self, params: Json) -> Result<Json, RpcError> {
		let p = SetCellStyleIdParams::from_params(params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), p.sheet.as_deref());
		kernel.set_cell_style_id(&sheet, &p.address, p.style_id.unwrap_or(CLEAR_STYLE_ID))?;
		Ok(Json::Null)
	}

	async fn set_row_style_id(&self, params: Json) -> Result<Json, RpcError> {
		let p: RowStyleParams = args::take(Method::SetRowStyleId, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_row_style_id(&sheet, p.row, p.style_id.unwrap_or(CLEAR_STYLE_ID))?;
		Ok(Json::Null)
	}

	async fn set_col_style_id(&self, params: Json) -> Result<Json, RpcError> {
		let p: ColStyleParams = args::take(Method::SetColStyleId, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_col_style_id(&sheet, p.col, p.style_id.unwrap_or(CLEAR_STYLE_ID))?;
		Ok(Json::Null)
	}

	async fn set_sheet_default_style_id(&self, params: Json) -> Result<Json, RpcError> {
		let p: SheetStyleParams = args::take(Method::SetSheetDefaultStyleId, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_sheet_default_style_id(&sheet, p.style_id.unwrap_or(CLEAR_STYLE_ID))?;
		Ok(Json::Null)
	}

	async fn set_format_runs_by_col(&self, params: Json) -> Result<Json, RpcError> {
		let p: FormatRunsParams = args::take(Method::SetFormatRunsByCol, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_format_runs_by_col(&sheet, p.col, &p.runs)?;
		Ok(Json::Null)
	}

	// ------------------------------
	// Methods for sheet layout
	// ------------------------------

	async fn set_col_width(&self, params: Json) -> Result<Json, RpcError> {
		let p: ColWidthParams = args::take(Method::SetColWidth, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_col_width(&sheet, p.col, p.width)?;
		Ok(Json::Null)
	}

	async fn set_col_width_chars(&self, params: Json) -> Result<Json, RpcError> {
		let p: ColWidthCharsParams = args::take(Method::SetColWidthChars, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_col_width_chars(&sheet, p.col, p.width_chars)?;
		Ok(Json::Null)
	}

	async fn set_col_hidden(&self, params: Json) -> Result<Json, RpcError> {
		let p: ColHiddenParams = args::take(Method::SetColHidden, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_col_hidden(&sheet, p.col, p.hidden)?;
		Ok(Json::Null)
	}

	async fn set_sheet_dimensions(&self, params: Json) -> Result<Json, RpcError> {
		let p: SheetDimensionsParams = args::take(Method::SetSheetDimensions, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_sheet_dimensions(&sheet, p.rows, p.cols)?;
		Ok(Json::Null)
	}

	async fn get_sheet_dimensions(&self, params: Json) -> Result<Json, RpcError> {
		let p: SheetParams = args::take(Method::GetSheetDimensions, params)?;
		let kernel = self.kernel().lock().await;
		let (rows, cols) = kernel.get_sheet_dimensions(normalize_sheet(p.sheet.as_deref()))?;
		Ok(json!({ "rows": rows, "cols": cols }))
	}

	async fn set_sheet_origin(&self, params: Json) -> Result<Json, RpcError> {
		let p: SheetOriginParams = args::take(Method::SetSheetOrigin, params)?;
		let mut kernel = self.kernel().lock().await;
		let sheet = required_sheet(kernel.as_ref(), Some(&p.sheet));
		kernel.set_sheet_origin(&sheet, &p.origin)?;
		Ok(Json::Null)
	}

	// ------------------------------
	// Methods for structural edits
	// ------------------------------

	async fn apply_operation(&self, params: Json) -> Result<Json, RpcError> {
		let p: ApplyOperationParams = args::take(Method::ApplyOperation, params)?;
		let mut kernel = self.kernel().lock().await;
		kernel.apply_operation(&p.op)?;
		Ok(Json::Null)
	}

	async fn goal_seek(&self, params: Json) -> Result<Json, RpcError> {
		let p: GoalSeekParams = args::take(Method::GoalSeek, params)?;
		let target_value = p.target_value;
		let request = serde_json::to_value(&p).map_err(crate::err::Error::from)?;
		let mut kernel = self.kernel().lock().await;
		let raw = kernel.goal_seek(&request)?;
		Ok(normalize_goal_seek(raw, target_value))
	}

	// ------------------------------
	// Methods for engine metadata
	// ------------------------------

	async fn set_engine_info(&self, params: Json) -> Result<Json, RpcError> {
		let p: SetEngineInfoParams = args::take(Method::SetEngineInfo, params)?;
		let mut kernel = self.kernel().lock().await;
		kernel.set_engine_info(&p.info)?;
		Ok(Json::Null)
	}

	async fn get_workbook_info(&self) -> Result<Json, RpcError> {
		let kernel = self.kernel().lock().await;
		Ok(kernel.workbook_info()?)
	}

	// ------------------------------
	// Methods for formula tooling
	// ------------------------------

	async fn supported_locale_ids(&self) -> Result<Json, RpcError> {
		let kernel = self.kernel().lock().await;
		let ids = kernel.supported_locale_ids();
		Ok(serde_json::to_value(ids).map_err(crate::err::Error::from)?)
	}

	async fn get_locale_info(&self, params: Json) -> Result<Json, RpcError> {
		let p: LocaleInfoParams = args::take(Method::GetLocaleInfo, params)?;
		let kernel = self.kernel().lock().await;
		Ok(kernel.locale_info(&p.locale_id)?)
	}

	async fn lex_formula(&self, params: Json) -> Result<Json, RpcError> {
		let p: FormulaParams = args::take(Method::LexFormula, params)?;
		let opts = parse_options(p.options.as_ref())?;
		let kernel = self.kernel().lock().await;
		Ok(kernel.lex_formula(&p.formula, &opts)?)
	}

	async fn lex_formula_partial(&self, params: Json) -> Result<Json, RpcError> {
		let p: FormulaParams = args::take(Method::LexFormulaPartial, params)?;
		let opts = parse_options(p.options.as_ref())?;
		let kernel = self.kernel().lock().await;
		Ok(kernel.lex_formula_partial(&p.formula, p.cursor, &opts)?)
	}

	async fn parse_formula_partial(&self, params: Json) -> Result<Json, RpcError> {
		let p: FormulaParams = args::take(Method::ParseFormulaPartial, params)?;
		let opts = parse_options(p.options.as_ref())?;
		let kernel = self.kernel().lock().await;
		Ok(kernel.parse_formula_partial(&p.formula, p.cursor, &opts)?)
	}
}

/// The context backing one connection generation.
pub struct WorkerContext {
	kernel: Mutex<Box<dyn Kernel>>,
}

impl WorkerContext {
	pub fn new(kernel: Box<dyn Kernel>) -> Self {
		WorkerContext {
			kernel: Mutex::new(kernel),
		}
	}
}

impl RpcContext for WorkerContext {
	fn kernel(&self) -> &Mutex<Box<dyn Kernel>> {
		&self.kernel
	}
}

// ------------------------------
// Private utility functions
// ------------------------------

/// Trim a sheet parameter; blank names resolve to the first sheet.
fn normalize_sheet(sheet: Option<&str>) -> Option<&str> {
	sheet.map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve a sheet parameter which the kernel signature requires: blank or
/// whitespace names become the first sheet's canonical name.
fn required_sheet(kernel: &dyn Kernel, sheet: Option<&str>) -> String {
	match normalize_sheet(sheet) {
		Some(s) => s.to_owned(),
		None => kernel.first_sheet_name(),
	}
}

fn parse_options(value: Option<&Json>) -> Result<ParseOptions, RpcError> {
	ParseOptions::from_value(value).map_err(|e| RpcError::Thrown(e.to_string()))
}

/// Delta lists may come out of the kernel with absent cell values; those
/// become explicit `null` before the response is posted.
fn normalize_deltas(mut value: Json) -> Json {
	if let Json::Array(items) = &mut value {
		for item in items {
			if let Json::Object(obj) = item {
				obj.entry("value").or_insert(Json::Null);
			}
		}
	}
	value
}

/// Bring a goal-seek payload into the `{ result, changes }` shape.
///
/// Legacy kernel builds return the flat result with no change list and
/// sometimes without `finalOutput`; the final output is then reconstructed
/// as `targetValue + finalError`.
fn normalize_goal_seek(raw: Json, target_value: f64) -> Json {
	let (mut result, changes) = match raw {
		Json::Object(mut obj) if obj.contains_key("result") => {
			let result = obj.remove("result").unwrap_or(Json::Null);
			let changes = obj.remove("changes").unwrap_or_else(|| Json::Array(Vec::new()));
			(result, changes)
		}
		other => (other, Json::Array(Vec::new())),
	};
	if let Json::Object(obj) = &mut result {
		if !obj.contains_key("finalOutput") {
			let reconstructed = obj
				.get("finalError")
				.and_then(Json::as_f64)
				.map(|err| target_value + err)
				.and_then(serde_json::Number::from_f64)
				.map(Json::Number)
				.unwrap_or(Json::Null);
			obj.insert("finalOutput".to_owned(), reconstructed);
		}
	}
	json!({ "result": result, "changes": normalize_deltas(changes) })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::exe::{CellDelta, CellSnapshot, GridKernel};
	use crate::wbk::ops::EditOp;
	use crate::wbk::style::FormatRun;
	use serde_json::json;

	// A kernel mimicking an older build: no bulk entrypoint, flat
	// goal-seek payloads.
	struct LegacyKernel {
		inner: GridKernel,
		single_sets: usize,
	}

	impl LegacyKernel {
		fn new() -> Self {
			LegacyKernel {
				inner: GridKernel::new(),
				single_sets: 0,
			}
		}
	}

	impl Kernel for LegacyKernel {
		fn new_workbook(&mut self) -> Result<(), KernelError> {
			self.inner.new_workbook()
		}
		fn load_from_xlsx_bytes(&mut self, bytes: bytes::Bytes) -> Result<(), KernelError> {
			self.inner.load_from_xlsx_bytes(bytes)
		}
		fn set_cell(
			&mut self,
			sheet: Option<&str>,
			address: &str,
			value: &Json,
		) -> Result<(), KernelError> {
			self.single_sets += 1;
			self.inner.set_cell(sheet, address, value)
		}
		fn set_cell_rich(
			&mut self,
			sheet: Option<&str>,
			address: &str,
			value: &Json,
		) -> Result<(), KernelError> {
			self.inner.set_cell_rich(sheet, address, value)
		}
		fn set_range(
			&mut self,
			sheet: Option<&str>,
			range: &str,
			values: &[Vec<Json>],
		) -> Result<(), KernelError> {
			self.inner.set_range(sheet, range, values)
		}
		fn get_cell(
			&self,
			sheet: Option<&str>,
			address: &str,
		) -> Result<CellSnapshot, KernelError> {
			self.inner.get_cell(sheet, address)
		}
		fn get_cell_rich(
			&self,
			sheet: Option<&str>,
			address: &str,
		) -> Result<CellSnapshot, KernelError> {
			self.inner.get_cell_rich(sheet, address)
		}
		fn get_range_compact(
			&self,
			sheet: Option<&str>,
			range: &str,
		) -> Result<Vec<Vec<Json>>, KernelError> {
			self.inner.get_range_compact(sheet, range)
		}
		fn recalculate(&mut self, sheet: Option<&str>) -> Result<Vec<CellDelta>, KernelError> {
			self.inner.recalculate(sheet)
		}
		fn intern_style(&mut self, style: &Json) -> Result<u32, KernelError> {
			self.inner.intern_style(style)
		}
		fn set_cell_style_id(
			&mut self,
			sheet: &str,
			address: &str,
			style_id: u32,
		) -> Result<(), KernelError> {
			self.inner.set_cell_style_id(sheet, address, style_id)
		}
		fn set_row_style_id(
			&mut self,
			sheet: &str,
			row: u32,
			style_id: u32,
		) -> Result<(), KernelError> {
			self.inner.set_row_style_id(sheet, row, style_id)
		}
		fn set_col_style_id(
			&mut self,
			sheet: &str,
			col: u32,
			style_id: u32,
		) -> Result<(), KernelError> {
			self.inner.set_col_style_id(sheet, col, style_id)
		}
		fn set_sheet_default_style_id(
			&mut self,
			sheet: &str,
			style_id: u32,
		) -> Result<(), KernelError> {
			self.inner.set_sheet_default_style_id(sheet, style_id)
		}
		fn set_col_width(&mut self, sheet: &str, col: u32, width: f64) -> Result<(), KernelError> {
			self.inner.set_col_width(sheet, col, width)
		}
		fn set_col_width_chars(
			&mut self,
			sheet: &str,
			col: u32,
			width_chars: f64,
		) -> Result<(), KernelError> {
			self.inner.set_col_width_chars(sheet, col, width_chars)
		}
		fn set_col_hidden(
			&mut self,
			sheet: &str,
			col: u32,
			hidden: bool,
		) -> Result<(), KernelError> {
			self.inner.set_col_hidden(sheet, col, hidden)
		}
		fn set_format_runs_by_col(
			&mut self,
			sheet: &str,
			col: u32,
			runs: &[FormatRun],
		) -> Result<(), KernelError> {
			self.inner.set_format_runs_by_col(sheet, col, runs)
		}
		fn set_sheet_dimensions(
			&mut self,
			sheet: &str,
			rows: u32,
			cols: u32,
		) -> Result<(), KernelError> {
			self.inner.set_sheet_dimensions(sheet, rows, cols)
		}
		fn get_sheet_dimensions(&self, sheet: Option<&str>) -> Result<(u32, u32), KernelError> {
			self.inner.get_sheet_dimensions(sheet)
		}
		fn set_sheet_origin(&mut self, sheet: &str, origin: &str) -> Result<(), KernelError> {
			self.inner.set_sheet_origin(sheet, origin)
		}
		fn apply_operation(&mut self, op: &EditOp) -> Result<(), KernelError> {
			self.inner.apply_operation(op)
		}
		fn goal_seek(&mut self, _request: &Json) -> Result<Json, KernelError> {
			// flat legacy payload without finalOutput
			Ok(json!({ "status": "converged", "solution": 2.5, "finalError": 0.25 }))
		}
		fn set_engine_info(&mut self, info: &Json) -> Result<(), KernelError> {
			self.inner.set_engine_info(info)
		}
		fn workbook_info(&self) -> Result<Json, KernelError> {
			self.inner.workbook_info()
		}
		fn first_sheet_name(&self) -> String {
			self.inner.first_sheet_name()
		}
		fn supported_locale_ids(&self) -> Vec<String> {
			self.inner.supported_locale_ids()
		}
		fn locale_info(&self, id: &str) -> Result<Json, KernelError> {
			self.inner.locale_info(id)
		}
		fn lex_formula(&self, formula: &str, opts: &ParseOptions) -> Result<Json, KernelError> {
			self.inner.lex_formula(formula, opts)
		}
		fn lex_formula_partial(
			&self,
			formula: &str,
			cursor: Option<usize>,
			opts: &ParseOptions,
		) -> Result<Json, KernelError> {
			self.inner.lex_formula_partial(formula, cursor, opts)
		}
		fn parse_formula_partial(
			&self,
			formula: &str,
			cursor: Option<usize>,
			opts: &ParseOptions,
		) -> Result<Json, KernelError> {
			self.inner.parse_formula_partial(formula, cursor, opts)
		}
	}

	#[tokio::test]
	async fn ping_pongs() {
		let ctx = WorkerContext::new(Box::new(GridKernel::new()));
		let res = ctx.execute("ping", Json::Null, None).await.unwrap();
		assert_eq!(res, json!("pong"));
	}

	#[tokio::test]
	async fn unknown_method_is_probeable() {
		let ctx = WorkerContext::new(Box::new(GridKernel::new()));
		let err = ctx.execute("frobnicate", Json::Null, None).await.unwrap_err();
		assert!(err.to_string().contains("unknown method: frobnicate"));
	}

	#[tokio::test]
	async fn bulk_set_falls_back_per_cell() {
		let ctx = WorkerContext::new(Box::new(LegacyKernel::new()));
		let params = json!({"updates": [
			{"address": "A1", "value": 1.0},
			{"address": "A2", "value": 2.0},
		]});
		ctx.execute("setCells", params, None).await.unwrap();
		let snap = ctx.execute("getCell", json!({"address": "A2"}), None).await.unwrap();
		assert_eq!(snap["value"], json!(2.0));
	}

	#[tokio::test]
	async fn goal_seek_normalizes_legacy_payload() {
		let ctx = WorkerContext::new(Box::new(LegacyKernel::new()));
		let params = json!({
			"targetCell": "B1",
			"targetValue": 10.0,
			"changingCell": "A1",
		});
		let out = ctx.execute("goalSeek", params, None).await.unwrap();
		assert_eq!(out["result"]["status"], json!("converged"));
		assert_eq!(out["result"]["solution"], json!(2.5));
		// finalOutput = targetValue + finalError
		assert_eq!(out["result"]["finalOutput"], json!(10.25));
		assert_eq!(out["changes"], json!([]));
	}

	#[tokio::test]
	async fn blank_sheet_resolves_for_metadata_and_cells() {
		let ctx = WorkerContext::new(Box::new(GridKernel::new()));
		ctx.execute("setCell", json!({"sheet": "  ", "address": "A1", "value": 5}), None)
			.await
			.unwrap();
		let dims = ctx
			.execute("setSheetDimensions", json!({"sheet": " ", "rows": 9, "cols": 4}), None)
			.await;
		assert!(dims.is_ok());
		let got =
			ctx.execute("getSheetDimensions", json!({"sheet": ""}), None).await.unwrap();
		assert_eq!(got, json!({"rows": 9, "cols": 4}));
	}

	#[tokio::test]
	async fn missing_capability_error_shape() {
		let ctx = WorkerContext::new(Box::new(GridKernel::new()));
		let err = ctx
			.execute(
				"loadFromEncryptedXlsxBytes",
				json!({"password": "pw"}),
				Some(bytes::Bytes::from_static(b"abcd")),
			)
			.await
			.unwrap_err();
		let msg = err.to_string();
		assert!(msg.contains("loadFromEncryptedXlsxBytes:"));
		assert!(msg.contains("is not available"));
	}

	#[test]
	fn normalize_deltas_fills_missing_values() {
		let out = normalize_deltas(json!([{"sheet": "S", "address": "A1"}]));
		assert_eq!(out, json!([{"sheet": "S", "address": "A1", "value": null}]));
	}
}
