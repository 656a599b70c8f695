//! The compute kernel seam.
//!
//! The dispatcher drives an opaque [`Kernel`] instance: a deployment
//! normally hosts a compiled formula engine behind this trait, while the
//! built-in [`GridKernel`] provides the workbook substrate without formula
//! evaluation. Kernels are loaded per connection generation through a
//! [`KernelLoader`].
mod grid;

pub use grid::GridKernel;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::err::Error as CoreError;
use crate::syn::options::ParseOptions;
use crate::wbk::ops::EditOp;
use crate::wbk::style::FormatRun;

/// One buffered scalar cell edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sheet: Option<String>,
	pub address: String,
	pub value: Json,
}

/// The state of one cell as reported to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
	pub sheet: String,
	pub address: String,
	pub input: Option<String>,
	pub value: Json,
}

/// One recalculation delta. Cleared values are explicit `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellDelta {
	pub sheet: String,
	pub address: String,
	pub value: Json,
}

/// Failures produced by a kernel entrypoint.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KernelError {
	/// The kernel has no bulk cell-update entrypoint; the dispatcher falls
	/// back to per-cell updates.
	#[error("bulk cell updates are not supported")]
	NoBulkEntrypoint,

	/// The named entrypoint is missing from this kernel build.
	#[error("{0} is not exported")]
	NotAvailable(String),

	/// A workbook-level failure.
	#[error(transparent)]
	Workbook(#[from] CoreError),

	/// Any other kernel failure, as a plain message.
	#[error("{0}")]
	Thrown(String),
}

/// The opaque compute instance hosted by the worker.
///
/// Entrypoints which only newer kernel builds export have defaults that
/// fail with [`KernelError::NotAvailable`], so older kernels degrade
/// gracefully rather than aborting dispatch.
pub trait Kernel: Send {
	fn new_workbook(&mut self) -> Result<(), KernelError>;

	fn load_from_xlsx_bytes(&mut self, bytes: Bytes) -> Result<(), KernelError>;

	fn load_from_encrypted_xlsx_bytes(
		&mut self,
		_bytes: Bytes,
		_password: &str,
	) -> Result<(), KernelError> {
		Err(KernelError::NotAvailable("loadFromEncryptedXlsxBytes".to_owned()))
	}

	fn set_cell(&mut self, sheet: Option<&str>, address: &str, value: &Json)
		-> Result<(), KernelError>;

	/// Bulk entrypoint; kernels without one keep the default.
	fn set_cells(&mut self, _updates: &[CellUpdate]) -> Result<(), KernelError> {
		Err(KernelError::NoBulkEntrypoint)
	}

	fn set_cell_rich(
		&mut self,
		sheet: Option<&str>,
		address: &str,
		value: &Json,
	) -> Result<(), KernelError>;

	fn set_range(
		&mut self,
		sheet: Option<&str>,
		range: &str,
		values: &[Vec<Json>],
	) -> Result<(), KernelError>;

	fn get_cell(&self, sheet: Option<&str>, address: &str) -> Result<CellSnapshot, KernelError>;

	fn get_cell_rich(&self, sheet: Option<&str>, address: &str)
		-> Result<CellSnapshot, KernelError>;

	/// A 2-d array of `[input, value]` pairs covering the range.
	fn get_range_compact(
		&self,
		sheet: Option<&str>,
		range: &str,
	) -> Result<Vec<Vec<Json>>, KernelError>;

	/// Recompute and report deltas in (sheet, row, col) order, where sheet
	/// comparison is by workbook insertion order. The optional sheet scopes
	/// recomputation but never filters the returned deltas.
	fn recalculate(&mut self, sheet: Option<&str>) -> Result<Vec<CellDelta>, KernelError>;

	fn intern_style(&mut self, style: &Json) -> Result<u32, KernelError>;

	fn set_cell_style_id(
		&mut self,
		sheet: &str,
		address: &str,
		style_id: u32,
	) -> Result<(), KernelError>;

	fn set_row_style_id(&mut self, sheet: &str, row: u32, style_id: u32)
		-> Result<(), KernelError>;

	fn set_col_style_id(&mut self, sheet: &str, col: u32, style_id: u32)
		-> Result<(), KernelError>;

	fn set_sheet_default_style_id(&mut self, sheet: &str, style_id: u32)
		-> Result<(), KernelError>;

	fn set_col_width(&mut self, sheet: &str, col: u32, width: f64) -> Result<(), KernelError>;

	fn set_col_width_chars(
		&mut self,
		sheet: &str,
		col: u32,
		width_chars: f64,
	) -> Result<(), KernelError>;

	fn set_col_hidden(&mut self, sheet: &str, col: u32, hidden: bool) -> Result<(), KernelError>;

	fn set_format_runs_by_col(
		&mut self,
		sheet: &str,
		col: u32,
		runs: &[FormatRun],
	) -> Result<(), KernelError>;

	fn set_sheet_dimensions(&mut self, sheet: &str, rows: u32, cols: u32)
		-> Result<(), KernelError>;

	fn get_sheet_dimensions(&self, sheet: Option<&str>) -> Result<(u32, u32), KernelError>;

	fn set_sheet_origin(&mut self, sheet: &str, origin: &str) -> Result<(), KernelError>;

	fn apply_operation(&mut self, op: &EditOp) -> Result<(), KernelError>;

	/// Goal seek in whatever shape this kernel build produces; older builds
	/// return a flat payload which the dispatcher normalizes.
	fn goal_seek(&mut self, _request: &Json) -> Result<Json, KernelError> {
		Err(KernelError::NotAvailable("goalSeek".to_owned()))
	}

	fn set_engine_info(&mut self, info: &Json) -> Result<(), KernelError>;

	fn workbook_info(&self) -> Result<Json, KernelError>;

	/// The canonical name of the first sheet, used to resolve blank sheet
	/// parameters.
	fn first_sheet_name(&self) -> String;

	fn supported_locale_ids(&self) -> Vec<String>;

	fn locale_info(&self, id: &str) -> Result<Json, KernelError>;

	fn lex_formula(&self, formula: &str, opts: &ParseOptions) -> Result<Json, KernelError>;

	fn lex_formula_partial(
		&self,
		formula: &str,
		cursor: Option<usize>,
		opts: &ParseOptions,
	) -> Result<Json, KernelError>;

	fn parse_formula_partial(
		&self,
		formula: &str,
		cursor: Option<usize>,
		opts: &ParseOptions,
	) -> Result<Json, KernelError>;
}

/// Resolves the module named in an `Init` message to a kernel instance.
pub trait KernelLoader: Send + Sync {
	fn load(&self, module_url: &str, binary_url: Option<&str>)
		-> Result<Box<dyn Kernel>, CoreError>;
}

/// The default loader: every module URL resolves to the built-in
/// [`GridKernel`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GridKernelLoader;

impl KernelLoader for GridKernelLoader {
	fn load(
		&self,
		module_url: &str,
		_binary_url: Option<&str>,
	) -> Result<Box<dyn Kernel>, CoreError> {
		if module_url.trim().is_empty() {
			return Err(CoreError::Thrown("kernel module url is empty".to_owned()));
		}
		Ok(Box::new(GridKernel::new()))
	}
}
