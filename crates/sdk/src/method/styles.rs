use serde_json::{json, Value as Json};

use gridbook_core::rpc::method::Method;
use gridbook_core::wbk::style::FormatRun;

use crate::method::from_json;
use crate::opt::CallOptions;
use crate::{Engine, Result};

impl Engine {
	/// Intern a style object, returning its id. Interning the same object
	/// twice yields the same id; id 0 always means "no style".
	pub async fn intern_style(&self, style: Json) -> Result<u32> {
		let params = json!({ "style": style });
		from_json(self.call(Method::InternStyle, params, None, CallOptions::default()).await?)
	}

	/// Assign an interned style to a cell. `None` clears it.
	pub async fn set_cell_style_id(
		&self,
		sheet: &str,
		address: &str,
		style_id: Option<u32>,
	) -> Result<()> {
		let params = json!({ "sheet": sheet, "address": address, "styleId": style_id });
		self.call(Method::SetCellStyleId, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_row_style_id(
		&self,
		sheet: &str,
		row: u32,
		style_id: Option<u32>,
	) -> Result<()> {
		let params = json!({ "sheet": sheet, "row": row, "styleId": style_id });
		self.call(Method::SetRowStyleId, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_col_style_id(
		&self,
		sheet: &str,
		col: u32,
		style_id: Option<u32>,
	) -> Result<()> {
		let params = json!({ "sheet": sheet, "col": col, "styleId": style_id });
		self.call(Method::SetColStyleId, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_sheet_default_style_id(
		&self,
		sheet: &str,
		style_id: Option<u32>,
	) -> Result<()> {
		let params = json!({ "sheet": sheet, "styleId": style_id });
		self.call(Method::SetSheetDefaultStyleId, params, None, CallOptions::default()).await?;
		Ok(())
	}

	/// Replace the style runs of one column.
	pub async fn set_format_runs_by_col(
		&self,
		sheet: &str,
		col: u32,
		runs: Vec<FormatRun>,
	) -> Result<()> {
		let params = json!({ "sheet": sheet, "col": col, "runs": runs });
		self.call(Method::SetFormatRunsByCol, params, None, CallOptions::default()).await?;
		Ok(())
	}
}
