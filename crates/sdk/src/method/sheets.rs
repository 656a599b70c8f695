use serde::Deserialize;
use serde_json::json;

use gridbook_core::rpc::method::Method;

use crate::method::from_json;
use crate::opt::CallOptions;
use crate::{Engine, Result};

/// The reported extent of a sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct SheetDimensions {
	pub rows: u32,
	pub cols: u32,
}

impl Engine {
	pub async fn set_sheet_dimensions(&self, sheet: &str, rows: u32, cols: u32) -> Result<()> {
		let params = json!({ "sheet": sheet, "rows": rows, "cols": cols });
		self.call(Method::SetSheetDimensions, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn get_sheet_dimensions(&self, sheet: Option<&str>) -> Result<SheetDimensions> {
		let params = json!({ "sheet": sheet });
		from_json(
			self.call(Method::GetSheetDimensions, params, None, CallOptions::default()).await?,
		)
	}

	/// Move the anchor cell the sheet's grid is displayed from.
	pub async fn set_sheet_origin(&self, sheet: &str, origin: &str) -> Result<()> {
		let params = json!({ "sheet": sheet, "origin": origin });
		self.call(Method::SetSheetOrigin, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_col_width(&self, sheet: &str, col: u32, width: f64) -> Result<()> {
		let params = json!({ "sheet": sheet, "col": col, "width": width });
		self.call(Method::SetColWidth, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_col_width_chars(&self, sheet: &str, col: u32, width_chars: f64) -> Result<()> {
		let params = json!({ "sheet": sheet, "col": col, "widthChars": width_chars });
		self.call(Method::SetColWidthChars, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn set_col_hidden(&self, sheet: &str, col: u32, hidden: bool) -> Result<()> {
		let params = json!({ "sheet": sheet, "col": col, "hidden": hidden });
		self.call(Method::SetColHidden, params, None, CallOptions::default()).await?;
		Ok(())
	}
}
