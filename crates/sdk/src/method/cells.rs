use futures::future::BoxFuture;
use serde_json::{json, Value as Json};

use gridbook_core::exe::{CellDelta, CellSnapshot, CellUpdate};
use gridbook_core::rpc::method::Method;

use crate::err::ErrorKind;
use crate::method::from_json;
use crate::opt::CallOptions;
use crate::{Engine, Result};

impl Engine {
	/// Buffer one scalar edit.
	///
	/// Edits coalesce: consecutive unawaited calls land in a single
	/// `setCells` request on the next flush. The returned future settles
	/// with that flush; it is safe to drop without awaiting, in which case
	/// a failed flush is logged and swallowed.
	pub fn set_cell(
		&self,
		address: impl Into<String>,
		value: impl Into<Json>,
		sheet: Option<&str>,
	) -> SetCell {
		let update = CellUpdate {
			sheet: sheet.map(str::to_owned),
			address: address.into(),
			value: value.into(),
		};
		SetCell {
			rx: self.enqueue_set_cell(update),
		}
	}

	/// Apply a bulk list of scalar edits in one request.
	pub async fn set_cells(&self, updates: Vec<CellUpdate>) -> Result<()> {
		self.call(
			Method::SetCells,
			json!({ "updates": updates }),
			None,
			CallOptions::default(),
		)
		.await?;
		Ok(())
	}

	/// Set a rich (formatted) cell value.
	pub async fn set_cell_rich(
		&self,
		address: impl Into<String>,
		value: Json,
		sheet: Option<&str>,
	) -> Result<()> {
		let params = json!({
			"sheet": sheet,
			"address": address.into(),
			"value": value,
		});
		self.call(Method::SetCellRich, params, None, CallOptions::default()).await?;
		Ok(())
	}

	/// Write a 2-d block of values over a range.
	pub async fn set_range(
		&self,
		range: impl Into<String>,
		values: Vec<Vec<Json>>,
		sheet: Option<&str>,
	) -> Result<()> {
		let params = json!({
			"sheet": sheet,
			"range": range.into(),
			"values": values,
		});
		self.call(Method::SetRange, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn get_cell(
		&self,
		address: impl Into<String>,
		sheet: Option<&str>,
	) -> Result<CellSnapshot> {
		self.get_cell_with(address, sheet, CallOptions::default()).await
	}

	/// [`Engine::get_cell`] with an abort signal or time budget.
	pub async fn get_cell_with(
		&self,
		address: impl Into<String>,
		sheet: Option<&str>,
		opts: CallOptions,
	) -> Result<CellSnapshot> {
		let params = json!({ "address": address.into(), "sheet": sheet });
		from_json(self.call(Method::GetCell, params, None, opts).await?)
	}

	pub async fn get_cell_rich(
		&self,
		address: impl Into<String>,
		sheet: Option<&str>,
	) -> Result<CellSnapshot> {
		let params = json!({ "address": address.into(), "sheet": sheet });
		from_json(self.call(Method::GetCellRich, params, None, CallOptions::default()).await?)
	}

	/// Fetch a range as a 2-d array of `[input, value]` pairs.
	pub async fn get_range_compact(
		&self,
		range: impl Into<String>,
		sheet: Option<&str>,
	) -> Result<Vec<Vec<Json>>> {
		let params = json!({ "range": range.into(), "sheet": sheet });
		from_json(self.call(Method::GetRangeCompact, params, None, CallOptions::default()).await?)
	}

	/// Recompute and fetch the resulting cell deltas, ordered by sheet
	/// insertion order, then row, then column.
	pub async fn recalculate(&self, sheet: Option<&str>) -> Result<Vec<CellDelta>> {
		let params = json!({ "sheet": sheet });
		from_json(self.call(Method::Recalculate, params, None, CallOptions::default()).await?)
	}
}

/// The pending result of a buffered [`Engine::set_cell`] edit.
#[must_use = "dropping this future leaves the edit buffered; awaiting it observes the flush"]
pub struct SetCell {
	pub(crate) rx: Option<flume::Receiver<Result<Json>>>,
}

impl std::future::IntoFuture for SetCell {
	type Output = Result<()>;
	type IntoFuture = BoxFuture<'static, Self::Output>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(async move {
			match self.rx {
				Some(rx) => match rx.recv_async().await {
					Ok(result) => result.map(|_| ()),
					Err(_) => {
						Err(ErrorKind::Terminated.with_context("the engine has been terminated"))
					}
				},
				None => Err(ErrorKind::Terminated.with_context("the engine has been terminated")),
			}
		})
	}
}
