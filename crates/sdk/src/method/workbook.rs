use serde_json::{json, Value as Json};

use gridbook_core::rpc::args::GoalSeekParams;
use gridbook_core::rpc::method::Method;
use gridbook_core::rpc::transfer::ByteView;
use gridbook_core::wbk::ops::EditOp;
use gridbook_core::wbk::WorkbookInfo;

use crate::err::ErrorKind;
use crate::method::from_json;
use crate::opt::CallOptions;
use crate::{Engine, Result};

impl Engine {
	/// Liveness probe; answers `"pong"`.
	pub async fn ping(&self) -> Result<String> {
		from_json(self.call(Method::Ping, Json::Null, None, CallOptions::default()).await?)
	}

	/// Replace the workbook with a fresh empty one.
	pub async fn new_workbook(&self) -> Result<()> {
		self.call(Method::NewWorkbook, Json::Null, None, CallOptions::default()).await?;
		Ok(())
	}

	/// Load a workbook from file bytes.
	///
	/// Only the view's live range crosses the boundary: a view covering
	/// its whole backing buffer moves it, anything narrower is copied out
	/// first.
	pub async fn load_from_xlsx_bytes(&self, bytes: impl Into<ByteView>) -> Result<()> {
		let payload = bytes.into().extract_for_transfer();
		self.call(Method::LoadFromXlsxBytes, Json::Null, Some(payload), CallOptions::default())
			.await?;
		Ok(())
	}

	/// Load a password-protected workbook from file bytes.
	pub async fn load_from_encrypted_xlsx_bytes(
		&self,
		bytes: impl Into<ByteView>,
		password: impl Into<String>,
	) -> Result<()> {
		let payload = bytes.into().extract_for_transfer();
		let params = json!({ "password": password.into() });
		self.call(
			Method::LoadFromEncryptedXlsxBytes,
			params,
			Some(payload),
			CallOptions::default(),
		)
		.await?;
		Ok(())
	}

	/// Apply a structural edit operation.
	pub async fn apply_operation(&self, op: EditOp) -> Result<()> {
		let params = json!({ "op": op });
		self.call(Method::ApplyOperation, params, None, CallOptions::default()).await?;
		Ok(())
	}

	/// Solve for an input which drives a target cell to a target value.
	/// The response always has the `{ result, changes }` shape, whatever
	/// the kernel build produced.
	pub async fn goal_seek(&self, request: GoalSeekParams) -> Result<Json> {
		let params = serde_json::to_value(&request)
			.map_err(|e| ErrorKind::Validation.with_context(e))?;
		self.call(Method::GoalSeek, params, None, CallOptions::default()).await
	}

	/// Update host metadata reported by workbook information functions.
	pub async fn set_engine_info(&self, info: Json) -> Result<()> {
		let params = json!({ "info": info });
		self.call(Method::SetEngineInfo, params, None, CallOptions::default()).await?;
		Ok(())
	}

	pub async fn get_workbook_info(&self) -> Result<WorkbookInfo> {
		from_json(
			self.call(Method::GetWorkbookInfo, Json::Null, None, CallOptions::default()).await?,
		)
	}

	/// Issue a raw request by method name.
	///
	/// This is the capability-probing escape hatch: unknown methods reject
	/// with a message containing `unknown method: <name>`, which maps to
	/// [`ErrorKind::UnknownMethod`].
	pub async fn invoke(
		&self,
		method: &str,
		params: Json,
		opts: CallOptions,
	) -> Result<Json> {
		let class = Method::parse(method).flush_class();
		self.call_raw(method.to_owned(), class, params, None, opts).await
	}
}
