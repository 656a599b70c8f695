use thiserror::Error;

use crate::err;
use crate::exe::KernelError;

/// Failures surfaced over the wire as `ok: false` responses.
///
/// The rendered messages are part of the protocol: callers probe
/// `unknown method: <name>` to detect feature unavailability, and the
/// missing-capability text names the entrypoint so callers can degrade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
	#[error("unknown method: {0}")]
	MethodNotFound(String),

	#[error("{method}: the loaded kernel does not export {method}, so it is not available in this build")]
	MethodNotAvailable {
		method: String,
	},

	#[error("Invalid params: {0}")]
	InvalidParams(String),

	#[error("There was a problem with the workbook: {0}")]
	InternalError(err::Error),

	#[error("Error: {0}")]
	Thrown(String),
}

impl From<err::Error> for RpcError {
	fn from(e: err::Error) -> Self {
		RpcError::InternalError(e)
	}
}

impl From<KernelError> for RpcError {
	fn from(e: KernelError) -> Self {
		match e {
			KernelError::NotAvailable(method) => RpcError::MethodNotAvailable {
				method,
			},
			KernelError::Workbook(e) => RpcError::InternalError(e),
			KernelError::NoBulkEntrypoint => {
				RpcError::Thrown("bulk cell updates are not supported".to_owned())
			}
			KernelError::Thrown(msg) => RpcError::Thrown(msg),
		}
	}
}

impl From<&str> for RpcError {
	fn from(e: &str) -> Self {
		RpcError::Thrown(e.to_owned())
	}
}
