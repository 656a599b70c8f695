use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

/// Categories of errors returned by the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
	/// The caller cancelled the request through its abort signal
	Aborted,
	/// No response arrived within the caller's time budget
	TimedOut,
	/// The engine handle has been torn down
	Terminated,
	/// The worker reported a fatal error
	WorkerError,
	/// The port received a message that could not be decoded
	MessageError,
	/// The worker does not recognize the requested method
	UnknownMethod,
	/// The method exists but the loaded kernel build does not export it
	NotAvailable,
	/// Parameters failed validation before or after the wire
	Validation,
	/// Any other failure reported by the compute kernel
	Kernel,
	/// Deserialization error
	Deserialization,
}

impl ErrorKind {
	/// Sets a message on an error kind
	pub fn with_message(self, message: impl Into<String>) -> Error {
		Error {
			kind: self,
			message: message.into(),
		}
	}

	/// Constructs an error from an error kind and context
	pub fn with_context(self, context: impl fmt::Display) -> Error {
		let message = match self {
			ErrorKind::Aborted => format!("request aborted; {context}"),
			ErrorKind::TimedOut => format!("request timed out; {context}"),
			ErrorKind::Terminated => format!("engine terminated; {context}"),
			ErrorKind::WorkerError => format!("worker error; {context}"),
			ErrorKind::MessageError => format!("messageerror on connection port; {context}"),
			_ => context.to_string(),
		};
		Error {
			kind: self,
			message,
		}
	}
}

/// Error type returned by the client
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Error {
	kind: ErrorKind,
	message: String,
}

impl Error {
	/// Returns the kind of an error
	pub const fn kind(&self) -> ErrorKind {
		self.kind
	}

	/// Classify an `ok: false` response by its message text, so callers
	/// can probe for capabilities without string-matching themselves.
	pub(crate) fn from_response(message: String) -> Error {
		let kind = if message.starts_with("unknown method:") {
			ErrorKind::UnknownMethod
		} else if message.contains("is not available") || message.contains("does not export") {
			ErrorKind::NotAvailable
		} else if message.contains("Invalid params") || message.contains("Invalid value for") {
			ErrorKind::Validation
		} else {
			ErrorKind::Kernel
		};
		Error {
			kind,
			message,
		}
	}
}

impl error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl From<serde_json::Error> for Error {
	fn from(error: serde_json::Error) -> Self {
		ErrorKind::Deserialization.with_context(error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn messages_match_the_documented_patterns() {
		assert!(ErrorKind::Aborted.with_context("signal fired").to_string().contains("aborted"));
		assert!(ErrorKind::TimedOut.with_context("50ms").to_string().contains("timed out"));
		assert!(ErrorKind::Terminated.with_context("drop").to_string().contains("terminated"));
		assert!(ErrorKind::WorkerError.with_context("boom").to_string().contains("worker error"));
		assert!(ErrorKind::MessageError
			.with_context("bad frame")
			.to_string()
			.contains("messageerror"));
	}

	#[test]
	fn responses_classify_by_probe_text() {
		assert_eq!(
			Error::from_response("unknown method: shuffle".to_owned()).kind(),
			ErrorKind::UnknownMethod
		);
		assert_eq!(
			Error::from_response(
				"goalSeek: the loaded kernel does not export goalSeek, so it is not available in this build"
					.to_owned()
			)
			.kind(),
			ErrorKind::NotAvailable
		);
		assert_eq!(
			Error::from_response("Error: division by zero".to_owned()).kind(),
			ErrorKind::Kernel
		);
	}
}
