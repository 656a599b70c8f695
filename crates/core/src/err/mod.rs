use thiserror::Error;

/// The error type for the core engine crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The supplied cell address could not be parsed as A1 notation
	#[error("Invalid cell address: {0}")]
	InvalidAddress(String),

	/// The supplied range could not be parsed as A1 notation
	#[error("Invalid range: {0}")]
	InvalidRange(String),

	/// The named sheet does not exist in the workbook
	#[error("Sheet not found: {0}")]
	SheetNotFound(String),

	/// A parameter failed validation; the message names the offending field
	#[error("Invalid value for {field}: {message}")]
	InvalidField {
		field: String,
		message: String,
	},

	/// There was a problem with the version store
	#[error("There was a problem with the version store: {0}")]
	Store(String),

	/// The requested version record does not exist
	#[error("Version not found: {0}")]
	VersionNotFound(String),

	/// A version record is present but its metadata is corrupt
	#[error("Version record is corrupt: {0}")]
	CorruptVersion(String),

	/// A value could not be encoded or decoded
	#[error("Encoding error: {0}")]
	Encoding(String),

	/// The replicated-document transaction was already finished
	#[error("Transaction was already committed or cancelled")]
	TxFinished,

	/// A replicated root exists with an incompatible type
	#[error("Root `{0}` exists with an incompatible type")]
	RootTypeMismatch(String),

	/// The message channel to the other side is closed
	#[error("Channel closed")]
	ChannelClosed,

	/// Represents an underlying IO error
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	/// Represents a serialization or deserialization error
	#[error("Serialization error: {0}")]
	Serialization(String),

	/// A generic error message
	#[error("{0}")]
	Thrown(String),
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Serialization(e.to_string())
	}
}

impl From<&str> for Error {
	fn from(e: &str) -> Self {
		Error::Thrown(e.to_owned())
	}
}
