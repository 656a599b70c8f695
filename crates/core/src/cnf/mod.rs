use once_cell::sync::Lazy;

/// The name of the sheet a fresh workbook starts with.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// The highest addressable column, inclusive. Column names are base-26
/// with 'A' = 1, so this is column "XFD".
pub const MAX_COLUMN: u32 = 16_384;

/// The style id which clears any previously assigned style.
pub const CLEAR_STYLE_ID: u32 = 0;

/// How many bytes of snapshot data go into a single replicated chunk.
///
/// Each chunk batch is committed in its own transaction so that no single
/// replicated update exceeds the wire-size limit of the sync layer.
pub static SNAPSHOT_CHUNK_SIZE: Lazy<usize> =
	lazy_env_parse!("GRIDBOOK_SNAPSHOT_CHUNK_SIZE", usize, 64 * 1024);

/// The byte budget for one streaming-store transaction. The number of
/// chunks appended per transaction is derived from this and the chunk size.
pub static SNAPSHOT_TRANSACTION_BYTES: Lazy<usize> =
	lazy_env_parse!("GRIDBOOK_SNAPSHOT_TRANSACTION_BYTES", usize, 256 * 1024);

/// How old an incomplete version record must be, in milliseconds, before
/// the default prune pass removes it.
pub static PRUNE_INCOMPLETE_AFTER_MS: Lazy<i64> =
	lazy_env_parse!("GRIDBOOK_PRUNE_INCOMPLETE_AFTER_MS", i64, 10 * 60 * 1000);

/// How long a connection handshake may take before it fails, in
/// milliseconds, unless the caller supplies an explicit timeout.
pub static CONNECT_TIMEOUT_MS: Lazy<u64> =
	lazy_env_parse!("GRIDBOOK_CONNECT_TIMEOUT_MS", u64, 15_000);

/// Specifies how many in-flight messages can be buffered on one end of a
/// connection port before senders yield.
pub static PORT_CHANNEL_CAPACITY: Lazy<usize> =
	lazy_env_parse!("GRIDBOOK_PORT_CHANNEL_CAPACITY", usize, 64);
