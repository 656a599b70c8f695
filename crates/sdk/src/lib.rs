//! The Gridbook client.
//!
//! An [`Engine`] is a typed handle onto a compute worker hosting the
//! formula kernel. Calls travel over an in-memory connection port as
//! tagged request envelopes; scalar cell edits micro-batch into single
//! `setCells` requests, and methods that depend on prior edits force the
//! batch onto the wire ahead of themselves.
//!
//! ```no_run
//! use gridbook::{Engine, EngineConfig};
//!
//! # async fn example() -> gridbook::Result<()> {
//! let engine = Engine::start(EngineConfig::new("kernel.wasm")).await?;
//! let _ = engine.set_cell("A1", 40, None);
//! let _ = engine.set_cell("A2", 2, None);
//! engine.recalculate(None).await?;
//! let cell = engine.get_cell("A1", None).await?;
//! assert_eq!(cell.value, serde_json::json!(40.0));
//! engine.terminate();
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate tracing;

mod conn;
mod err;
pub mod method;
mod opt;

use std::sync::Arc;

pub use conn::connect;
pub use err::{Error, ErrorKind};
pub use opt::{CallOptions, CursorOrOptions, EngineConfig};

pub use gridbook_core::exe::{
	CellDelta, CellSnapshot, CellUpdate, GridKernelLoader, Kernel, KernelLoader,
};
pub use gridbook_core::rpc::args::GoalSeekParams;
pub use gridbook_core::rpc::transfer::ByteView;
pub use gridbook_core::rpc::worker::Worker;
pub use gridbook_core::wbk::ops::EditOp;
pub use gridbook_core::wbk::style::FormatRun;
pub use gridbook_core::wbk::WorkbookInfo;

/// The result type returned by all client calls.
pub type Result<T> = std::result::Result<T, Error>;

/// A connected engine handle. Clones share one connection.
#[derive(Clone, Debug)]
pub struct Engine {
	pub(crate) router: Arc<conn::Router>,
}

impl Engine {
	/// Spawn a worker hosting the built-in kernel and connect to it.
	pub async fn start(config: EngineConfig) -> Result<Engine> {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		connect(worker, config).await
	}
}
