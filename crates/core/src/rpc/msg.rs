use bytes::Bytes;
use serde_json::Value as Json;

use crate::rpc::port::Port;

/// Messages posted by the client on its end of a connection port.
pub type ClientPort = Port<PortIn, PortOut>;

/// The worker-side end of a connection port, carried by [`Init`].
pub type WorkerPort = Port<PortOut, PortIn>;

/// Messages inbound to the worker on its owning channel.
///
/// `Init` is sent exactly once per connection and carries the worker-side
/// end of a freshly created port; every later exchange happens on that
/// port.
#[derive(Debug)]
pub enum WorkerMessage {
	Init(Init),
}

#[derive(Debug)]
pub struct Init {
	pub port: WorkerPort,
	pub module_url: String,
	pub binary_url: Option<String>,
}

/// Port traffic inbound to the worker.
#[derive(Clone, Debug)]
pub enum PortIn {
	Request(Request),
	Cancel {
		id: u64,
	},
}

/// One request envelope. Params are opaque to the protocol; large byte
/// payloads ride alongside as the per-message transfer list.
#[derive(Clone, Debug)]
pub struct Request {
	pub id: u64,
	pub method: String,
	pub params: Json,
	pub bytes: Option<Bytes>,
}

/// Port traffic outbound from the worker.
#[derive(Clone, Debug)]
pub enum PortOut {
	/// Emitted once after the kernel is initialized.
	Ready,
	Response(Response),
}

/// One response envelope; the error side is a human-readable string.
#[derive(Clone, Debug)]
pub struct Response {
	pub id: u64,
	pub result: Result<Json, String>,
}
