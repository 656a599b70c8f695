use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::err::Error;
use crate::exe::KernelLoader;
use crate::rpc::context::{RpcContext, WorkerContext};
use crate::rpc::msg::{Init, PortIn, PortOut, Request, Response, WorkerMessage, WorkerPort};

/// A handle to a spawned compute worker.
///
/// The worker is a long-lived task consuming its mailbox; a connection is
/// established by posting [`WorkerMessage::Init`] with one end of a fresh
/// port pair. Fatal failures (a kernel that cannot load) surface on the
/// error channel, the equivalent of a worker `error` event.
#[derive(Debug)]
pub struct Worker {
	mailbox: flume::Sender<WorkerMessage>,
	errors: flume::Receiver<String>,
	handle: AbortHandle,
}

impl Worker {
	/// Spawn a worker which loads kernels through the given loader.
	pub fn spawn(loader: Arc<dyn KernelLoader>) -> Worker {
		let (mailbox_tx, mailbox_rx) = flume::unbounded();
		let (errors_tx, errors_rx) = flume::unbounded();
		let task = tokio::spawn(run(mailbox_rx, loader, errors_tx));
		Worker {
			mailbox: mailbox_tx,
			errors: errors_rx,
			handle: task.abort_handle(),
		}
	}

	/// Post a message to the worker's owning channel.
	pub fn post(&self, msg: WorkerMessage) -> Result<(), Error> {
		self.mailbox.send(msg).map_err(|_| Error::ChannelClosed)
	}

	/// A listener on the worker's fatal error events.
	pub fn errors(&self) -> flume::Receiver<String> {
		self.errors.clone()
	}

	/// Stop the worker immediately, abandoning any in-flight work.
	pub fn terminate(&self) {
		self.handle.abort();
	}

	pub fn is_terminated(&self) -> bool {
		self.handle.is_finished()
	}
}

/// Dispatch state shared with in-flight handler tasks.
struct DispatchState {
	/// Incremented on every init; responses produced under a stale
	/// generation are dropped at emit time.
	generation: AtomicU64,
	/// Request ids marked cancelled while in flight.
	cancelled: Mutex<HashSet<u64>>,
	/// Abort handles for in-flight handlers, for cooperative interruption.
	inflight: Mutex<HashMap<u64, AbortHandle>>,
}

async fn run(
	mailbox: flume::Receiver<WorkerMessage>,
	loader: Arc<dyn KernelLoader>,
	errors: flume::Sender<String>,
) {
	let state = Arc::new(DispatchState {
		generation: AtomicU64::new(0),
		cancelled: Mutex::new(HashSet::new()),
		inflight: Mutex::new(HashMap::new()),
	});
	let mut active: Option<(WorkerPort, Arc<WorkerContext>)> = None;

	loop {
		let current = active.as_ref().map(|(port, ctx)| (port.clone(), ctx.clone()));
		match current {
			Some((port, ctx)) => {
				tokio::select! {
					msg = mailbox.recv_async() => match msg {
						Ok(WorkerMessage::Init(init)) => {
							active = handle_init(init, &state, &loader, &errors, active.take()).await;
						}
						// the handle was dropped; shut down
						Err(_) => break,
					},
					msg = port.recv() => match msg {
						Ok(PortIn::Request(req)) => dispatch(req, &port, &ctx, &state),
						Ok(PortIn::Cancel { id }) => cancel(id, &state),
						Err(_) => {
							trace!("connection port closed");
							active = None;
						}
					},
				}
			}
			None => match mailbox.recv_async().await {
				Ok(WorkerMessage::Init(init)) => {
					active = handle_init(init, &state, &loader, &errors, None).await;
				}
				Err(_) => break,
			},
		}
	}
}

async fn handle_init(
	init: Init,
	state: &Arc<DispatchState>,
	loader: &Arc<dyn KernelLoader>,
	errors: &flume::Sender<String>,
	previous: Option<(WorkerPort, Arc<WorkerContext>)>,
) -> Option<(WorkerPort, Arc<WorkerContext>)> {
	// bump the generation first so responses in flight under the old
	// connection can no longer be posted
	state.generation.fetch_add(1, Ordering::SeqCst);
	if let Some((old_port, _)) = previous {
		old_port.close();
	}
	for (_, handle) in state.inflight.lock().drain() {
		handle.abort();
	}
	state.cancelled.lock().clear();

	let kernel = match loader.load(&init.module_url, init.binary_url.as_deref()) {
		Ok(kernel) => kernel,
		Err(e) => {
			warn!("kernel failed to load: {e}");
			let _ = errors.send(format!("worker error: {e}"));
			init.port.close();
			return None;
		}
	};
	let ctx = Arc::new(WorkerContext::new(kernel));
	if init.port.send(PortOut::Ready).await.is_err() {
		trace!("connection closed before ready");
		return None;
	}
	Some((init.port, ctx))
}

fn dispatch(req: Request, port: &WorkerPort, ctx: &Arc<WorkerContext>, state: &Arc<DispatchState>) {
	let generation = state.generation.load(Ordering::SeqCst);
	let port = port.clone();
	let ctx = ctx.clone();
	let task_state = state.clone();
	let id = req.id;
	// the handler starts once its abort handle is registered
	let (registered_tx, registered_rx) = tokio::sync::oneshot::channel::<()>();
	let task = tokio::spawn(async move {
		let _ = registered_rx.await;
		let result = ctx.execute(&req.method, req.params, req.bytes).await;
		task_state.inflight.lock().remove(&id);
		// a response may still be produced after a cancel; the client
		// drops it, so only the bookkeeping entry is reclaimed here
		let _ = task_state.cancelled.lock().remove(&id);
		if task_state.generation.load(Ordering::SeqCst) != generation {
			trace!("dropping response for request {id} from a stale generation");
			return;
		}
		let response = PortOut::Response(Response {
			id,
			result: result.map_err(|e| e.to_string()),
		});
		if let Err(e) = port.send(response).await {
			// retry once with an error response carrying the failure text
			warn!("failed to post response for request {id}; {e}");
			let retry = PortOut::Response(Response {
				id,
				result: Err(e.to_string()),
			});
			if port.send(retry).await.is_err() {
				trace!("response for request {id} dropped");
			}
		}
	});
	state.inflight.lock().insert(id, task.abort_handle());
	let _ = registered_tx.send(());
}

fn cancel(id: u64, state: &Arc<DispatchState>) {
	state.cancelled.lock().insert(id);
	// attempt cooperative interruption of the in-flight handler
	if let Some(handle) = state.inflight.lock().remove(&id) {
		handle.abort();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::exe::GridKernelLoader;
	use crate::rpc::msg::ClientPort;
	use crate::rpc::port;
	use serde_json::{json, Value as Json};

	async fn connect(worker: &Worker) -> ClientPort {
		let (client, server) = port::pair();
		worker
			.post(WorkerMessage::Init(Init {
				port: server,
				module_url: "kernel.wasm".to_owned(),
				binary_url: None,
			}))
			.unwrap();
		match client.recv().await.unwrap() {
			PortOut::Ready => client,
			other => panic!("expected ready, got {other:?}"),
		}
	}

	async fn call(client: &ClientPort, id: u64, method: &str, params: Json) -> Response {
		client
			.send(PortIn::Request(Request {
				id,
				method: method.to_owned(),
				params,
				bytes: None,
			}))
			.await
			.unwrap();
		match client.recv().await.unwrap() {
			PortOut::Response(res) => res,
			other => panic!("expected response, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn handshake_and_ping() {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		let client = connect(&worker).await;
		let res = call(&client, 1, "ping", Json::Null).await;
		assert_eq!(res.id, 1);
		assert_eq!(res.result.unwrap(), json!("pong"));
		worker.terminate();
	}

	#[tokio::test]
	async fn unknown_method_answers_with_probe_text() {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		let client = connect(&worker).await;
		let res = call(&client, 1, "mystery", Json::Null).await;
		let err = res.result.unwrap_err();
		assert!(err.contains("unknown method: mystery"));
		worker.terminate();
	}

	#[tokio::test]
	async fn reinit_closes_the_previous_port() {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		let first = connect(&worker).await;
		let res = call(&first, 1, "ping", Json::Null).await;
		assert!(res.result.is_ok());
		// a second init replaces the connection
		let second = connect(&worker).await;
		assert!(first.recv().await.is_err());
		let res = call(&second, 1, "ping", Json::Null).await;
		assert!(res.result.is_ok());
		worker.terminate();
	}

	#[tokio::test]
	async fn state_survives_within_a_generation() {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		let client = connect(&worker).await;
		let res =
			call(&client, 1, "setCell", json!({"address": "A1", "value": 7.0})).await;
		assert!(res.result.is_ok());
		let res = call(&client, 2, "getCell", json!({"address": "A1"})).await;
		assert_eq!(res.result.unwrap()["value"], json!(7.0));
		worker.terminate();
	}

	#[tokio::test]
	async fn failed_kernel_load_emits_worker_error() {
		let worker = Worker::spawn(Arc::new(GridKernelLoader));
		let errors = worker.errors();
		let (client, server) = port::pair();
		worker
			.post(WorkerMessage::Init(Init {
				port: server,
				module_url: "".to_owned(),
				binary_url: None,
			}))
			.unwrap();
		let event = errors.recv_async().await.unwrap();
		assert!(event.contains("worker error"));
		assert!(client.recv().await.is_err());
		worker.terminate();
	}
}
