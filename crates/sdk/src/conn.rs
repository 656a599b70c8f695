use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value as Json;

use gridbook_core::cnf::CONNECT_TIMEOUT_MS;
use gridbook_core::exe::CellUpdate;
use gridbook_core::rpc::method::{FlushClass, Method};
use gridbook_core::rpc::msg::{ClientPort, Init, PortIn, PortOut, Request, Response, WorkerMessage};
use gridbook_core::rpc::port;
use gridbook_core::rpc::worker::Worker;

use crate::err::{Error, ErrorKind};
use crate::opt::{CallOptions, EngineConfig};
use crate::{Engine, Result};

/// Commands flowing from engine handles into the router task.
pub(crate) enum Route {
	Call {
		id: u64,
		/// The wire method name, kept verbatim so unknown-method probes
		/// reach the dispatcher untouched.
		method: String,
		class: FlushClass,
		params: Json,
		bytes: Option<Bytes>,
		response: flume::Sender<Result<Json>>,
	},
	Enqueue {
		update: CellUpdate,
		response: flume::Sender<Result<Json>>,
	},
	Cancel {
		id: u64,
	},
	Terminate,
}

/// Connection state shared between engine handles and the router task.
#[derive(Debug)]
pub(crate) struct Router {
	pub(crate) route_tx: flume::Sender<Route>,
	pub(crate) last_id: AtomicU64,
	pub(crate) terminated: AtomicBool,
	pub(crate) worker: Worker,
}

impl Router {
	pub(crate) fn next_id(&self) -> u64 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub(crate) fn is_terminated(&self) -> bool {
		self.terminated.load(Ordering::SeqCst)
	}

	fn terminated_error(&self) -> Error {
		ErrorKind::Terminated.with_context("the engine has been terminated")
	}
}

/// Establish a connection to a spawned worker: create a port pair, post
/// `Init` with the worker-side end, and wait for `Ready` under the
/// caller's signal and time budget. Every failure path tears the
/// connection down completely.
pub async fn connect(worker: Worker, config: EngineConfig) -> Result<Engine> {
	// a signal that has already fired sends nothing at all
	if config.signal.as_ref().is_some_and(|s| s.is_cancelled()) {
		worker.terminate();
		return Err(ErrorKind::Aborted.with_context("connect cancelled before init"));
	}
	let (client_port, worker_port) = port::pair();
	let errors = worker.errors();
	let init = WorkerMessage::Init(Init {
		port: worker_port,
		module_url: config.module_url.clone(),
		binary_url: config.binary_url.clone(),
	});
	if worker.post(init).is_err() {
		cleanup(&client_port, &worker);
		return Err(ErrorKind::Terminated.with_context("the worker is gone"));
	}
	let timeout = config.timeout.unwrap_or(Duration::from_millis(*CONNECT_TIMEOUT_MS));
	if let Err(e) = wait_ready(&client_port, &errors, &config, timeout).await {
		cleanup(&client_port, &worker);
		return Err(e);
	}
	let (route_tx, route_rx) = flume::unbounded();
	let router = Arc::new(Router {
		route_tx,
		last_id: AtomicU64::new(0),
		terminated: AtomicBool::new(false),
		worker,
	});
	tokio::spawn(run_router(client_port, route_rx, errors, router.clone()));
	Ok(Engine {
		router,
	})
}

async fn wait_ready(
	port: &ClientPort,
	errors: &flume::Receiver<String>,
	config: &EngineConfig,
	timeout: Duration,
) -> Result<()> {
	let cancelled = async {
		match &config.signal {
			Some(signal) => signal.cancelled().await,
			None => futures::future::pending().await,
		}
	};
	tokio::select! {
		msg = port.recv() => match msg {
			Ok(PortOut::Ready) => Ok(()),
			Ok(other) => Err(ErrorKind::MessageError
				.with_context(format!("unexpected message before ready: {other:?}"))),
			Err(_) => Err(ErrorKind::WorkerError.with_context("connection closed before ready")),
		},
		event = errors.recv_async() => Err(ErrorKind::WorkerError
			.with_message(event.unwrap_or_else(|_| "worker error; worker stopped".to_owned()))),
		_ = tokio::time::sleep(timeout) => {
			Err(ErrorKind::TimedOut.with_context("no ready within the connect budget"))
		}
		_ = cancelled => Err(ErrorKind::Aborted.with_context("connect cancelled")),
	}
}

// Teardown on a failed handshake. None of these steps can fail in this
// runtime, but each is still performed independently of the others; the
// error listener is removed when the caller's receiver drops.
fn cleanup(port: &ClientPort, worker: &Worker) {
	port.close();
	worker.terminate();
}

impl Engine {
	/// Issue one request and await its response under the call options.
	pub(crate) async fn call(
		&self,
		method: Method,
		params: Json,
		bytes: Option<Bytes>,
		opts: CallOptions,
	) -> Result<Json> {
		self.call_raw(method.to_str().to_owned(), method.flush_class(), params, bytes, opts).await
	}

	/// Issue a request by raw method name; unknown names still travel
	/// verbatim so the dispatcher can answer its probe text.
	pub(crate) async fn call_raw(
		&self,
		method: String,
		class: FlushClass,
		params: Json,
		bytes: Option<Bytes>,
		opts: CallOptions,
	) -> Result<Json> {
		if self.router.is_terminated() {
			return Err(self.router.terminated_error());
		}
		// an aborted signal rejects synchronously; no message is sent
		if opts.signal.as_ref().is_some_and(|s| s.is_cancelled()) {
			return Err(
				ErrorKind::Aborted.with_context(format!("{method} call aborted before send"))
			);
		}
		let id = self.router.next_id();
		let (tx, rx) = flume::bounded(1);
		let route = Route::Call {
			id,
			method: method.clone(),
			class,
			params,
			bytes,
			response: tx,
		};
		if self.router.route_tx.send(route).is_err() {
			return Err(self.router.terminated_error());
		}
		let cancelled = async {
			match &opts.signal {
				Some(signal) => signal.cancelled().await,
				None => futures::future::pending().await,
			}
		};
		let timed_out = async {
			match opts.timeout {
				Some(timeout) => tokio::time::sleep(timeout).await,
				None => futures::future::pending().await,
			}
		};
		tokio::select! {
			res = rx.recv_async() => match res {
				Ok(res) => res,
				Err(_) => Err(self.router.terminated_error()),
			},
			_ = cancelled => {
				self.cancel(id);
				Err(ErrorKind::Aborted.with_context(format!("{method} request was aborted")))
			}
			_ = timed_out => {
				self.cancel(id);
				Err(ErrorKind::TimedOut
					.with_context(format!("{method} request did not respond in time")))
			}
		}
	}

	fn cancel(&self, id: u64) {
		if self.router.route_tx.send(Route::Cancel {
			id,
		})
		.is_err()
		{
			trace!("router gone; cancel for request {id} dropped");
		}
	}

	/// Buffer one scalar edit for the next micro-batch flush. The edit is
	/// enqueued eagerly; the returned receiver settles with the flush.
	pub(crate) fn enqueue_set_cell(
		&self,
		update: CellUpdate,
	) -> Option<flume::Receiver<Result<Json>>> {
		if self.router.is_terminated() {
			return None;
		}
		let (tx, rx) = flume::bounded(1);
		let route = Route::Enqueue {
			update,
			response: tx,
		};
		match self.router.route_tx.send(route) {
			Ok(()) => Some(rx),
			Err(_) => None,
		}
	}

	/// Tear the connection down: fail all pending calls, close the port,
	/// and terminate the worker. Each step proceeds regardless of the
	/// others. Subsequent calls fail immediately.
	pub fn terminate(&self) {
		self.router.terminated.store(true, Ordering::SeqCst);
		if self.router.route_tx.send(Route::Terminate).is_err() {
			trace!("router already stopped");
		}
		self.router.worker.terminate();
	}
}

/// Wire an engine handle straight onto an existing client port, skipping
/// the handshake. The returned sender injects worker error events.
#[cfg(test)]
pub(crate) fn attach_for_tests(port: ClientPort, worker: Worker) -> (Engine, flume::Sender<String>) {
	let (route_tx, route_rx) = flume::unbounded();
	let (error_tx, error_rx) = flume::unbounded();
	let router = Arc::new(Router {
		route_tx,
		last_id: AtomicU64::new(0),
		terminated: AtomicBool::new(false),
		worker,
	});
	tokio::spawn(run_router(port, route_rx, error_rx, router.clone()));
	(
		Engine {
			router,
		},
		error_tx,
	)
}

struct RouterState {
	port: ClientPort,
	router: Arc<Router>,
	/// Calls awaiting a response, keyed by request id.
	pending: HashMap<u64, flume::Sender<Result<Json>>>,
	/// Buffered scalar edits and the callers awaiting their flush.
	batch: Vec<CellUpdate>,
	batch_waiters: Vec<flume::Sender<Result<Json>>>,
	flush_scheduled: bool,
	flush_in_flight: Option<u64>,
	flush_waiters: HashMap<u64, Vec<flume::Sender<Result<Json>>>>,
	/// Flushing-class calls parked until the batch ahead of them lands.
	deferred: VecDeque<(u64, String, Json, Option<Bytes>, flume::Sender<Result<Json>>)>,
}

enum Flow {
	Continue,
	Stop,
}

async fn run_router(
	port: ClientPort,
	route_rx: flume::Receiver<Route>,
	errors: flume::Receiver<String>,
	router: Arc<Router>,
) {
	let mut st = RouterState {
		port,
		router,
		pending: HashMap::new(),
		batch: Vec::new(),
		batch_waiters: Vec::new(),
		flush_scheduled: false,
		flush_in_flight: None,
		flush_waiters: HashMap::new(),
		deferred: VecDeque::new(),
	};
	loop {
		// drain every route already queued, then emit any armed flush, so
		// back-to-back edits coalesce into one request
		loop {
			match route_rx.try_recv() {
				Ok(route) => {
					if let Flow::Stop = handle_route(&mut st, route).await {
						let error = st.router.terminated_error();
						finish(&mut st, error);
						return;
					}
				}
				Err(flume::TryRecvError::Empty) => break,
				Err(flume::TryRecvError::Disconnected) => {
					let error = st.router.terminated_error();
					finish(&mut st, error);
					return;
				}
			}
		}
		maybe_flush(&mut st).await;
		let port = st.port.clone();
		tokio::select! {
			route = route_rx.recv_async() => match route {
				Ok(route) => {
					if let Flow::Stop = handle_route(&mut st, route).await {
						let error = st.router.terminated_error();
						finish(&mut st, error);
						return;
					}
				}
				// every engine handle dropped
				Err(_) => {
					let error = st.router.terminated_error();
					finish(&mut st, error);
					return;
				}
			},
			msg = port.recv() => match msg {
				Ok(PortOut::Response(response)) => on_response(&mut st, response).await,
				Ok(PortOut::Ready) => trace!("ignoring ready after handshake"),
				Err(_) => {
					let error = if st.router.is_terminated() {
						st.router.terminated_error()
					} else {
						ErrorKind::WorkerError.with_context("connection closed")
					};
					finish(&mut st, error);
					return;
				}
			},
			event = errors.recv_async() => {
				let error = match event {
					Ok(message) => ErrorKind::WorkerError.with_message(message),
					Err(_) if st.router.is_terminated() => st.router.terminated_error(),
					Err(_) => ErrorKind::WorkerError.with_context("worker stopped"),
				};
				finish(&mut st, error);
				return;
			}
		}
	}
}

async fn handle_route(st: &mut RouterState, route: Route) -> Flow {
	match route {
		Route::Call {
			id,
			method,
			class,
			params,
			bytes,
			response,
		} => {
			match class {
				// queries go straight out; they never force a flush
				FlushClass::NonFlushing => {
					send_request(st, id, method, params, bytes, response).await;
				}
				FlushClass::Flushing | FlushClass::Batching => {
					if st.flush_in_flight.is_some()
						|| !st.batch.is_empty()
						|| !st.deferred.is_empty()
					{
						st.deferred.push_back((id, method, params, bytes, response));
					} else {
						send_request(st, id, method, params, bytes, response).await;
					}
				}
			}
			Flow::Continue
		}
		Route::Enqueue {
			update,
			response,
		} => {
			st.batch.push(update);
			st.batch_waiters.push(response);
			if !st.flush_scheduled && st.flush_in_flight.is_none() {
				st.flush_scheduled = true;
			}
			Flow::Continue
		}
		Route::Cancel {
			id,
		} => {
			// a call still parked locally produces no wire traffic
			if let Some(at) = st.deferred.iter().position(|(did, ..)| *did == id) {
				st.deferred.remove(at);
			} else if st.pending.remove(&id).is_some() {
				if st.port.send(PortIn::Cancel {
					id,
				})
				.await
				.is_err()
				{
					trace!("cancel for request {id} dropped; connection closed");
				}
			}
			Flow::Continue
		}
		Route::Terminate => Flow::Stop,
	}
}

async fn send_request(
	st: &mut RouterState,
	id: u64,
	method: String,
	params: Json,
	bytes: Option<Bytes>,
	response: flume::Sender<Result<Json>>,
) {
	let request = Request {
		id,
		method,
		params,
		bytes,
	};
	match st.port.send(PortIn::Request(request)).await {
		Ok(()) => {
			st.pending.insert(id, response);
		}
		Err(_) => {
			if response
				.send(Err(ErrorKind::WorkerError.with_context("failed to post request")))
				.is_err()
			{
				trace!("receiver dropped");
			}
		}
	}
}

/// Emit the armed flush, then release parked flushing calls once nothing
/// is ahead of them. The wire therefore always shows the batch's
/// `setCells` strictly before any request that depends on it.
async fn maybe_flush(st: &mut RouterState) {
	if st.flush_scheduled && st.flush_in_flight.is_none() && !st.batch.is_empty() {
		let updates = std::mem::take(&mut st.batch);
		let waiters = std::mem::take(&mut st.batch_waiters);
		st.flush_scheduled = false;
		let id = st.router.next_id();
		let params = serde_json::json!({ "updates": updates });
		let request = Request {
			id,
			method: Method::SetCells.to_str().to_owned(),
			params,
			bytes: None,
		};
		match st.port.send(PortIn::Request(request)).await {
			Ok(()) => {
				st.flush_in_flight = Some(id);
				st.flush_waiters.insert(id, waiters);
			}
			Err(_) => {
				let error = ErrorKind::WorkerError.with_context("failed to post edit flush");
				for waiter in waiters {
					if waiter.send(Err(error.clone())).is_err() {
						trace!("receiver dropped");
					}
				}
			}
		}
	}
	while st.flush_in_flight.is_none() && st.batch.is_empty() {
		match st.deferred.pop_front() {
			Some((id, method, params, bytes, response)) => {
				send_request(st, id, method, params, bytes, response).await;
			}
			None => break,
		}
	}
}

async fn on_response(st: &mut RouterState, response: Response) {
	let Response {
		id,
		result,
	} = response;
	let result = result.map_err(Error::from_response);
	if st.flush_in_flight == Some(id) {
		st.flush_in_flight = None;
		if let Some(waiters) = st.flush_waiters.remove(&id) {
			for waiter in waiters {
				// unawaited edits swallow their flush failure here
				if waiter.send(result.clone()).is_err() {
					trace!("receiver dropped");
				}
			}
		}
	} else if let Some(sender) = st.pending.remove(&id) {
		if sender.send(result).is_err() {
			trace!("receiver dropped");
		}
	} else {
		// already aborted or timed out; the caller's promise has settled
		trace!("ignoring response for request {id}");
	}
	// edits which arrived during the flight flush next
	if st.flush_in_flight.is_none() && !st.batch.is_empty() {
		st.flush_scheduled = true;
	}
	maybe_flush(st).await;
}

fn finish(st: &mut RouterState, error: Error) {
	for (_, sender) in st.pending.drain() {
		if sender.send(Err(error.clone())).is_err() {
			trace!("receiver dropped");
		}
	}
	for waiter in st.batch_waiters.drain(..) {
		if waiter.send(Err(error.clone())).is_err() {
			trace!("receiver dropped");
		}
	}
	for (_, waiters) in st.flush_waiters.drain() {
		for waiter in waiters {
			if waiter.send(Err(error.clone())).is_err() {
				trace!("receiver dropped");
			}
		}
	}
	for (.., response) in st.deferred.drain(..) {
		if response.send(Err(error.clone())).is_err() {
			trace!("receiver dropped");
		}
	}
	st.port.close();
}
