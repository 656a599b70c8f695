mod server;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use gridbook_core::exe::GridKernelLoader;
use gridbook_core::rpc::port;
use gridbook_core::rpc::worker::Worker;

use crate::err::ErrorKind;
use crate::opt::CallOptions;
use crate::Engine;
use server::{mock, Reply, TraceEntry};

fn mock_engine(
	reply: Reply,
) -> (Engine, flume::Receiver<TraceEntry>, flume::Sender<String>) {
	let (client, server) = port::pair();
	let trace = mock(server, reply);
	let worker = Worker::spawn(Arc::new(GridKernelLoader));
	let (engine, errors) = crate::conn::attach_for_tests(client, worker);
	(engine, trace, errors)
}

fn request_methods(trace: &flume::Receiver<TraceEntry>) -> Vec<String> {
	trace.try_iter().filter(|e| e.kind == "request").map(|e| e.method).collect()
}

#[tokio::test]
async fn back_to_back_edits_coalesce_into_one_request() {
	let (engine, trace, _errors) = mock_engine(Reply::Respond);
	let first = engine.set_cell("A1", 1, None);
	let second = engine.set_cell("A2", 2, None);
	let (first, second) = futures::join!(
		std::future::IntoFuture::into_future(first),
		std::future::IntoFuture::into_future(second),
	);
	first.unwrap();
	second.unwrap();

	let requests: Vec<TraceEntry> =
		trace.try_iter().filter(|e| e.kind == "request").collect();
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].method, "setCells");
	assert_eq!(
		requests[0].params["updates"],
		json!([
			{"address": "A1", "value": 1},
			{"address": "A2", "value": 2},
		])
	);
	engine.terminate();
}

#[tokio::test]
async fn pending_edits_flush_before_a_dependent_call() {
	let (engine, trace, _errors) = mock_engine(Reply::Respond);
	drop(engine.set_cell("A1", 1, None));
	engine.load_from_xlsx_bytes(vec![0u8, 1, 2, 3]).await.unwrap();

	let methods = request_methods(&trace);
	assert_eq!(methods, vec!["setCells", "loadFromXlsxBytes"]);
	engine.terminate();
}

#[tokio::test]
async fn queries_are_not_held_behind_the_batch() {
	let (engine, trace, _errors) = mock_engine(Reply::Respond);
	drop(engine.set_cell("A1", 1, None));
	engine.lex_formula("=1+2", None).await.unwrap();
	// a second round trip guarantees the flush has been observed
	engine.ping().await.unwrap();

	let methods = request_methods(&trace);
	assert_eq!(methods, vec!["lexFormula", "setCells", "ping"]);
	engine.terminate();
}

#[tokio::test]
async fn edits_during_a_flight_flush_again_in_caller_order() {
	let (engine, trace, _errors) = mock_engine(Reply::Respond);
	drop(engine.set_cell("A1", 1, None));
	let first = engine.set_cell("A2", 2, None);
	std::future::IntoFuture::into_future(first).await.unwrap();
	// edits buffered while the first flush was in flight follow in a
	// second setCells, preserving caller order overall
	drop(engine.set_cell("A3", 3, None));
	engine.ping().await.unwrap();

	let requests: Vec<TraceEntry> =
		trace.try_iter().filter(|e| e.kind == "request").collect();
	let flushes: Vec<&TraceEntry> =
		requests.iter().filter(|e| e.method == "setCells").collect();
	let mut seen = Vec::new();
	for flush in &flushes {
		for update in flush.params["updates"].as_array().unwrap() {
			seen.push(update["address"].as_str().unwrap().to_owned());
		}
	}
	assert_eq!(seen, vec!["A1", "A2", "A3"]);
	engine.terminate();
}

#[tokio::test]
async fn aborting_an_inflight_call_sends_exactly_one_cancel() {
	let (engine, trace, _errors) = mock_engine(Reply::Silent);
	let signal = CancellationToken::new();
	let opts = CallOptions::new().with_signal(signal.clone());
	let call = tokio::spawn({
		let engine = engine.clone();
		async move { engine.get_cell_with("A1", None, opts).await }
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	signal.cancel();
	let err = call.await.unwrap().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Aborted);
	assert!(err.to_string().to_lowercase().contains("aborted"));

	tokio::time::sleep(Duration::from_millis(10)).await;
	let entries: Vec<TraceEntry> = trace.try_iter().collect();
	assert_eq!(entries.iter().filter(|e| e.kind == "request").count(), 1);
	assert_eq!(entries.iter().filter(|e| e.kind == "cancel").count(), 1);
	engine.terminate();
}

#[tokio::test]
async fn an_unanswered_call_times_out_and_cancels() {
	let (engine, trace, _errors) = mock_engine(Reply::Silent);
	let opts = CallOptions::new().with_timeout(Duration::from_millis(50));
	let err = engine.get_cell_with("A1", None, opts).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TimedOut);
	assert!(err.to_string().to_lowercase().contains("timed out"));

	tokio::time::sleep(Duration::from_millis(10)).await;
	let entries: Vec<TraceEntry> = trace.try_iter().collect();
	assert_eq!(entries.iter().filter(|e| e.kind == "cancel").count(), 1);
	engine.terminate();
}

#[tokio::test]
async fn an_already_fired_signal_sends_nothing() {
	let (engine, trace, _errors) = mock_engine(Reply::Silent);
	let signal = CancellationToken::new();
	signal.cancel();
	let opts = CallOptions::new().with_signal(signal);
	let err = engine.get_cell_with("A1", None, opts).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Aborted);

	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(trace.try_iter().next().is_none());
	engine.terminate();
}

#[tokio::test]
async fn terminate_rejects_pending_and_fences_new_calls() {
	let (engine, trace, _errors) = mock_engine(Reply::Silent);
	let pending = tokio::spawn({
		let engine = engine.clone();
		async move { engine.get_cell("A1", None).await }
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	engine.terminate();
	let err = pending.await.unwrap().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Terminated);
	assert!(err.to_string().to_lowercase().contains("terminated"));

	let err = engine.ping().await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Terminated);

	tokio::time::sleep(Duration::from_millis(10)).await;
	// only the original request reached the wire
	assert_eq!(request_methods(&trace), vec!["getCell"]);
}

#[tokio::test]
async fn a_worker_error_rejects_pending_calls() {
	let (engine, _trace, errors) = mock_engine(Reply::Silent);
	let pending = tokio::spawn({
		let engine = engine.clone();
		async move { engine.get_cell("A1", None).await }
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	errors.send("worker error; kernel crashed".to_owned()).unwrap();
	let err = pending.await.unwrap().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::WorkerError);
	assert!(err.to_string().contains("worker error"));
	engine.terminate();
}

#[tokio::test]
async fn unknown_methods_classify_from_the_probe_text() {
	let (engine, _trace, _errors) = mock_engine(Reply::Respond);
	let err = engine
		.invoke("mystery", serde_json::Value::Null, CallOptions::default())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::UnknownMethod);
	assert!(err.to_string().contains("unknown method: mystery"));
	engine.terminate();
}

#[tokio::test]
async fn malformed_parse_options_reject_before_the_wire() {
	let (engine, trace, _errors) = mock_engine(Reply::Respond);
	let err = engine
		.lex_formula("=1", Some(json!({"localeID": "en-US"})))
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Validation);
	assert!(err
		.to_string()
		.starts_with("options must be { localeId?: string, referenceStyle?:"));

	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(trace.try_iter().next().is_none());
	engine.terminate();
}
