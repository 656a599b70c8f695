use serde_json::{json, Value as Json};

use gridbook_core::rpc::msg::{PortIn, PortOut, Response, WorkerPort};

/// How the mock worker treats incoming requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Reply {
	/// Answer every request with a canned success.
	Respond,
	/// Swallow requests, so cancellation and timeout paths stay pending.
	Silent,
}

/// One observed wire message.
#[derive(Clone, Debug)]
pub(super) struct TraceEntry {
	pub kind: &'static str,
	pub id: u64,
	pub method: String,
	pub params: Json,
}

/// A worker-side mock: records the wire trace and optionally answers.
pub(super) fn mock(server: WorkerPort, reply: Reply) -> flume::Receiver<TraceEntry> {
	let (trace_tx, trace_rx) = flume::unbounded();
	tokio::spawn(async move {
		while let Ok(msg) = server.recv().await {
			match msg {
				PortIn::Request(req) => {
					let entry = TraceEntry {
						kind: "request",
						id: req.id,
						method: req.method.clone(),
						params: req.params.clone(),
					};
					if trace_tx.send(entry).is_err() {
						break;
					}
					if reply == Reply::Silent {
						continue;
					}
					let result = canned_result(&req.method, &req.params);
					let response = PortOut::Response(Response {
						id: req.id,
						result,
					});
					if server.send(response).await.is_err() {
						break;
					}
				}
				PortIn::Cancel {
					id,
				} => {
					let entry = TraceEntry {
						kind: "cancel",
						id,
						method: String::new(),
						params: Json::Null,
					};
					if trace_tx.send(entry).is_err() {
						break;
					}
				}
			}
		}
	});
	trace_rx
}

fn canned_result(method: &str, params: &Json) -> Result<Json, String> {
	match method {
		"ping" => Ok(json!("pong")),
		"getCell" | "getCellRich" => Ok(json!({
			"sheet": "Sheet1",
			"address": params["address"],
			"input": null,
			"value": null,
		})),
		"getSheetDimensions" => Ok(json!({ "rows": 0, "cols": 0 })),
		"getRangeCompact" | "recalculate" | "lexFormula" | "lexFormulaPartial" => Ok(json!([])),
		"supportedLocaleIds" => Ok(json!(["en-US"])),
		"internStyle" => Ok(json!(1)),
		"mystery" => Err("unknown method: mystery".to_owned()),
		_ => Ok(Json::Null),
	}
}
