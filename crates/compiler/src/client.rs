//! Host-side compile client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use playpen_worker::{CancellationToken, MessagePort, PortReceiver, PortSender, TaskClass};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::protocol::{CompileOutput, CompilePayload, CompileRequest, CompileResponse, CounterIdGen};
use crate::{CompileError, Result};

type PendingReply = oneshot::Sender<Result<CompileOutput>>;

struct ClientInner {
	sender: PortSender,
	ids: Mutex<CounterIdGen>,
	pending: Mutex<HashMap<u64, PendingReply>>,
	cancel: CancellationToken,
	disposed: AtomicBool,
}

/// Client for a compile worker reached through a message port.
///
/// Each [`Self::compile`] call gets a fresh request id; a background router
/// matches responses to callers by id and silently drops responses whose id is
/// unknown (already answered, never asked, or from before a restart).
///
/// Cheap to clone.
#[derive(Clone)]
pub struct CompilerClient {
	inner: Arc<ClientInner>,
}

impl CompilerClient {
	/// Connects to a worker on the far side of `port` and starts the response router.
	pub fn connect(port: MessagePort) -> Self {
		let (sender, receiver) = port.split();
		let inner = Arc::new(ClientInner {
			sender,
			ids: Mutex::new(CounterIdGen::new()),
			pending: Mutex::new(HashMap::new()),
			cancel: CancellationToken::new(),
			disposed: AtomicBool::new(false),
		});
		playpen_worker::spawn(TaskClass::Background, route_responses(Arc::clone(&inner), receiver));
		Self { inner }
	}

	/// Sends one compile request and waits for its response.
	///
	/// # Errors
	///
	/// - [`CompileError::Transport`] when the worker channel is closed.
	/// - [`CompileError::Worker`] when the worker answers `compile:error`.
	/// - [`CompileError::Disposed`] when the client is disposed first.
	pub async fn compile(&self, payload: CompilePayload) -> Result<CompileOutput> {
		if self.is_disposed() {
			return Err(CompileError::Disposed);
		}

		let id = self.inner.ids.lock().next();
		let request = serde_json::to_value(CompileRequest { id, payload }).map_err(|e| CompileError::Encode(e.to_string()))?;

		let (tx, rx) = oneshot::channel();
		{
			let mut pending = self.inner.pending.lock();
			// `dispose` drains the map under this lock; an entry added after that
			// would never be answered.
			if self.is_disposed() {
				return Err(CompileError::Disposed);
			}
			pending.insert(id, tx);
		}
		trace!(id, "compiler.request");

		if self.inner.sender.post(request).is_err() {
			self.inner.pending.lock().remove(&id);
			return Err(CompileError::Transport("compile worker channel closed".into()));
		}

		rx.await.unwrap_or(Err(CompileError::Disposed))
	}

	/// Number of requests still waiting for a response.
	pub fn pending_count(&self) -> usize {
		self.inner.pending.lock().len()
	}

	/// Stops the router and fails outstanding requests with [`CompileError::Disposed`].
	///
	/// Idempotent.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.cancel.cancel();
		let pending = std::mem::take(&mut *self.inner.pending.lock());
		debug!(pending = pending.len(), "compiler.dispose");
		for (_, reply) in pending {
			let _ = reply.send(Err(CompileError::Disposed));
		}
	}

	/// Returns true after [`Self::dispose`].
	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::Acquire)
	}
}

impl std::fmt::Debug for CompilerClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompilerClient")
			.field("pending", &self.pending_count())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

async fn route_responses(inner: Arc<ClientInner>, mut receiver: PortReceiver) {
	loop {
		let message = tokio::select! {
			biased;
			_ = inner.cancel.cancelled() => break,
			message = receiver.recv() => message,
		};

		let Some(message) = message else {
			let pending = std::mem::take(&mut *inner.pending.lock());
			debug!(pending = pending.len(), "compiler.channel_closed");
			for (_, reply) in pending {
				let _ = reply.send(Err(CompileError::Transport("compile worker channel closed".into())));
			}
			break;
		};

		dispatch(&inner, message);
	}
	trace!("compiler.router.exit");
}

fn dispatch(inner: &ClientInner, message: Value) {
	let response = match serde_json::from_value::<CompileResponse>(message) {
		Ok(response) => response,
		Err(error) => {
			debug!(%error, "compiler.response.malformed");
			return;
		}
	};

	let id = response.id();
	let Some(reply) = inner.pending.lock().remove(&id) else {
		trace!(id, "compiler.response.unsolicited");
		return;
	};

	let outcome = match response {
		CompileResponse::Result { result, .. } => Ok(result),
		CompileResponse::Error { error, .. } => Err(CompileError::Worker(error.message)),
	};
	let _ = reply.send(outcome);
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use playpen_worker::message_channel;
	use serde_json::json;

	use super::*;
	use crate::protocol::CompileMode;

	fn payload(code: &str) -> CompilePayload {
		CompilePayload {
			language: "typescript".into(),
			code: code.into(),
			mode: CompileMode::Transpile,
			source_map: false,
		}
	}

	async fn next_request(worker: &mut MessagePort) -> CompileRequest {
		let raw = tokio::time::timeout(Duration::from_secs(1), worker.recv()).await.unwrap().unwrap();
		serde_json::from_value(raw).unwrap()
	}

	#[tokio::test]
	async fn responses_are_matched_by_id_out_of_order() {
		let (host, mut worker) = message_channel();
		let client = CompilerClient::connect(host);

		let first = tokio::spawn({
			let client = client.clone();
			async move { client.compile(payload("first")).await }
		});
		let a = next_request(&mut worker).await;
		let second = tokio::spawn({
			let client = client.clone();
			async move { client.compile(payload("second")).await }
		});
		let b = next_request(&mut worker).await;
		assert_ne!(a.id, b.id);

		for request in [&b, &a] {
			worker
				.post(json!({"id": request.id, "type": "compile:result", "result": {"code": request.payload.code}}))
				.unwrap();
		}

		assert_eq!(first.await.unwrap().unwrap().code, "first");
		assert_eq!(second.await.unwrap().unwrap().code, "second");
		assert_eq!(client.pending_count(), 0);
	}

	#[tokio::test]
	async fn unsolicited_and_malformed_responses_are_dropped() {
		let (host, mut worker) = message_channel();
		let client = CompilerClient::connect(host);
		let call = tokio::spawn({
			let client = client.clone();
			async move { client.compile(payload("x")).await }
		});
		let request = next_request(&mut worker).await;

		worker.post(json!({"id": request.id + 100, "type": "compile:result", "result": {"code": "nope"}})).unwrap();
		worker.post(json!({"garbage": true})).unwrap();
		worker.post(json!({"id": request.id, "type": "compile:error", "error": {"message": "tsc crashed"}})).unwrap();

		assert_eq!(call.await.unwrap(), Err(CompileError::Worker("tsc crashed".into())));
	}

	#[tokio::test]
	async fn closed_worker_fails_pending_with_transport_error() {
		let (host, mut worker) = message_channel();
		let client = CompilerClient::connect(host);
		let call = tokio::spawn({
			let client = client.clone();
			async move { client.compile(payload("x")).await }
		});
		let _ = next_request(&mut worker).await;
		drop(worker);

		assert!(matches!(call.await.unwrap(), Err(CompileError::Transport(_))));
		assert!(matches!(client.compile(payload("y")).await, Err(CompileError::Transport(_))));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn dispose_racing_new_calls_never_strands_them() {
		for _ in 0..50 {
			let (host, _worker) = message_channel();
			let client = CompilerClient::connect(host);
			let calls: Vec<_> = (0..8)
				.map(|_| {
					let client = client.clone();
					tokio::spawn(async move { client.compile(payload("x")).await })
				})
				.collect();
			client.dispose();
			for call in calls {
				let outcome = tokio::time::timeout(Duration::from_secs(1), call).await.unwrap().unwrap();
				assert_eq!(outcome, Err(CompileError::Disposed));
			}
			assert_eq!(client.pending_count(), 0);
		}
	}

	#[tokio::test]
	async fn dispose_fails_pending_and_later_calls() {
		let (host, mut worker) = message_channel();
		let client = CompilerClient::connect(host);
		let call = tokio::spawn({
			let client = client.clone();
			async move { client.compile(payload("x")).await }
		});
		let _ = next_request(&mut worker).await;

		client.dispose();
		client.dispose();
		assert_eq!(call.await.unwrap(), Err(CompileError::Disposed));
		assert_eq!(client.compile(payload("y")).await, Err(CompileError::Disposed));
	}
}
