//! Host side of the sandbox channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use playpen_worker::{CancellationToken, MessagePort, PortReceiver, PortSender, TaskClass};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, trace};

use crate::launcher::SandboxLauncher;
use crate::protocol::{ChannelId, GuestMessage, HostCommand, SandboxEvent};
use crate::{RunError, SandboxError};

type PendingRun = oneshot::Sender<Result<(), RunError>>;

struct BridgeInner {
	channel: ChannelId,
	sender: Mutex<Option<PortSender>>,
	ready: watch::Receiver<bool>,
	pending: Mutex<BTreeMap<u64, PendingRun>>,
	next_run: AtomicU64,
	events: broadcast::Sender<SandboxEvent>,
	cancel: CancellationToken,
	disposed: AtomicBool,
}

/// Host handle to one sandbox instance.
///
/// Messages without this instance's [`ChannelId`] and messages that fail to
/// decode are dropped. Every accepted event is re-broadcast to
/// [`Self::subscribe`]rs, in arrival order, before any run it settles resolves.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct SandboxBridge {
	inner: Arc<BridgeInner>,
}

impl SandboxBridge {
	/// Launches a realm with a fresh channel id and connects to it.
	pub fn launch(launcher: &dyn SandboxLauncher, event_buffer: usize) -> Result<Self, SandboxError> {
		let channel = ChannelId::random();
		let port = launcher.launch(&channel)?;
		debug!(%channel, "sandbox.launch");
		Ok(Self::connect(port, channel, event_buffer))
	}

	/// Connects to a realm already listening on the far side of `port`.
	pub fn connect(port: MessagePort, channel: ChannelId, event_buffer: usize) -> Self {
		let (sender, receiver) = port.split();
		let (ready_tx, ready_rx) = watch::channel(false);
		let (events, _) = broadcast::channel(event_buffer.max(1));
		let inner = Arc::new(BridgeInner {
			channel,
			sender: Mutex::new(Some(sender)),
			ready: ready_rx,
			pending: Mutex::new(BTreeMap::new()),
			next_run: AtomicU64::new(0),
			events,
			cancel: CancellationToken::new(),
			disposed: AtomicBool::new(false),
		});
		playpen_worker::spawn(TaskClass::Background, listen(Arc::clone(&inner), receiver, ready_tx));
		Self { inner }
	}

	pub fn channel(&self) -> &ChannelId {
		&self.inner.channel
	}

	/// Returns true once the realm has announced `sandbox-ready`.
	pub fn is_ready(&self) -> bool {
		*self.inner.ready.borrow()
	}

	/// Subscribes to events from this instance.
	pub fn subscribe(&self) -> broadcast::Receiver<SandboxEvent> {
		self.inner.events.subscribe()
	}

	/// Executes `code`, waiting for readiness first.
	///
	/// Resolves when the realm reports the run's terminal event. Runs may
	/// overlap; each settles on its own outcome.
	///
	/// # Errors
	///
	/// - [`RunError::Failed`] when the script threw.
	/// - [`RunError::Disconnected`] when the realm went away.
	/// - [`RunError::Disposed`] when the bridge was disposed first.
	pub async fn run(&self, code: impl Into<String>) -> Result<(), RunError> {
		self.run_as(self.reserve_run(), code).await
	}

	/// Hands out a fresh run id without starting anything.
	///
	/// Pass it to [`Self::run_as`]; the guest tags the run's events with its
	/// decimal form, see [`SandboxEvent::run_id`].
	pub fn reserve_run(&self) -> u64 {
		self.inner.next_run.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Like [`Self::run`], under an id obtained from [`Self::reserve_run`].
	///
	/// # Errors
	///
	/// Same as [`Self::run`].
	pub async fn run_as(&self, run: u64, code: impl Into<String>) -> Result<(), RunError> {
		if self.is_disposed() {
			return Err(RunError::Disposed);
		}

		let mut ready = self.inner.ready.clone();
		let became_ready = tokio::select! {
			biased;
			_ = self.inner.cancel.cancelled() => return Err(RunError::Disposed),
			result = ready.wait_for(|ready| *ready) => result.is_ok(),
		};
		if !became_ready {
			return Err(RunError::Disconnected);
		}

		let command = HostCommand::Run {
			channel: self.inner.channel.clone(),
			code: code.into(),
			run_id: Some(run.to_string()),
		};
		let message = serde_json::to_value(&command).map_err(|e| RunError::Encode(e.to_string()))?;

		let (tx, rx) = oneshot::channel();
		self.inner.pending.lock().insert(run, tx);
		if !self.inner.post(message) {
			self.inner.pending.lock().remove(&run);
			return Err(if self.is_disposed() { RunError::Disposed } else { RunError::Disconnected });
		}
		debug!(channel = %self.inner.channel, run, "sandbox.run");

		rx.await.unwrap_or(Err(RunError::Disposed))
	}

	/// Number of runs waiting for a terminal event.
	pub fn pending_runs(&self) -> usize {
		self.inner.pending.lock().len()
	}

	/// Detaches from the realm and fails pending runs with [`RunError::Disposed`].
	///
	/// Dropping the port lets the realm tear itself down. Idempotent.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.cancel.cancel();
		self.inner.sender.lock().take();
		self.inner.fail_pending(RunError::Disposed);
		debug!(channel = %self.inner.channel, "sandbox.dispose");
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::Acquire)
	}
}

impl std::fmt::Debug for SandboxBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SandboxBridge")
			.field("channel", &self.inner.channel)
			.field("ready", &self.is_ready())
			.field("pending_runs", &self.pending_runs())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

impl BridgeInner {
	fn post(&self, message: Value) -> bool {
		self.sender.lock().as_ref().is_some_and(|sender| sender.post(message).is_ok())
	}

	fn fail_pending(&self, error: RunError) {
		let pending = std::mem::take(&mut *self.pending.lock());
		if !pending.is_empty() {
			debug!(channel = %self.channel, pending = pending.len(), %error, "sandbox.pending.failed");
		}
		for (_, reply) in pending {
			let _ = reply.send(Err(error.clone()));
		}
	}

	/// Settles the run named by `run_id`, or the most recent one for guests
	/// that do not echo ids.
	fn settle(&self, run_id: Option<&str>, outcome: Result<(), RunError>) {
		let reply = {
			let mut pending = self.pending.lock();
			match run_id.and_then(|id| id.parse::<u64>().ok()) {
				Some(run) => pending.remove(&run),
				None => pending.pop_last().map(|(_, reply)| reply),
			}
		};
		match reply {
			Some(reply) => {
				let _ = reply.send(outcome);
			}
			None => trace!(channel = %self.channel, ?run_id, "sandbox.outcome.unsolicited"),
		}
	}

	fn dispatch(&self, message: Value, ready: &watch::Sender<bool>) {
		let message = match GuestMessage::decode(message) {
			Ok(message) => message,
			Err(error) => {
				trace!(%error, "sandbox.message.dropped");
				return;
			}
		};
		if message.channel != self.channel {
			trace!(foreign = %message.channel, "sandbox.message.foreign_channel");
			return;
		}

		let event = message.event;
		if matches!(event, SandboxEvent::Ready) {
			if ready.send_replace(true) {
				trace!(channel = %self.channel, "sandbox.ready.duplicate");
				return;
			}
			debug!(channel = %self.channel, "sandbox.ready");
		}

		let settlement = match &event {
			SandboxEvent::RunSuccess { run_id } => Some((run_id.clone(), Ok(()))),
			SandboxEvent::RunFail { run_id, failure } => Some((run_id.clone(), Err(RunError::Failed(failure.message.clone())))),
			_ => None,
		};
		let _ = self.events.send(event);
		if let Some((run_id, outcome)) = settlement {
			self.settle(run_id.as_deref(), outcome);
		}
	}
}

async fn listen(inner: Arc<BridgeInner>, mut receiver: PortReceiver, ready: watch::Sender<bool>) {
	loop {
		let message = tokio::select! {
			biased;
			_ = inner.cancel.cancelled() => break,
			message = receiver.recv() => message,
		};
		let Some(message) = message else {
			debug!(channel = %inner.channel, "sandbox.channel_closed");
			inner.fail_pending(RunError::Disconnected);
			break;
		};
		inner.dispatch(message, &ready);
	}
	trace!(channel = %inner.channel, "sandbox.listener.exit");
}
