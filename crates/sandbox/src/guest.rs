//! Sandbox-side driver.
//!
//! Owns the isolated realm's end of the port: announces readiness, instruments
//! the console, captures uncaught errors and drives the run lifecycle for each
//! `run` command.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use playpen_worker::{MessagePort, PortSender, TaskClass};
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

use crate::protocol::{ChannelId, ConsoleEntry, ConsoleLevel, GuestMessage, HostCommand, RunFailure, RuntimeErrorReport, SandboxEvent};

/// An uncaught error that ended a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
	pub message: String,
	pub stack: Option<String>,
	pub lineno: Option<u32>,
	pub colno: Option<u32>,
}

impl ScriptError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn at(mut self, lineno: u32, colno: u32) -> Self {
		self.lineno = Some(lineno);
		self.colno = Some(colno);
		self
	}
}

impl From<ScriptError> for RuntimeErrorReport {
	fn from(error: ScriptError) -> Self {
		Self {
			message: error.message,
			stack: error.stack,
			source: None,
			lineno: error.lineno,
			colno: error.colno,
			run_id: None,
		}
	}
}

/// Executes compiled code inside the realm.
///
/// The engine reports console output and asynchronous failures through the
/// [`RunScope`]; a returned error is treated as an uncaught synchronous error.
#[async_trait]
pub trait ScriptEngine: Send + Sync + 'static {
	async fn execute(&self, code: String, scope: RunScope) -> Result<(), ScriptError>;
}

/// Handle given to the engine for the duration of one run.
#[derive(Debug, Clone)]
pub struct RunScope {
	channel: ChannelId,
	run_id: String,
	sender: PortSender,
}

impl RunScope {
	/// Token correlating this run's events.
	pub fn run_id(&self) -> &str {
		&self.run_id
	}

	/// Forwards a console call to the host.
	pub fn console(&self, level: ConsoleLevel, args: Vec<Value>) {
		trace!(run_id = %self.run_id, level = level.as_str(), "sandbox.console");
		self.emit(SandboxEvent::Console(ConsoleEntry::new(level, args).for_run(self.run_id.clone())));
	}

	/// Shorthand for a single-string `console.log`.
	pub fn log(&self, text: impl Into<String>) {
		self.console(ConsoleLevel::Log, vec![Value::String(text.into())]);
	}

	/// Reports an error raised outside the run's own control flow, such as an
	/// unhandled promise rejection. The run itself carries on.
	pub fn report_error(&self, report: RuntimeErrorReport) {
		self.emit(SandboxEvent::RuntimeError(report.for_run(self.run_id.clone())));
	}

	fn emit(&self, event: SandboxEvent) {
		post(&self.sender, &self.channel, event);
	}
}

fn post(sender: &PortSender, channel: &ChannelId, event: SandboxEvent) -> bool {
	let kind = event.kind();
	if sender.post(GuestMessage::new(channel.clone(), event).encode()).is_err() {
		trace!(kind, "sandbox.post.closed");
		return false;
	}
	true
}

type RunTasks = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// Starts the guest driver on `port`.
///
/// Emits `sandbox-ready` once, then serves `run` commands addressed to
/// `channel` until the host end goes away. In-flight runs are aborted on exit.
pub fn spawn_guest(port: MessagePort, channel: ChannelId, engine: Arc<dyn ScriptEngine>) -> JoinHandle<()> {
	playpen_worker::spawn(TaskClass::Background, serve(port, channel, engine))
}

async fn serve(port: MessagePort, channel: ChannelId, engine: Arc<dyn ScriptEngine>) {
	let (sender, mut receiver) = port.split();
	let runs: RunTasks = Arc::new(Mutex::new(HashMap::new()));
	let mut fallback_ids = 0u64;

	if !post(&sender, &channel, SandboxEvent::Ready) {
		return;
	}
	debug!(%channel, "sandbox.ready");

	while let Some(message) = receiver.recv().await {
		let command = match serde_json::from_value::<HostCommand>(message) {
			Ok(command) => command,
			Err(error) => {
				trace!(%error, "sandbox.command.malformed");
				continue;
			}
		};
		if command.channel() != &channel {
			trace!(foreign = %command.channel(), "sandbox.command.foreign_channel");
			continue;
		}

		let HostCommand::Run { code, run_id, .. } = command;
		let run_id = run_id.unwrap_or_else(|| {
			fallback_ids += 1;
			format!("guest-{fallback_ids}")
		});

		post(&sender, &channel, SandboxEvent::ConsoleClear);
		post(&sender, &channel, SandboxEvent::RunStart { run_id: Some(run_id.clone()) });

		let scope = RunScope {
			channel: channel.clone(),
			run_id: run_id.clone(),
			sender: sender.clone(),
		};
		let engine_task = playpen_worker::spawn(TaskClass::Interactive, {
			let engine = Arc::clone(&engine);
			let scope = scope.clone();
			async move { engine.execute(code, scope).await }
		});
		runs.lock().insert(run_id, engine_task.abort_handle());
		playpen_worker::spawn(TaskClass::Background, settle(engine_task, scope, Arc::clone(&runs)));
	}

	let in_flight: Vec<_> = runs.lock().drain().collect();
	debug!(%channel, in_flight = in_flight.len(), "sandbox.teardown");
	for (_, task) in in_flight {
		task.abort();
	}
}

/// Waits for one run and emits its single terminal event.
async fn settle(engine_task: JoinHandle<Result<(), ScriptError>>, scope: RunScope, runs: RunTasks) {
	let RunScope { channel, run_id, sender } = scope;
	let outcome = match engine_task.await {
		Ok(outcome) => outcome,
		Err(error) if error.is_panic() => {
			warn!(%run_id, "sandbox.run.panicked");
			Err(ScriptError::new("script engine panicked"))
		}
		Err(_) => {
			trace!(%run_id, "sandbox.run.aborted");
			return;
		}
	};
	runs.lock().remove(&run_id);

	match outcome {
		Ok(()) => {
			post(&sender, &channel, SandboxEvent::RunSuccess { run_id: Some(run_id) });
		}
		Err(error) => {
			let message = error.message.clone();
			let report = RuntimeErrorReport::from(error).for_run(run_id.clone());
			post(&sender, &channel, SandboxEvent::RuntimeError(report));
			post(
				&sender,
				&channel,
				SandboxEvent::RunFail {
					run_id: Some(run_id),
					failure: RunFailure { message },
				},
			);
		}
	}
}
