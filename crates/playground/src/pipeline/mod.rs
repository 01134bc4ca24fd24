//! Compile-run pipeline.
//!
//! A single driver task owns the sequence clock, the four problem slots and the
//! published [`Snapshot`]. Triggers, compile results, run results, live
//! markers and sandbox events all reach it as messages, so its state needs no
//! lock. Compile and run calls execute on their own tasks and report back
//! tagged with the sequence that started them; anything tagged with a sequence
//! other than the current one is dropped unseen. Console output and runtime
//! errors are likewise dropped unless they carry the current pass's run id.

mod console;
mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub use console::ConsoleBuffer;
use parking_lot::Mutex;
use playpen_compiler::{CompileError, CompileMode, CompileOutput, CompilePayload, CompilerClient};
use playpen_diagnostics::{ProblemSlots, Producer, Summary};
use playpen_primitives::{Problem, ProblemSource, Subscription};
use playpen_sandbox::{RunError, SandboxBridge, SandboxEvent};
use playpen_worker::{CancellationToken, Debouncer, SequenceClock, TaskClass};
pub use status::{Phase, Snapshot, Status, Tone, TriggerKind, TriggerOutcome};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::PlaygroundConfig;

/// Reads the current source text when a pass starts.
pub type SourceFn = Arc<dyn Fn() -> String + Send + Sync>;

type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
	entries: Mutex<Vec<(u64, Listener)>>,
	next_id: AtomicU64,
}

impl Listeners {
	fn snapshot(&self) -> Vec<Listener> {
		self.entries.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect()
	}
}

enum Command {
	Trigger {
		kind: TriggerKind,
		reply: Option<oneshot::Sender<TriggerOutcome>>,
	},
	Compiled {
		sequence: u64,
		result: Result<CompileOutput, CompileError>,
	},
	Ran {
		sequence: u64,
		result: Result<(), RunError>,
	},
	Markers(Vec<Problem>),
}

struct PipelineInner {
	commands: mpsc::UnboundedSender<Command>,
	snapshot: watch::Receiver<Snapshot>,
	listeners: Arc<Listeners>,
	console: ConsoleBuffer,
	debouncer: Debouncer,
	debounce: Duration,
	cancel: CancellationToken,
	disposed: AtomicBool,
}

impl Drop for PipelineInner {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Handle to a running pipeline.
///
/// Cheap to clone. The driver stops when [`Self::dispose`] is called or the
/// last handle is dropped.
#[derive(Clone)]
pub struct Pipeline {
	inner: Arc<PipelineInner>,
}

impl Pipeline {
	/// Starts the driver task.
	pub fn new(source: SourceFn, compiler: CompilerClient, sandbox: SandboxBridge, config: &PlaygroundConfig) -> Self {
		let (commands, receiver) = mpsc::unbounded_channel();
		let (published, snapshot) = watch::channel(Snapshot::default());
		let listeners = Arc::new(Listeners::default());
		let console = ConsoleBuffer::new(config.console_limit);
		let cancel = CancellationToken::new();
		let events = sandbox.subscribe();

		let driver = Driver {
			clock: SequenceClock::new(),
			slots: ProblemSlots::new(),
			phase: Phase::Idle,
			waiter: None,
			current_run: None,
			source,
			compiler,
			sandbox,
			language: config.language.clone(),
			mode: config.compile_mode,
			source_map: config.source_map,
			commands: commands.clone(),
			published,
			listeners: Arc::clone(&listeners),
			console: console.clone(),
			cancel: cancel.clone(),
		};
		playpen_worker::spawn(TaskClass::Interactive, driver.drive(receiver, events));

		Self {
			inner: Arc::new(PipelineInner {
				commands,
				snapshot,
				listeners,
				console,
				debouncer: Debouncer::new(TaskClass::Interactive),
				debounce: config.debounce(),
				cancel,
				disposed: AtomicBool::new(false),
			}),
		}
	}

	/// Requests a pass without waiting for it.
	///
	/// Debounced kinds restart the quiescence window; other kinds fire now and
	/// drop any pending debounced trigger.
	pub fn trigger(&self, kind: TriggerKind) {
		if self.is_disposed() {
			return;
		}
		if kind.is_debounced() {
			trace!(kind = kind.as_str(), "pipeline.trigger.debounced");
			let commands = self.inner.commands.clone();
			self.inner.debouncer.schedule(self.inner.debounce, async move {
				let _ = commands.send(Command::Trigger { kind, reply: None });
			});
		} else {
			self.inner.debouncer.cancel();
			let _ = self.inner.commands.send(Command::Trigger { kind, reply: None });
		}
	}

	/// Starts a pass immediately, whatever `kind` is, and waits for it to land.
	pub async fn run(&self, kind: TriggerKind) -> TriggerOutcome {
		if self.is_disposed() {
			return TriggerOutcome::Disposed;
		}
		self.inner.debouncer.cancel();
		let (reply, outcome) = oneshot::channel();
		if self.inner.commands.send(Command::Trigger { kind, reply: Some(reply) }).is_err() {
			return TriggerOutcome::Disposed;
		}
		outcome.await.unwrap_or(TriggerOutcome::Disposed)
	}

	/// Replaces the live-analysis problems. Applied immediately, whatever the
	/// pass is doing.
	pub fn update_live(&self, problems: Vec<Problem>) {
		if self.is_disposed() {
			return;
		}
		let _ = self.inner.commands.send(Command::Markers(problems));
	}

	/// The latest published snapshot.
	pub fn snapshot(&self) -> Snapshot {
		self.inner.snapshot.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
		self.inner.snapshot.clone()
	}

	/// Calls `listener` with every snapshot published from now on.
	pub fn on_status(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
		let id = self.inner.listeners.next_id.fetch_add(1, Ordering::Relaxed);
		self.inner.listeners.entries.lock().push((id, Arc::new(listener)));
		let listeners = Arc::downgrade(&self.inner.listeners);
		Subscription::new(move || {
			if let Some(listeners) = listeners.upgrade() {
				listeners.entries.lock().retain(|(entry, _)| *entry != id);
			}
		})
	}

	pub fn console(&self) -> &ConsoleBuffer {
		&self.inner.console
	}

	/// Stops the driver. Pending [`Self::run`] calls resolve to
	/// [`TriggerOutcome::Disposed`] and no listener fires afterwards.
	///
	/// Idempotent. The compiler client and sandbox bridge are not disposed.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.debouncer.cancel();
		self.inner.cancel.cancel();
		self.inner.listeners.entries.lock().clear();
		debug!("pipeline.dispose");
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::Acquire)
	}
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline")
			.field("status", &self.inner.snapshot.borrow().status)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

struct Driver {
	clock: SequenceClock,
	slots: ProblemSlots,
	phase: Phase,
	/// Caller waiting on the current sequence, if any.
	waiter: Option<(u64, oneshot::Sender<TriggerOutcome>)>,
	/// Sandbox run started by the current sequence, if it got that far.
	current_run: Option<String>,
	source: SourceFn,
	compiler: CompilerClient,
	sandbox: SandboxBridge,
	language: String,
	mode: CompileMode,
	source_map: bool,
	commands: mpsc::UnboundedSender<Command>,
	published: watch::Sender<Snapshot>,
	listeners: Arc<Listeners>,
	console: ConsoleBuffer,
	cancel: CancellationToken,
}

impl Driver {
	async fn drive(mut self, mut commands: mpsc::UnboundedReceiver<Command>, mut events: broadcast::Receiver<SandboxEvent>) {
		let mut events_open = true;
		loop {
			// Sandbox events first: a run's runtime errors are broadcast before
			// its outcome can reach the command queue.
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				event = events.recv(), if events_open => match event {
					Ok(event) => self.on_sandbox_event(event),
					Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(skipped, "pipeline.sandbox_events.lagged"),
					Err(broadcast::error::RecvError::Closed) => events_open = false,
				},
				command = commands.recv() => match command {
					Some(command) => self.handle(command),
					None => break,
				},
			}
		}

		if let Some((_, waiter)) = self.waiter.take() {
			let _ = waiter.send(TriggerOutcome::Disposed);
		}
		debug!(sequence = self.clock.current(), "pipeline.driver.exit");
	}

	fn handle(&mut self, command: Command) {
		match command {
			Command::Trigger { kind, reply } => self.start(kind, reply),
			Command::Compiled { sequence, result } => self.compiled(sequence, result),
			Command::Ran { sequence, result } => self.ran(sequence, result),
			Command::Markers(problems) => {
				trace!(count = problems.len(), "pipeline.live_markers");
				self.slots.set(Producer::LiveAnalysis, problems);
				self.publish();
			}
		}
	}

	fn start(&mut self, kind: TriggerKind, reply: Option<oneshot::Sender<TriggerOutcome>>) {
		let sequence = self.clock.advance();
		if let Some((_, previous)) = self.waiter.take() {
			let _ = previous.send(TriggerOutcome::Superseded);
		}
		self.waiter = reply.map(|reply| (sequence, reply));
		self.current_run = None;

		// Live analysis is not tied to a pass; the engine keeps it current.
		for producer in [Producer::CompileErrors, Producer::CompileWarnings, Producer::Runtime] {
			self.slots.clear(producer);
		}
		self.phase = Phase::Compiling;
		debug!(sequence, kind = kind.as_str(), "pipeline.trigger");
		self.publish();

		let payload = CompilePayload {
			language: self.language.clone(),
			code: (self.source)(),
			mode: self.mode,
			source_map: self.source_map,
		};
		let compiler = self.compiler.clone();
		let commands = self.commands.clone();
		playpen_worker::spawn(TaskClass::Interactive, async move {
			let result = compiler.compile(payload).await;
			let _ = commands.send(Command::Compiled { sequence, result });
		});
	}

	fn compiled(&mut self, sequence: u64, result: Result<CompileOutput, CompileError>) {
		if !self.clock.is_current(sequence) {
			trace!(sequence, current = self.clock.current(), "pipeline.compile.stale");
			return;
		}

		let output = match result {
			Ok(output) => output,
			Err(error) => {
				warn!(sequence, %error, "pipeline.compile.failed");
				self.slots
					.set(Producer::CompileErrors, vec![Problem::error(ProblemSource::Compiler, format!("Compilation failed: {error}"))]);
				self.finish(sequence, Phase::CompileFailed);
				return;
			}
		};

		let errors = output.error_problems();
		let warnings = output.warning_problems();
		let blocking = errors.iter().chain(&warnings).filter(|problem| problem.is_error()).count();
		self.slots.set(Producer::CompileErrors, errors);
		self.slots.set(Producer::CompileWarnings, warnings);
		if blocking > 0 {
			debug!(sequence, errors = blocking, "pipeline.compile.errors");
			self.finish(sequence, Phase::CompileFailed);
			return;
		}

		let run = self.sandbox.reserve_run();
		self.current_run = Some(run.to_string());
		self.phase = Phase::Executing;
		debug!(sequence, run, "pipeline.execute");
		self.publish();

		let sandbox = self.sandbox.clone();
		let commands = self.commands.clone();
		playpen_worker::spawn(TaskClass::Interactive, async move {
			let result = sandbox.run_as(run, output.code).await;
			let _ = commands.send(Command::Ran { sequence, result });
		});
	}

	fn ran(&mut self, sequence: u64, result: Result<(), RunError>) {
		if !self.clock.is_current(sequence) {
			trace!(sequence, current = self.clock.current(), "pipeline.execute.stale");
			return;
		}

		match result {
			Ok(()) => self.finish(sequence, Phase::ExecSucceeded),
			Err(error) => {
				debug!(sequence, %error, "pipeline.execute.failed");
				if !self.slots.get(Producer::Runtime).iter().any(Problem::is_error) {
					self.slots.push(Producer::Runtime, Problem::error(ProblemSource::Runtime, error.to_string()));
				}
				self.finish(sequence, Phase::ExecFailed);
			}
		}
	}

	fn on_sandbox_event(&mut self, event: SandboxEvent) {
		// Untagged output comes from guests that do not echo run ids.
		if let Some(run_id) = event.run_id()
			&& matches!(event, SandboxEvent::Console(_) | SandboxEvent::RuntimeError(_))
			&& self.current_run.as_deref() != Some(run_id)
		{
			trace!(kind = event.kind(), run_id, current = ?self.current_run, "pipeline.sandbox_event.stale");
			return;
		}
		match event {
			SandboxEvent::ConsoleClear => self.console.clear(),
			SandboxEvent::Console(entry) => self.console.push(entry),
			SandboxEvent::RuntimeError(report) => {
				debug!(message = %report.message, line = ?report.lineno, "pipeline.runtime_error");
				self.slots.push(Producer::Runtime, report.to_problem());
				self.publish();
			}
			other => trace!(kind = other.kind(), "pipeline.sandbox_event"),
		}
	}

	fn finish(&mut self, sequence: u64, phase: Phase) {
		self.phase = phase;
		let snapshot = self.publish();
		debug!(sequence, tone = snapshot.status.tone.as_str(), problems = snapshot.problems.len(), "pipeline.complete");
		if let Some((_, waiter)) = self.waiter.take_if(|(waiting, _)| *waiting == sequence) {
			let _ = waiter.send(TriggerOutcome::Completed(snapshot.status));
		}
	}

	fn publish(&self) -> Snapshot {
		let problems = self.slots.merged();
		let summary = Summary::of(&problems);
		let snapshot = Snapshot {
			status: Status::derive(self.phase, &summary),
			problems,
			summary,
			sequence: self.clock.current(),
		};
		self.published.send_replace(snapshot.clone());
		if !self.cancel.is_cancelled() {
			for listener in self.listeners.snapshot() {
				listener(&snapshot);
			}
		}
		snapshot
	}
}
