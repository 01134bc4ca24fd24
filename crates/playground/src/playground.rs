//! The assembled editor instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use playpen_compiler::CompilerClient;
use playpen_declarations::{DeclarationEntry, DeclarationHandle, DeclarationRegistry, RawDeclaration, ReconcileReport};
use playpen_primitives::Subscription;
use playpen_sandbox::{ConsoleEntry, SandboxBridge, SandboxLauncher};
use playpen_worker::MessagePort;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::completion::{CompletionItem, CompletionProvider, CompletionRegistry, CompletionRequest};
use crate::pipeline::{Pipeline, Snapshot, SourceFn, TriggerKind, TriggerOutcome};
use crate::widget::{EditorWidget, WidgetEvent, WidgetListener};
use crate::{PlaygroundConfig, PlaygroundError};

/// An editor widget with live declarations, a compile step and a sandboxed
/// run preview.
///
/// Owns every collaborator it creates. [`Self::dispose`] (or drop) releases
/// the widget listener, the pipeline, the sandbox, the compile client, the
/// declaration scopes and the completion providers, each exactly once.
pub struct Playground {
	widget: Arc<dyn EditorWidget>,
	config: PlaygroundConfig,
	declarations: DeclarationRegistry,
	compiler: CompilerClient,
	sandbox: SandboxBridge,
	pipeline: Pipeline,
	completions: CompletionRegistry,
	widget_events: Mutex<Option<Subscription>>,
	disposed: AtomicBool,
}

impl Playground {
	/// Assembles a playground around `widget`.
	///
	/// Launches a sandbox through `launcher` and talks to the compile worker on
	/// the far side of `compiler_port`. Must be called inside a tokio runtime
	/// or the background tasks land on the fallback runtime.
	pub fn new(
		widget: Arc<dyn EditorWidget>,
		launcher: &dyn SandboxLauncher,
		compiler_port: MessagePort,
		config: PlaygroundConfig,
	) -> Result<Self, PlaygroundError> {
		let sandbox = SandboxBridge::launch(launcher, config.event_buffer)?;
		let compiler = CompilerClient::connect(compiler_port);
		let declarations = DeclarationRegistry::new(widget.declarations());

		let source: SourceFn = {
			let widget = Arc::clone(&widget);
			Arc::new(move || widget.value())
		};
		let pipeline = Pipeline::new(source, compiler.clone(), sandbox.clone(), &config);

		let listener: WidgetListener = {
			let pipeline = pipeline.clone();
			let run_on_change = config.run_on_change;
			Arc::new(move |event| route(&pipeline, run_on_change, event))
		};
		let widget_events = widget.subscribe(listener);

		if config.run_on_init {
			pipeline.trigger(TriggerKind::Init);
		}
		debug!(channel = %sandbox.channel(), language = %config.language, "playground.ready");

		Ok(Self {
			widget,
			config,
			declarations,
			compiler,
			sandbox,
			pipeline,
			completions: CompletionRegistry::new(),
			widget_events: Mutex::new(Some(widget_events)),
			disposed: AtomicBool::new(false),
		})
	}

	pub fn config(&self) -> &PlaygroundConfig {
		&self.config
	}

	/// Current source text.
	pub fn source(&self) -> String {
		self.widget.value()
	}

	/// Replaces the source text. The widget's change notification drives any
	/// follow-up pass.
	pub fn set_source(&self, text: &str) {
		if self.is_disposed() {
			return;
		}
		self.widget.set_value(text);
	}

	/// Compiles and runs the current source now.
	pub async fn run(&self) -> TriggerOutcome {
		self.pipeline.run(TriggerKind::Manual).await
	}

	/// Replaces the declarations of `scope`.
	pub fn set_declarations<I, R>(&self, scope: &str, entries: I) -> ReconcileReport
	where
		I: IntoIterator<Item = R>,
		R: Into<RawDeclaration>,
	{
		self.declarations.set_scope(scope, entries)
	}

	/// Replaces the declarations of `scope` from persisted JSON.
	pub fn set_declarations_json(&self, scope: &str, value: &Value) -> ReconcileReport {
		self.declarations.set_scope_json(scope, value)
	}

	/// Adds one declaration to `scope`; release the handle to remove it.
	pub fn add_declaration(&self, entry: impl Into<RawDeclaration>, scope: &str) -> DeclarationHandle {
		self.declarations.add_entry(entry, scope)
	}

	pub fn declarations(&self, scope: &str) -> Vec<DeclarationEntry> {
		self.declarations.get_scope(scope)
	}

	pub fn register_completion_provider(&self, provider: Arc<dyn CompletionProvider>) -> Subscription {
		if self.is_disposed() {
			return Subscription::noop();
		}
		self.completions.register(provider)
	}

	pub async fn complete(&self, request: &CompletionRequest) -> Vec<CompletionItem> {
		self.completions.complete(request).await
	}

	pub fn snapshot(&self) -> Snapshot {
		self.pipeline.snapshot()
	}

	pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
		self.pipeline.subscribe()
	}

	pub fn on_status(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
		self.pipeline.on_status(listener)
	}

	/// Console output of the latest run.
	pub fn console(&self) -> Vec<ConsoleEntry> {
		self.pipeline.console().entries()
	}

	/// Releases every owned resource. Idempotent.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(mut events) = self.widget_events.lock().take() {
			events.dispose();
		}
		self.pipeline.dispose();
		self.sandbox.dispose();
		self.compiler.dispose();
		self.declarations.dispose();
		self.completions.clear();
		debug!(channel = %self.sandbox.channel(), "playground.dispose");
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}
}

impl Drop for Playground {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl std::fmt::Debug for Playground {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Playground")
			.field("sandbox", &self.sandbox)
			.field("pipeline", &self.pipeline)
			.field("disposed", &self.is_disposed())
			.finish_non_exhaustive()
	}
}

fn route(pipeline: &Pipeline, run_on_change: bool, event: WidgetEvent) {
	match event {
		WidgetEvent::ContentChanged if run_on_change => pipeline.trigger(TriggerKind::Change),
		WidgetEvent::ContentChanged => {}
		WidgetEvent::Blurred => pipeline.trigger(TriggerKind::Blur),
		WidgetEvent::RunShortcut => pipeline.trigger(TriggerKind::Shortcut),
		WidgetEvent::MarkersChanged(problems) => pipeline.update_live(problems),
	}
}
