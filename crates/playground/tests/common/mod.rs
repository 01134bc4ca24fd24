//! Fakes shared by the end-to-end tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use playpen_compiler::{CompileOutput, CompilePayload, Compiler, ReportedProblem, spawn_compile_worker};
use playpen_declarations::DeclarationSink;
use playpen_playground::{EditorWidget, Playground, PlaygroundConfig, WidgetEvent, WidgetListener};
use playpen_primitives::Subscription;
use playpen_sandbox::testing::LineScriptEngine;
use playpen_sandbox::{InProcessSandbox, RunScope, ScriptEngine, ScriptError};
use playpen_worker::message_channel;

/// Analysis engine stand-in: the set of live declaration files.
#[derive(Default)]
pub struct FakeAnalysis {
	files: Arc<Mutex<BTreeMap<String, String>>>,
	registrations: AtomicUsize,
}

impl FakeAnalysis {
	pub fn paths(&self) -> Vec<String> {
		self.files.lock().keys().cloned().collect()
	}

	pub fn registrations(&self) -> usize {
		self.registrations.load(Ordering::SeqCst)
	}
}

impl DeclarationSink for FakeAnalysis {
	fn register(&self, path: &str, content: &str) -> Subscription {
		self.registrations.fetch_add(1, Ordering::SeqCst);
		self.files.lock().insert(path.to_owned(), content.to_owned());
		let files = Arc::downgrade(&self.files);
		let path = path.to_owned();
		Subscription::new(move || {
			if let Some(files) = files.upgrade() {
				files.lock().remove(&path);
			}
		})
	}
}

pub struct FakeWidget {
	text: Mutex<String>,
	listeners: Arc<Mutex<Vec<(u64, WidgetListener)>>>,
	next_listener: AtomicU64,
	pub analysis: Arc<FakeAnalysis>,
}

impl FakeWidget {
	pub fn new(text: &str) -> Arc<Self> {
		Arc::new(Self {
			text: Mutex::new(text.to_owned()),
			listeners: Arc::new(Mutex::new(Vec::new())),
			next_listener: AtomicU64::new(0),
			analysis: Arc::new(FakeAnalysis::default()),
		})
	}

	pub fn emit(&self, event: WidgetEvent) {
		let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in listeners {
			listener(event.clone());
		}
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}
}

impl EditorWidget for FakeWidget {
	fn value(&self) -> String {
		self.text.lock().clone()
	}

	fn set_value(&self, text: &str) {
		*self.text.lock() = text.to_owned();
		self.emit(WidgetEvent::ContentChanged);
	}

	fn subscribe(&self, listener: WidgetListener) -> Subscription {
		let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
		self.listeners.lock().push((id, listener));
		let listeners = Arc::downgrade(&self.listeners);
		Subscription::new(move || {
			if let Some(listeners) = listeners.upgrade() {
				listeners.lock().retain(|(entry, _)| *entry != id);
			}
		})
	}

	fn declarations(&self) -> Arc<dyn DeclarationSink> {
		self.analysis.clone()
	}
}

/// Passes code through. Lines containing `!!` are syntax errors at that
/// column; lines starting with `var ` get a warning.
pub struct ToyCompiler;

#[async_trait]
impl Compiler for ToyCompiler {
	async fn compile(&mut self, payload: CompilePayload) -> Result<CompileOutput, String> {
		let mut output = CompileOutput {
			code: payload.code.clone(),
			..CompileOutput::default()
		};
		for (index, line) in payload.code.lines().enumerate() {
			let line_no = index as u32 + 1;
			if let Some(column) = line.find("!!") {
				output.errors.push(ReportedProblem::new("Expression expected.").at(line_no, column as u32 + 1));
			}
			if line.starts_with("var ") {
				output.warnings.push(ReportedProblem::new("Unexpected var, use let or const instead.").at(line_no, 1));
			}
		}
		Ok(output)
	}
}

/// [`LineScriptEngine`] that counts how often it was asked to execute.
#[derive(Clone, Default)]
pub struct CountingEngine {
	pub runs: Arc<AtomicUsize>,
}

impl CountingEngine {
	pub fn runs(&self) -> usize {
		self.runs.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ScriptEngine for CountingEngine {
	async fn execute(&self, code: String, scope: RunScope) -> Result<(), ScriptError> {
		self.runs.fetch_add(1, Ordering::SeqCst);
		LineScriptEngine.execute(code, scope).await
	}
}

pub struct Fixture {
	pub playground: Playground,
	pub widget: Arc<FakeWidget>,
	pub engine: CountingEngine,
}

pub fn assemble(source: &str, config: PlaygroundConfig) -> Fixture {
	let widget = FakeWidget::new(source);
	let engine = CountingEngine::default();
	let (host, worker) = message_channel();
	let _compile_worker = spawn_compile_worker(worker, ToyCompiler);
	let playground = Playground::new(widget.clone(), &InProcessSandbox::new(engine.clone()), host, config).unwrap();
	Fixture { playground, widget, engine }
}

/// Defaults with the initial run switched off, so tests decide when passes start.
pub fn quiet_config() -> PlaygroundConfig {
	PlaygroundConfig {
		run_on_init: false,
		..PlaygroundConfig::default()
	}
}
