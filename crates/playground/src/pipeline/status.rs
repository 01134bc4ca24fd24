use std::fmt;

use playpen_diagnostics::Summary;
use playpen_primitives::Problem;

/// What started a pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
	/// Playground assembled.
	Init,
	/// Explicit run request from the embedder.
	Manual,
	/// Editor lost focus. Debounced.
	Blur,
	/// Run keyboard shortcut.
	Shortcut,
	/// Buffer edited. Debounced.
	Change,
}

impl TriggerKind {
	/// Debounced kinds wait for a quiescence window; the rest fire immediately.
	pub const fn is_debounced(self) -> bool {
		matches!(self, Self::Blur | Self::Change)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Init => "init",
			Self::Manual => "manual",
			Self::Blur => "blur",
			Self::Shortcut => "shortcut",
			Self::Change => "change",
		}
	}
}

impl fmt::Display for TriggerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Where the current pass is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	/// No pass has run yet.
	Idle,
	Compiling,
	Executing,
	/// The compiler reported errors or could not be reached.
	CompileFailed,
	/// The sandbox reported a failure.
	ExecFailed,
	ExecSucceeded,
}

impl Phase {
	pub const fn is_busy(self) -> bool {
		matches!(self, Self::Compiling | Self::Executing)
	}
}

/// Status line colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
	Busy,
	Error,
	Warn,
	Ok,
}

impl Tone {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Busy => "busy",
			Self::Error => "error",
			Self::Warn => "warn",
			Self::Ok => "ok",
		}
	}
}

impl fmt::Display for Tone {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Externally visible status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	pub phase: Phase,
	pub tone: Tone,
	pub message: String,
}

fn plural(count: usize, noun: &str) -> String {
	if count == 1 { format!("1 {noun}") } else { format!("{count} {noun}s") }
}

impl Status {
	/// Derives the status line from the pass phase and the merged problem counts.
	///
	/// Busy phases always read busy. Failed phases always read error. Otherwise
	/// the counts decide, so live diagnostics arriving after a pass still move
	/// the tone.
	pub fn derive(phase: Phase, summary: &Summary) -> Self {
		let (tone, message) = match phase {
			Phase::Compiling => (Tone::Busy, "Compiling…".to_string()),
			Phase::Executing => (Tone::Busy, "Running…".to_string()),
			Phase::CompileFailed if summary.errors > 0 => (Tone::Error, format!("Compilation failed: {}", plural(summary.errors, "error"))),
			Phase::CompileFailed => (Tone::Error, "Compilation failed".to_string()),
			Phase::ExecFailed => (Tone::Error, "Runtime error".to_string()),
			Phase::Idle | Phase::ExecSucceeded if summary.errors > 0 => (Tone::Error, plural(summary.errors, "error")),
			Phase::Idle if summary.warnings > 0 => (Tone::Warn, plural(summary.warnings, "warning")),
			Phase::ExecSucceeded if summary.warnings > 0 => (Tone::Warn, format!("Ran with {}", plural(summary.warnings, "warning"))),
			Phase::Idle => (Tone::Ok, "Ready".to_string()),
			Phase::ExecSucceeded => (Tone::Ok, "Ran successfully".to_string()),
		};
		Self { phase, tone, message }
	}
}

impl Default for Status {
	fn default() -> Self {
		Self::derive(Phase::Idle, &Summary::default())
	}
}

/// Everything the pipeline publishes, replaced atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
	pub status: Status,
	/// Merged problems, most severe first.
	pub problems: Vec<Problem>,
	pub summary: Summary,
	/// Sequence of the newest trigger seen when this was published.
	pub sequence: u64,
}

/// How a requested pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
	/// The pass ran to the end and published this status.
	Completed(Status),
	/// A newer trigger took over before this pass landed.
	Superseded,
	/// The pipeline was disposed.
	Disposed,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn summary(errors: usize, warnings: usize) -> Summary {
		Summary {
			errors,
			warnings,
			..Summary::default()
		}
	}

	#[test]
	fn busy_phases_ignore_counts() {
		assert_eq!(Status::derive(Phase::Compiling, &summary(3, 0)).tone, Tone::Busy);
		assert_eq!(Status::derive(Phase::Executing, &summary(0, 0)).message, "Running…");
	}

	#[test]
	fn success_distinguishes_warnings_from_clean() {
		assert_eq!(Status::derive(Phase::ExecSucceeded, &summary(0, 0)).tone, Tone::Ok);
		let warned = Status::derive(Phase::ExecSucceeded, &summary(0, 2));
		assert_eq!((warned.tone, warned.message.as_str()), (Tone::Warn, "Ran with 2 warnings"));
		assert_eq!(Status::derive(Phase::ExecSucceeded, &summary(1, 2)).tone, Tone::Error);
	}

	#[test]
	fn failures_are_always_errors() {
		let failed = Status::derive(Phase::CompileFailed, &summary(1, 0));
		assert_eq!((failed.tone, failed.message.as_str()), (Tone::Error, "Compilation failed: 1 error"));
		assert_eq!(Status::derive(Phase::ExecFailed, &summary(0, 0)).tone, Tone::Error);
	}

	#[test]
	fn trigger_kinds_split_on_debounce() {
		assert!(TriggerKind::Blur.is_debounced());
		assert!(TriggerKind::Change.is_debounced());
		assert!(!TriggerKind::Shortcut.is_debounced());
		assert_eq!(Tone::Warn.to_string(), "warn");
	}
}
