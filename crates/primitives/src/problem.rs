use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic severity, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	/// Blocks execution.
	Error,
	/// Reported but never blocks execution.
	Warning,
	/// Informational note.
	Info,
	/// Editor hint (unused symbol, style).
	Hint,
}

impl Severity {
	/// Sort rank used by the aggregator: error=0, warning=1, info=2, hint=3.
	pub const fn rank(self) -> u8 {
		match self {
			Self::Error => 0,
			Self::Warning => 1,
			Self::Info => 2,
			Self::Hint => 3,
		}
	}

	/// Parses the severity spellings emitted by compilers and analysis engines.
	///
	/// Unknown or missing spellings resolve to `fallback`, which lets a compiler's
	/// `errors` list default to [`Severity::Error`] and its `warnings` list to
	/// [`Severity::Warning`].
	pub fn parse_or(raw: Option<&str>, fallback: Self) -> Self {
		let Some(raw) = raw else {
			return fallback;
		};
		match raw.trim().to_ascii_lowercase().as_str() {
			"error" | "err" | "fatal" => Self::Error,
			"warning" | "warn" => Self::Warning,
			"info" | "information" | "message" => Self::Info,
			"hint" | "suggestion" => Self::Hint,
			_ => fallback,
		}
	}

	/// Lower-case name as used on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Error => "error",
			Self::Warning => "warning",
			Self::Info => "info",
			Self::Hint => "hint",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Producer that reported a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemSource {
	/// Continuous analysis engine attached to the editor widget.
	Analysis,
	/// Compile step.
	Compiler,
	/// Sandboxed execution.
	Runtime,
}

impl ProblemSource {
	/// Lower-case name as used on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Analysis => "analysis",
			Self::Compiler => "compiler",
			Self::Runtime => "runtime",
		}
	}
}

impl fmt::Display for ProblemSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A normalized diagnostic record.
///
/// Positions are 1-based. A zero line or column means the producer did not
/// report a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
	/// Producer of this problem.
	pub source: ProblemSource,
	/// Severity as reported (or synthesized) by the producer.
	pub severity: Severity,
	/// Human readable message.
	pub message: String,
	/// Start line.
	pub line: u32,
	/// Start column.
	pub column: u32,
	/// End line (inclusive).
	pub end_line: u32,
	/// End column (exclusive).
	pub end_column: u32,
	/// Producer-specific diagnostic code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	/// Longer explanation, when the producer offers one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub explain: Option<String>,
}

impl Problem {
	/// Creates a position-less problem.
	pub fn new(source: ProblemSource, severity: Severity, message: impl Into<String>) -> Self {
		Self {
			source,
			severity,
			message: message.into(),
			line: 0,
			column: 0,
			end_line: 0,
			end_column: 0,
			code: None,
			explain: None,
		}
	}

	/// Creates a position-less error.
	pub fn error(source: ProblemSource, message: impl Into<String>) -> Self {
		Self::new(source, Severity::Error, message)
	}

	/// Creates a position-less warning.
	pub fn warning(source: ProblemSource, message: impl Into<String>) -> Self {
		Self::new(source, Severity::Warning, message)
	}

	/// Sets the start position. The end position collapses onto the start
	/// unless it was already set further along.
	#[must_use]
	pub fn at(mut self, line: u32, column: u32) -> Self {
		self.line = line;
		self.column = column;
		if (self.end_line, self.end_column) < (line, column) {
			self.end_line = line;
			self.end_column = column;
		}
		self
	}

	/// Sets the end position.
	#[must_use]
	pub fn spanning(mut self, end_line: u32, end_column: u32) -> Self {
		self.end_line = end_line;
		self.end_column = end_column;
		self
	}

	/// Attaches a diagnostic code.
	#[must_use]
	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());
		self
	}

	/// Attaches an explanation.
	#[must_use]
	pub fn with_explain(mut self, explain: impl Into<String>) -> Self {
		self.explain = Some(explain.into());
		self
	}

	/// Returns true for error-severity problems.
	pub fn is_error(&self) -> bool {
		self.severity == Severity::Error
	}

	/// Returns true for warning-severity problems.
	pub fn is_warning(&self) -> bool {
		self.severity == Severity::Warning
	}
}

impl fmt::Display for Problem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.line > 0 {
			write!(f, "{}:{}: {} [{}]: {}", self.line, self.column, self.severity, self.source, self.message)
		} else {
			write!(f, "{} [{}]: {}", self.severity, self.source, self.message)
		}
	}
}
