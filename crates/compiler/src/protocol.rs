//! Wire format between the host and the compile worker.
//!
//! Request: `{id, payload: {language, code, mode, sourceMap}}`.
//! Responses: `{id, type: "compile:result", result: {code, errors, warnings}}` or
//! `{id, type: "compile:error", error: {message}}`.

use playpen_primitives::{Problem, ProblemSource, Severity};
use serde::{Deserialize, Serialize};

/// Counter-based request id generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub u64);

impl CounterIdGen {
	/// Creates a new counter; the first id handed out is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique id.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> u64 {
		self.0 = self.0.wrapping_add(1);
		self.0
	}
}

/// Output flavour requested from the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
	/// Per-file transpilation.
	#[default]
	Transpile,
	/// Bundle the entry point with its imports.
	Bundle,
}

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilePayload {
	/// Source language identifier, e.g. `typescript`.
	pub language: String,
	/// Source text snapshot.
	pub code: String,
	/// Output flavour.
	pub mode: CompileMode,
	/// Whether to emit a source map.
	#[serde(default)]
	pub source_map: bool,
}

/// One compile request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
	/// Unique per call; echoed in the response.
	pub id: u64,
	/// What to compile.
	pub payload: CompilePayload,
}

/// One compile response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompileResponse {
	/// The compiler ran; it may still have reported errors.
	#[serde(rename = "compile:result")]
	Result {
		/// Request id.
		id: u64,
		/// Compiled code and diagnostics.
		result: CompileOutput,
	},
	/// The compiler itself failed.
	#[serde(rename = "compile:error")]
	Error {
		/// Request id.
		id: u64,
		/// Failure description.
		error: WorkerFailure,
	},
}

impl CompileResponse {
	/// Request id this response answers.
	pub fn id(&self) -> u64 {
		match self {
			Self::Result { id, .. } | Self::Error { id, .. } => *id,
		}
	}
}

/// Failure payload of a `compile:error` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
	/// Human readable description.
	pub message: String,
}

/// Successful compile output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
	/// Emitted code, ready for the sandbox.
	pub code: String,
	/// Diagnostics reported as errors.
	#[serde(default)]
	pub errors: Vec<ReportedProblem>,
	/// Diagnostics reported as warnings.
	#[serde(default)]
	pub warnings: Vec<ReportedProblem>,
}

impl CompileOutput {
	/// Normalizes the reported errors. Entries without an explicit severity are errors.
	pub fn error_problems(&self) -> Vec<Problem> {
		self.errors.iter().map(|p| p.to_problem(Severity::Error)).collect()
	}

	/// Normalizes the reported warnings. Entries without an explicit severity are warnings.
	pub fn warning_problems(&self) -> Vec<Problem> {
		self.warnings.iter().map(|p| p.to_problem(Severity::Warning)).collect()
	}
}

/// Diagnostic code as compilers report it: numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
	/// Numeric code, e.g. `2304`.
	Number(i64),
	/// Textual code, e.g. `"no-unused-vars"`.
	Text(String),
}

impl std::fmt::Display for DiagnosticCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::Text(s) => f.write_str(s),
		}
	}
}

/// A "Problem-like" diagnostic as reported by a compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedProblem {
	/// Human readable message.
	pub message: String,
	/// Start line, 1-based.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	/// Start column, 1-based.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
	/// End line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_line: Option<u32>,
	/// End column.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_column: Option<u32>,
	/// Diagnostic code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<DiagnosticCode>,
	/// Longer explanation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub explain: Option<String>,
	/// Severity spelling, when the compiler provides one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub severity: Option<String>,
}

impl ReportedProblem {
	/// Creates a message-only diagnostic.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			..Self::default()
		}
	}

	/// Sets the start position.
	#[must_use]
	pub fn at(mut self, line: u32, column: u32) -> Self {
		self.line = Some(line);
		self.column = Some(column);
		self
	}

	/// Converts into a [`Problem`] with `fallback` severity when none was reported.
	pub fn to_problem(&self, fallback: Severity) -> Problem {
		let severity = Severity::parse_or(self.severity.as_deref(), fallback);
		let line = self.line.unwrap_or(0);
		let column = self.column.unwrap_or(0);
		let mut problem = Problem::new(ProblemSource::Compiler, severity, self.message.clone())
			.at(line, column)
			.spanning(self.end_line.unwrap_or(line), self.end_column.unwrap_or(column));
		problem.code = self.code.as_ref().map(ToString::to_string);
		problem.explain = self.explain.clone();
		problem
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn request_wire_shape() {
		let request = CompileRequest {
			id: 3,
			payload: CompilePayload {
				language: "typescript".into(),
				code: "let x = 1".into(),
				mode: CompileMode::Bundle,
				source_map: true,
			},
		};
		assert_eq!(
			serde_json::to_value(&request).unwrap(),
			json!({"id": 3, "payload": {"language": "typescript", "code": "let x = 1", "mode": "bundle", "sourceMap": true}})
		);
	}

	#[test]
	fn responses_parse_by_type_tag() {
		let ok: CompileResponse = serde_json::from_value(json!({
			"id": 1,
			"type": "compile:result",
			"result": {"code": "console.log(1)", "errors": [{"message": "bad", "line": 2, "column": 5, "code": 1005}]},
		}))
		.unwrap();
		let CompileResponse::Result { id, result } = ok else {
			panic!("expected compile:result");
		};
		assert_eq!(id, 1);
		assert!(result.warnings.is_empty());
		let problems = result.error_problems();
		assert_eq!(problems[0].severity, Severity::Error);
		assert_eq!((problems[0].line, problems[0].column), (2, 5));
		assert_eq!(problems[0].code.as_deref(), Some("1005"));

		let err: CompileResponse = serde_json::from_value(json!({"id": 9, "type": "compile:error", "error": {"message": "boom"}})).unwrap();
		assert_eq!(err.id(), 9);
	}

	#[test]
	fn explicit_severity_wins_over_list() {
		let output = CompileOutput {
			code: String::new(),
			errors: Vec::new(),
			warnings: vec![ReportedProblem {
				severity: Some("error".into()),
				..ReportedProblem::new("promoted")
			}],
		};
		assert_eq!(output.warning_problems()[0].severity, Severity::Error);
	}

	#[test]
	fn end_position_defaults_to_start() {
		let problem = ReportedProblem::new("x").at(4, 2).to_problem(Severity::Warning);
		assert_eq!((problem.end_line, problem.end_column), (4, 2));
		assert_eq!(problem.source, ProblemSource::Compiler);
	}
}
