//! Wire format between the host and the sandbox.
//!
//! Host to sandbox: `{channel, type: "run", code, runId}`.
//!
//! Sandbox to host: `{channel, type, payload}` where `type` is one of
//! `sandbox-ready`, `console-clear`, `console`, `run-start`, `run-success`,
//! `run-fail` or `runtime-error`.
//!
//! `runId` is echoed in the `run-start`, `run-success`, `run-fail`, `console`
//! and `runtime-error` payloads so the host can settle the right pending run
//! and tell a superseded run's output from the current one. Terminal events
//! without it settle the most recent run.

use std::fmt;

use playpen_primitives::{Problem, ProblemSource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Per-instance tag on every message, so one sandbox never reacts to traffic
/// meant for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
	/// Generates a fresh random channel id.
	pub fn random() -> Self {
		Self(format!("playpen-{}", uuid::Uuid::new_v4().simple()))
	}

	/// Wraps an existing id.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Commands sent from the host to the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostCommand {
	/// Execute `code` in the sandbox realm.
	Run {
		channel: ChannelId,
		code: String,
		#[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
		run_id: Option<String>,
	},
}

impl HostCommand {
	pub fn channel(&self) -> &ChannelId {
		match self {
			Self::Run { channel, .. } => channel,
		}
	}
}

/// Console method the sandboxed code called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
	Log,
	Info,
	Warn,
	Error,
}

impl ConsoleLevel {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Log => "log",
			Self::Info => "info",
			Self::Warn => "warn",
			Self::Error => "error",
		}
	}
}

/// One console call, with its arguments already serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
	pub level: ConsoleLevel,
	#[serde(default)]
	pub args: Vec<Value>,
	/// Run that made the call.
	#[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
	pub run_id: Option<String>,
}

impl ConsoleEntry {
	pub fn new(level: ConsoleLevel, args: Vec<Value>) -> Self {
		Self { level, args, run_id: None }
	}

	#[must_use]
	pub fn for_run(mut self, run_id: impl Into<String>) -> Self {
		self.run_id = Some(run_id.into());
		self
	}

	/// Arguments joined by spaces; strings are shown without quotes.
	pub fn text(&self) -> String {
		self.args
			.iter()
			.map(|arg| match arg {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.collect::<Vec<_>>()
			.join(" ")
	}
}

/// An uncaught error or unhandled rejection raised inside the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeErrorReport {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	/// Run that raised the error.
	#[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
	pub run_id: Option<String>,
}

impl RuntimeErrorReport {
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

	#[must_use]
	pub fn for_run(mut self, run_id: impl Into<String>) -> Self {
		self.run_id = Some(run_id.into());
		self
	}

	/// Converts into an error [`Problem`]; missing positions become 0.
	pub fn to_problem(&self) -> Problem {
		let mut problem = Problem::error(ProblemSource::Runtime, self.message.clone()).at(self.lineno.unwrap_or(0), self.colno.unwrap_or(0));
		problem.explain = self.stack.clone();
		problem
	}
}

/// Payload of `run-fail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
	#[serde(default)]
	pub message: String,
}

/// Events emitted by the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxEvent {
	/// The realm finished initializing. Emitted once per instance.
	Ready,
	/// A new run is starting; drop console output from earlier runs.
	ConsoleClear,
	Console(ConsoleEntry),
	RunStart { run_id: Option<String> },
	RunSuccess { run_id: Option<String> },
	RunFail { run_id: Option<String>, failure: RunFailure },
	RuntimeError(RuntimeErrorReport),
}

impl SandboxEvent {
	/// Wire name of the event.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Ready => "sandbox-ready",
			Self::ConsoleClear => "console-clear",
			Self::Console(_) => "console",
			Self::RunStart { .. } => "run-start",
			Self::RunSuccess { .. } => "run-success",
			Self::RunFail { .. } => "run-fail",
			Self::RuntimeError(_) => "runtime-error",
		}
	}

	/// Run the event belongs to, when the guest tagged it.
	pub fn run_id(&self) -> Option<&str> {
		match self {
			Self::Ready | Self::ConsoleClear => None,
			Self::Console(entry) => entry.run_id.as_deref(),
			Self::RuntimeError(report) => report.run_id.as_deref(),
			Self::RunStart { run_id } | Self::RunSuccess { run_id } | Self::RunFail { run_id, .. } => run_id.as_deref(),
		}
	}

	/// Returns true for `run-success` and `run-fail`.
	pub const fn is_terminal(&self) -> bool {
		matches!(self, Self::RunSuccess { .. } | Self::RunFail { .. })
	}
}

/// Message the guest posts: an event tagged with the channel it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestMessage {
	pub channel: ChannelId,
	pub event: SandboxEvent,
}

#[derive(Serialize, Deserialize)]
struct RawGuestMessage {
	channel: ChannelId,
	#[serde(rename = "type")]
	kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	payload: Option<Value>,
}

#[derive(Default, Serialize, Deserialize)]
struct RunRef {
	#[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
	run_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RunFailRef {
	#[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
	run_id: Option<String>,
	#[serde(flatten)]
	failure: RunFailure,
}

/// Reasons a message could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
	#[error("malformed message: {0}")]
	Malformed(String),
	#[error("unknown message type {0:?}")]
	UnknownType(String),
}

fn payload<T: serde::de::DeserializeOwned + Default>(payload: Option<Value>) -> Result<T, DecodeError> {
	match payload {
		None | Some(Value::Null) => Ok(T::default()),
		Some(value) => serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string())),
	}
}

impl GuestMessage {
	pub fn new(channel: ChannelId, event: SandboxEvent) -> Self {
		Self { channel, event }
	}

	/// Serializes into the wire shape.
	pub fn encode(&self) -> Value {
		let payload = match &self.event {
			SandboxEvent::Ready | SandboxEvent::ConsoleClear => None,
			SandboxEvent::Console(entry) => Some(json!(entry)),
			SandboxEvent::RunStart { run_id } | SandboxEvent::RunSuccess { run_id } => Some(json!(RunRef { run_id: run_id.clone() })),
			SandboxEvent::RunFail { run_id, failure } => Some(json!(RunFailRef {
				run_id: run_id.clone(),
				failure: failure.clone(),
			})),
			SandboxEvent::RuntimeError(report) => Some(json!(report)),
		};
		json!(RawGuestMessage {
			channel: self.channel.clone(),
			kind: self.event.kind().to_string(),
			payload,
		})
	}

	/// Parses the wire shape.
	pub fn decode(message: Value) -> Result<Self, DecodeError> {
		let raw: RawGuestMessage = serde_json::from_value(message).map_err(|e| DecodeError::Malformed(e.to_string()))?;
		let event = match raw.kind.as_str() {
			"sandbox-ready" => SandboxEvent::Ready,
			"console-clear" => SandboxEvent::ConsoleClear,
			"console" => {
				let value = raw.payload.ok_or_else(|| DecodeError::Malformed("console without payload".into()))?;
				SandboxEvent::Console(serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?)
			}
			"run-start" => SandboxEvent::RunStart {
				run_id: payload::<RunRef>(raw.payload)?.run_id,
			},
			"run-success" => SandboxEvent::RunSuccess {
				run_id: payload::<RunRef>(raw.payload)?.run_id,
			},
			"run-fail" => {
				let RunFailRef { run_id, failure } = match raw.payload {
					None | Some(Value::Null) => RunFailRef {
						run_id: None,
						failure: RunFailure::default(),
					},
					Some(value) => serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?,
				};
				SandboxEvent::RunFail { run_id, failure }
			}
			"runtime-error" => {
				let value = raw.payload.ok_or_else(|| DecodeError::Malformed("runtime-error without payload".into()))?;
				SandboxEvent::RuntimeError(serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?)
			}
			other => return Err(DecodeError::UnknownType(other.to_string())),
		};
		Ok(Self { channel: raw.channel, event })
	}
}
