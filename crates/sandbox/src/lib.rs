//! Sandboxed execution.
//!
//! Scripts run in an isolated realm that shares no objects with the host. The
//! two sides talk only through structured messages tagged with a per-instance
//! [`ChannelId`]:
//!
//! * [`SandboxBridge`]: host side; readiness gate, `run`, event forwarding
//! * [`spawn_guest`]: sandbox side; console instrumentation, error capture, run lifecycle
//! * [`SandboxLauncher`]: creates the isolated realm and hands back its port
//!
//! For one run the guest emits `run-start`, any number of `console` and
//! `runtime-error` events, then exactly one of `run-success` or `run-fail`.

mod bridge;
mod error;
mod guest;
mod launcher;
pub mod protocol;
pub mod testing;

pub use bridge::SandboxBridge;
pub use error::{RunError, SandboxError};
pub use guest::{RunScope, ScriptEngine, ScriptError, spawn_guest};
pub use launcher::{InProcessSandbox, SandboxLauncher};
pub use protocol::{ChannelId, ConsoleEntry, ConsoleLevel, HostCommand, RunFailure, RuntimeErrorReport, SandboxEvent};
