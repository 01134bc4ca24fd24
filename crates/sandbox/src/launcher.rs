use std::sync::Arc;

use playpen_worker::{MessagePort, message_channel};

use crate::guest::{ScriptEngine, spawn_guest};
use crate::protocol::ChannelId;
use crate::SandboxError;

/// Creates isolated realms.
///
/// The returned port is the host's end; the realm must address every message
/// it posts with `channel` and ignore commands carrying any other id.
pub trait SandboxLauncher: Send + Sync {
	fn launch(&self, channel: &ChannelId) -> Result<MessagePort, SandboxError>;
}

/// Runs the guest driver as a task in this process.
///
/// Isolation comes from the port: the engine only ever sees serialized
/// messages and the host never sees the engine.
#[derive(Clone)]
pub struct InProcessSandbox {
	engine: Arc<dyn ScriptEngine>,
}

impl InProcessSandbox {
	pub fn new(engine: impl ScriptEngine) -> Self {
		Self { engine: Arc::new(engine) }
	}
}

impl std::fmt::Debug for InProcessSandbox {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InProcessSandbox").finish_non_exhaustive()
	}
}

impl SandboxLauncher for InProcessSandbox {
	fn launch(&self, channel: &ChannelId) -> Result<MessagePort, SandboxError> {
		let (host, guest) = message_channel();
		let _guest = spawn_guest(guest, channel.clone(), Arc::clone(&self.engine));
		Ok(host)
	}
}
