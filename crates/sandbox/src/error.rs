/// Failures creating the isolated realm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SandboxError {
	/// The launcher could not create the realm.
	#[error("failed to launch sandbox: {0}")]
	Launch(String),
}

/// Why a [`SandboxBridge::run`](crate::SandboxBridge::run) call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
	/// The script threw or rejected; the guest reported `run-fail`.
	#[error("{0}")]
	Failed(String),
	/// The guest went away before reporting an outcome.
	#[error("sandbox disconnected")]
	Disconnected,
	/// The bridge was disposed.
	#[error("sandbox disposed")]
	Disposed,
	/// The run command could not be encoded.
	#[error("failed to encode run command: {0}")]
	Encode(String),
}
