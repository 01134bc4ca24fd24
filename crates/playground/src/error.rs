use playpen_sandbox::SandboxError;

/// Failures assembling a [`Playground`](crate::Playground).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlaygroundError {
	#[error(transparent)]
	Sandbox(#[from] SandboxError),
}
