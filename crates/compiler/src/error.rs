/// A convenient type alias for `Result` with `E` = [`CompileError`].
pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Failures of the compile step itself, as opposed to diagnostics it reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
	/// The worker could not be reached or its channel closed mid-request.
	#[error("compile worker unreachable: {0}")]
	Transport(String),
	/// The worker answered with `compile:error`.
	#[error("{0}")]
	Worker(String),
	/// The request could not be encoded.
	#[error("failed to encode compile request: {0}")]
	Encode(String),
	/// The client was disposed before the response arrived.
	#[error("compiler client disposed")]
	Disposed,
}
