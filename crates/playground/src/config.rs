//! Playground configuration.
//!
//! ```toml
//! language = "typescript"
//! compile_mode = "bundle"
//! debounce_ms = 200
//! run_on_change = true
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use playpen_compiler::CompileMode;
use serde::Deserialize;

/// Errors loading a [`PlaygroundConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundConfig {
	/// Source language passed to the compiler.
	pub language: String,
	pub compile_mode: CompileMode,
	pub source_map: bool,
	/// Quiescence window for blur and change triggers.
	pub debounce_ms: u64,
	/// Run once as soon as the playground is assembled.
	pub run_on_init: bool,
	/// Run (debounced) on every content change, not only on blur.
	pub run_on_change: bool,
	/// Capacity of the sandbox event broadcast.
	pub event_buffer: usize,
	/// Console entries retained; the oldest are dropped first.
	pub console_limit: usize,
}

impl Default for PlaygroundConfig {
	fn default() -> Self {
		Self {
			language: "typescript".into(),
			compile_mode: CompileMode::Transpile,
			source_map: false,
			debounce_ms: 350,
			run_on_init: true,
			run_on_change: false,
			event_buffer: 256,
			console_limit: 500,
		}
	}
}

impl PlaygroundConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_input_yields_defaults() {
		assert_eq!(PlaygroundConfig::from_toml_str("").unwrap(), PlaygroundConfig::default());
	}

	#[test]
	fn fields_override_defaults() {
		let config = PlaygroundConfig::from_toml_str(
			r#"
			language = "javascript"
			compile_mode = "bundle"
			debounce_ms = 50
			run_on_change = true
			"#,
		)
		.unwrap();
		assert_eq!(config.language, "javascript");
		assert_eq!(config.compile_mode, CompileMode::Bundle);
		assert_eq!(config.debounce(), Duration::from_millis(50));
		assert!(config.run_on_change);
		assert!(config.run_on_init);
		assert_eq!(config.console_limit, 500);
	}

	#[test]
	fn unknown_fields_and_bad_types_are_rejected() {
		assert!(matches!(PlaygroundConfig::from_toml_str("debounce = 3"), Err(ConfigError::Toml(_))));
		assert!(matches!(PlaygroundConfig::from_toml_str("debounce_ms = \"soon\""), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn load_reads_from_disk() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("playpen.toml");
		std::fs::write(&path, "source_map = true\n").unwrap();
		assert!(PlaygroundConfig::load(&path).unwrap().source_map);

		let missing = PlaygroundConfig::load(dir.path().join("missing.toml"));
		assert!(matches!(missing, Err(ConfigError::Io { .. })));
	}
}
