//! A tiny line-oriented script engine for tests and demos.
//!
//! One statement per line:
//!
//! | statement        | effect                                             |
//! |------------------|----------------------------------------------------|
//! | `log <text>`     | `console.log(text)`; also `info`, `warn`, `error`  |
//! | `throw <msg>`    | uncaught error at this line                        |
//! | `reject <msg>`   | unhandled rejection; the run carries on            |
//! | `sleep <ms>`     | awaits a timer                                     |
//! | `panic`          | the engine itself panics                           |
//!
//! Blank lines and `//` comments are skipped. Anything else is a reference error.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::guest::{RunScope, ScriptEngine, ScriptError};
use crate::protocol::{ConsoleLevel, RuntimeErrorReport};

#[derive(Debug, Clone, Copy, Default)]
pub struct LineScriptEngine;

#[async_trait]
impl ScriptEngine for LineScriptEngine {
	async fn execute(&self, code: String, scope: RunScope) -> Result<(), ScriptError> {
		for (index, line) in code.lines().enumerate() {
			let lineno = index as u32 + 1;
			let line = line.trim();
			if line.is_empty() || line.starts_with("//") {
				continue;
			}
			let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
			let level = match word {
				"log" => Some(ConsoleLevel::Log),
				"info" => Some(ConsoleLevel::Info),
				"warn" => Some(ConsoleLevel::Warn),
				"error" => Some(ConsoleLevel::Error),
				_ => None,
			};
			if let Some(level) = level {
				scope.console(level, vec![Value::String(rest.to_string())]);
				continue;
			}
			match word {
				"throw" => return Err(ScriptError::new(rest).at(lineno, 1)),
				"reject" => scope.report_error(RuntimeErrorReport::new(format!("Unhandled rejection: {rest}")).at(lineno, 1)),
				"sleep" => {
					let ms = rest.trim().parse().map_err(|_| ScriptError::new(format!("TypeError: invalid delay {rest:?}")).at(lineno, 7))?;
					tokio::time::sleep(Duration::from_millis(ms)).await;
				}
				"panic" => panic!("line script engine asked to panic"),
				other => return Err(ScriptError::new(format!("ReferenceError: {other} is not defined")).at(lineno, 1)),
			}
		}
		Ok(())
	}
}
