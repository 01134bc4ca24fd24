//! Compile worker host.

use async_trait::async_trait;
use playpen_worker::{MessagePort, TaskClass};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::protocol::{CompileOutput, CompilePayload, CompileRequest, CompileResponse, WorkerFailure};

/// A compiler hosted behind a message port.
///
/// Returning `Err` means the compiler itself failed; source errors belong in
/// [`CompileOutput::errors`].
#[async_trait]
pub trait Compiler: Send + 'static {
	/// Compiles one payload.
	async fn compile(&mut self, payload: CompilePayload) -> Result<CompileOutput, String>;
}

/// Serves compile requests arriving on `port` until the host end goes away.
///
/// Requests are handled one at a time, in arrival order. Messages that are not
/// valid requests are answered with `compile:error` when they carry an id and
/// dropped otherwise.
pub fn spawn_compile_worker<C>(port: MessagePort, compiler: C) -> JoinHandle<()>
where
	C: Compiler,
{
	playpen_worker::spawn(TaskClass::Background, serve(port, compiler))
}

async fn serve<C: Compiler>(mut port: MessagePort, mut compiler: C) {
	while let Some(message) = port.recv().await {
		let Some(response) = handle(&mut compiler, message).await else {
			continue;
		};
		let id = response.id();
		let encoded = match serde_json::to_value(&response) {
			Ok(encoded) => encoded,
			Err(error) => {
				warn!(id, %error, "compile_worker.encode_failed");
				continue;
			}
		};
		if port.post(encoded).is_err() {
			break;
		}
	}
	debug!("compile_worker.exit");
}

async fn handle<C: Compiler>(compiler: &mut C, message: Value) -> Option<CompileResponse> {
	let request = match serde_json::from_value::<CompileRequest>(message.clone()) {
		Ok(request) => request,
		Err(error) => {
			let id = message.get("id").and_then(Value::as_u64)?;
			debug!(id, %error, "compile_worker.request.malformed");
			return Some(CompileResponse::Error {
				id,
				error: WorkerFailure {
					message: format!("malformed compile request: {error}"),
				},
			});
		}
	};

	trace!(id = request.id, mode = ?request.payload.mode, "compile_worker.compile");
	let id = request.id;
	Some(match compiler.compile(request.payload).await {
		Ok(result) => CompileResponse::Result { id, result },
		Err(message) => CompileResponse::Error {
			id,
			error: WorkerFailure { message },
		},
	})
}

#[cfg(test)]
mod tests {
	use playpen_worker::message_channel;
	use serde_json::json;

	use super::*;
	use crate::protocol::{CompileMode, ReportedProblem};
	use crate::{CompileError, CompilerClient};

	/// Reports an error for sources containing `!!`, fails outright on `crash`.
	struct ToyCompiler;

	#[async_trait]
	impl Compiler for ToyCompiler {
		async fn compile(&mut self, payload: CompilePayload) -> Result<CompileOutput, String> {
			if payload.code.contains("crash") {
				return Err("compiler crashed".into());
			}
			let errors = payload
				.code
				.lines()
				.enumerate()
				.filter_map(|(i, line)| line.find("!!").map(|col| ReportedProblem::new("unexpected token").at(i as u32 + 1, col as u32 + 1)))
				.collect();
			Ok(CompileOutput {
				code: payload.code,
				errors,
				warnings: Vec::new(),
			})
		}
	}

	fn payload(code: &str) -> CompilePayload {
		CompilePayload {
			language: "typescript".into(),
			code: code.into(),
			mode: CompileMode::Transpile,
			source_map: false,
		}
	}

	#[tokio::test]
	async fn client_and_worker_round_trip() {
		let (host, worker) = message_channel();
		let _worker = spawn_compile_worker(worker, ToyCompiler);
		let client = CompilerClient::connect(host);

		let output = client.compile(payload("let a = 1;\nlet b = !!;")).await.unwrap();
		let errors = output.error_problems();
		assert_eq!(errors.len(), 1);
		assert_eq!((errors[0].line, errors[0].column), (2, 9));

		let failure = client.compile(payload("crash")).await;
		assert_eq!(failure, Err(CompileError::Worker("compiler crashed".into())));
	}

	#[tokio::test]
	async fn malformed_requests_with_id_get_an_error() {
		let (mut host, worker) = message_channel();
		let _worker = spawn_compile_worker(worker, ToyCompiler);

		host.post(json!({"id": 4, "payload": {"code": 1}})).unwrap();
		host.post(json!({"no": "id"})).unwrap();
		host.post(json!({"id": 5, "payload": {"language": "typescript", "code": "ok", "mode": "bundle"}})).unwrap();

		let first: CompileResponse = serde_json::from_value(host.recv().await.unwrap()).unwrap();
		assert!(matches!(first, CompileResponse::Error { id: 4, .. }));
		let second: CompileResponse = serde_json::from_value(host.recv().await.unwrap()).unwrap();
		assert!(matches!(second, CompileResponse::Result { id: 5, .. }));
	}
}
