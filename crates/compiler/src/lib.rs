//! Compile step plumbing.
//!
//! The compiler lives on the far side of a [`MessagePort`](playpen_worker::MessagePort)
//! and is reached only through the request/response protocol in [`protocol`]:
//!
//! * [`CompilerClient`]: assigns request ids, correlates responses, drops unsolicited ones
//! * [`spawn_compile_worker`]: hosts any [`Compiler`] behind a port
//! * [`ReportedProblem`]: the loosely-typed diagnostics a compiler reports

#![warn(missing_docs)]

mod client;
mod error;
pub mod protocol;
mod worker;

pub use client::CompilerClient;
pub use error::{CompileError, Result};
pub use protocol::{CompileMode, CompileOutput, CompilePayload, CompileRequest, CompileResponse, ReportedProblem};
pub use worker::{Compiler, spawn_compile_worker};
