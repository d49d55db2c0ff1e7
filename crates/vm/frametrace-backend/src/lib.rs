//! Reference backend and host interpreter for frametrace.
//!
//! The `frametrace` crate traces code units into graphs and decides when a
//! compiled artifact may be reused; it does not know how to run anything.
//! This crate supplies a graph backend and the uninstrumented interpreter.
//!
//! # Architecture
//!
//! ```text
//! frametrace (tracing, guards, cache, frame gate)
//!   └── jit/dispatch: GraphBackend, Executable
//!
//! frametrace-backend (this crate)
//!   ├── backend   : graph validation and compilation
//!   ├── execution : node-by-node evaluation of compiled graphs
//!   └── host      : uninstrumented interpreter, the fallback path
//! ```

pub mod backend;
pub mod error;
pub mod execution;
pub mod host;

use std::sync::Arc;

pub use backend::{BackendConfig, EvalBackend};
pub use error::BackendError;
pub use execution::CompiledGraph;
pub use host::run_uninstrumented;

use frametrace::code::CodeUnit;
use frametrace::{EngineError, FrameGate, GateOutcome};
use frametrace::runtime::Frame;

/// Register an [`EvalBackend`] with `gate`.
///
/// Without a registered backend every call the gate sees runs
/// uninstrumented.
pub fn register_backend(gate: &FrameGate) {
    gate.register_backend(Arc::new(EvalBackend::new()));
    tracing::info!("Registered reference graph backend");
}

/// Route one call of `code` through `gate`, falling back to
/// [`run_uninstrumented`] whenever no artifact can serve it.
pub fn call_through(gate: &FrameGate, code: &CodeUnit, frame: &Frame) -> Result<GateOutcome, EngineError> {
    gate.call(code, frame, || run_uninstrumented(code, frame))
}

#[cfg(test)]
mod tests;
