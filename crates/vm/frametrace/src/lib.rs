//! # frametrace
//!
//! A speculative, guard-validated tracing front end for a stack-based
//! bytecode interpreter.
//!
//! ## Overview
//!
//! Intercepted calls are abstractly executed over symbolic values. Values
//! that are provably constant are folded away; array computations are
//! recorded into a dataflow graph. Every assumption the trace makes about
//! the live frame is recorded as a guard, and a compiled artifact is only
//! reused while all of its guards still hold. Anything the tracer cannot
//! express aborts the attempt and the call runs uninstrumented.
//!
//! ## Architecture
//!
//! ```text
//! call ──► FrameGate ──► guard lookup ──hit──► Executable::run
//!              │               │
//!              │              miss
//!              │               ▼
//!              │      SymbolicInterpreter ──► Graph + GuardSet
//!              │               │                     │
//!              │          GraphBreak          GraphBackend::compile
//!              │               ▼                     ▼
//!              └────────► run_original        ArtifactCache::append
//! ```
//!
//! ## Key Components
//!
//! - [`value::SymbolicValue`]: partially known runtime state
//! - [`guards::Guard`]: a checkable precondition on a frame binding
//! - [`interpreter::SymbolicInterpreter`]: abstract execution of a [`code::CodeUnit`]
//! - [`graph::Graph`]: the recorded dataflow graph
//! - [`jit::dispatch::FrameGate`]: cache lookup, tracing and fallback policy
//!
//! ## Usage
//!
//! ```ignore
//! let gate = FrameGate::with_config(EngineConfig::default());
//! gate.register_backend(Arc::new(EvalBackend::new()));
//!
//! let outcome = gate.call(&code, &frame, || run_uninstrumented(&code, &frame))?;
//! println!("{:?} -> {:?}", outcome.path, outcome.value);
//! ```

pub mod code;
pub mod errors;
pub mod graph;
pub mod guards;
pub mod interpreter;
pub mod jit;
pub mod runtime;
pub mod value;

pub use code::{CodeId, CodeUnit, Instruction, Opcode};
pub use errors::{BreakReason, EngineError, GraphBreak, HostError, ValueError};
pub use guards::{Guard, GuardCheck, GuardSet, GuardSource};
pub use jit::dispatch::{ExecutionPath, Executable, FallbackReason, FrameGate, GateOutcome, GraphBackend};
pub use jit::types::{EngineConfig, FrameStats};
pub use runtime::{Frame, LiveEnvironment, RuntimeValue};
pub use value::SymbolicValue;
