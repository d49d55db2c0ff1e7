//! Error types for tracing, guard validation and the host runtime model.

use crate::code::Opcode;

/// Recoverable signals raised inside the symbolic value model.
///
/// These drive branching ("try to constant-fold, else emit a graph node")
/// and are never surfaced to callers of the frame gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The value is not fully known at trace time.
    #[error("not a constant: {0}")]
    NotConstant(String),
    /// The value has neither a local nor a global binding.
    #[error("no guard possible for {0}")]
    NoGuardPossible(String),
    /// A nested attribute could not be proven to be a compile-time literal.
    #[error("attribute `{name}` is not constant: {reason}")]
    AttributeNotConstant { name: String, reason: String },
    /// The value cannot participate in the dataflow graph.
    #[error("cannot be represented as a graph node: {0}")]
    NotANode(String),
    /// The runtime type of the value is not known.
    #[error("type of {0} is not known")]
    UnknownType(String),
}

/// Why a trace attempt was abandoned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakReason {
    /// A capability was requested from a value that does not implement it.
    #[error(transparent)]
    Value(#[from] ValueError),
    /// Constant folding raised in the host runtime; the original code must raise it.
    #[error("host error during constant folding: {0}")]
    Host(#[from] HostError),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("data-dependent branch on {0}")]
    DataDependentBranch(String),
    #[error("non-constant index into {0}")]
    NonConstantIndex(String),
    #[error("call to {0} is not inlined")]
    UserCall(String),
    #[error("name `{0}` is not bound")]
    UnboundName(String),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("instruction operand {0} out of range")]
    BadOperand(u32),
    #[error("fell off the end of the instruction stream")]
    MissingReturn,
}

/// Aborts the current trace attempt; the call falls back to uninstrumented execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("graph break at {pc}{}: {reason}", opcode.map(|op| format!(" ({op})")).unwrap_or_default())]
pub struct GraphBreak {
    /// Index of the instruction that broke the trace.
    pub pc: usize,
    /// Opcode at `pc`, when the break happened inside a handler.
    pub opcode: Option<Opcode>,
    pub reason: BreakReason,
}

/// Errors raised by the host runtime model.
///
/// These mirror the exceptions the interpreted code would raise when run
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("AttributeError: {0}")]
    Attribute(String),
    #[error("NameError: name '{0}' is not defined")]
    Name(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("OverflowError: {0}")]
    Overflow(String),
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    /// Malformed code: a missing operand, stack underflow or runaway recursion.
    #[error("SystemError: {0}")]
    System(String),
}

/// Errors propagated to callers of the frame gate.
///
/// Correctness failures never show up here: the gate degrades to the
/// uninstrumented path instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The uninstrumented path raised; the interpreted code itself failed.
    #[error(transparent)]
    Host(#[from] HostError),
}
