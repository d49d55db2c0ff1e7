//! Error types for the reference backend.

use frametrace::HostError;
use frametrace::graph::NodeId;

/// Errors raised while validating or evaluating a graph.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The graph has no trailing output node.
    #[error("graph has no output node")]
    MissingOutput,

    /// A node reads a node that is not computed before it.
    #[error("node {node} reads {operand} before it is computed")]
    ForwardReference {
        /// The reading node.
        node: NodeId,
        /// The operand it reads.
        operand: NodeId,
    },

    /// A node whose operands do not fit its operation.
    #[error("malformed node {node}: {reason}")]
    MalformedNode {
        /// The offending node.
        node: NodeId,
        /// What is wrong with it.
        reason: String,
    },

    /// The graph has more nodes than the backend accepts.
    #[error("graph too large: {nodes} nodes (max {max})")]
    GraphTooLarge {
        /// Actual node count.
        nodes: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A `call_module` target is not in the module table.
    #[error("unknown module `{0}`")]
    UnknownModule(String),

    /// A `get_attr` target does not resolve to a module member.
    #[error("unresolved parameter `{0}`")]
    UnresolvedParameter(String),

    /// The artifact was run with the wrong number of inputs.
    #[error("expected {expected} inputs, got {got}")]
    InputArity {
        /// Number of placeholders in the graph.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// A slice bound evaluated to something other than an int or None.
    #[error("slice bound must be an int or None, got {0}")]
    BadSliceBound(String),

    /// A host operation failed while evaluating a node.
    #[error(transparent)]
    Host(#[from] HostError),
}
