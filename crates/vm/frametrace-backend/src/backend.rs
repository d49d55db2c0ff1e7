//! Reference graph backend.
//!
//! Validates a traced graph and turns it into a [`CompiledGraph`] that
//! evaluates node by node with the host operations. It makes no attempt at
//! optimization; it exists so the frame gate can be exercised end to end and
//! as the baseline other backends are checked against.

use std::sync::Arc;

use frametrace::graph::{Graph, ModuleTable, NodeOp};
use frametrace::{Executable, GraphBackend};
use rustc_hash::FxHashMap;

use crate::error::BackendError;
use crate::execution::CompiledGraph;

/// Default limit on graph size.
pub const DEFAULT_MAX_GRAPH_NODES: usize = 4096;

/// Configuration for [`EvalBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Graphs with more nodes than this are rejected.
    pub max_graph_nodes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_graph_nodes: DEFAULT_MAX_GRAPH_NODES,
        }
    }
}

/// Backend that evaluates graphs directly over runtime values.
#[derive(Debug, Default)]
pub struct EvalBackend {
    config: BackendConfig,
}

impl EvalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Validate `graph` against `modules` and bind it for execution.
    ///
    /// Rejects graphs without an output, nodes that read operands recorded
    /// after them, module calls with no table entry and parameter reads that
    /// do not resolve.
    pub fn compile_graph(&self, graph: &Graph, modules: &ModuleTable) -> Result<CompiledGraph, BackendError> {
        let node_count = graph.nodes().len();
        if node_count > self.config.max_graph_nodes {
            return Err(BackendError::GraphTooLarge {
                nodes: node_count,
                max: self.config.max_graph_nodes,
            });
        }
        if graph.output().is_none() {
            return Err(BackendError::MissingOutput);
        }

        let mut parameters = FxHashMap::default();
        for node in graph.nodes() {
            for operand in node.args.iter().flat_map(|arg| arg.nodes()) {
                if operand >= node.id {
                    return Err(BackendError::ForwardReference { node: node.id, operand });
                }
            }
            match &node.op {
                NodeOp::GetAttr { target } => {
                    let value = modules
                        .resolve_attr(target)
                        .ok_or_else(|| BackendError::UnresolvedParameter(target.clone()))?;
                    parameters.insert(node.id, value);
                }
                NodeOp::CallModule { target } if !modules.contains(target) => {
                    return Err(BackendError::UnknownModule(target.clone()));
                }
                NodeOp::Attribute { .. } if node.args.len() != 1 => {
                    return Err(BackendError::MalformedNode {
                        node: node.id,
                        reason: format!("attribute read takes 1 operand, got {}", node.args.len()),
                    });
                }
                _ => {}
            }
        }

        tracing::info!(
            nodes = node_count,
            ops = graph.op_count(),
            inputs = graph.placeholders().len(),
            parameters = parameters.len(),
            "Compiled graph"
        );
        Ok(CompiledGraph::new(graph, modules.clone(), parameters))
    }
}

impl GraphBackend for EvalBackend {
    fn compile(&self, graph: &Graph, modules: &ModuleTable) -> Result<Arc<dyn Executable>, String> {
        let compiled = self.compile_graph(graph, modules).map_err(|err| err.to_string())?;
        Ok(Arc::new(compiled))
    }
}
