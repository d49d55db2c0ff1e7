//! Evaluation of compiled graphs over concrete values.
//!
//! Nodes are evaluated in recorded order, which is a topological order, so
//! every operand is available by the time a node reads it. Module calls and
//! parameter reads go through the [`ModuleTable`] captured at compile time;
//! the live frame is only consulted for placeholder inputs.

use std::collections::BTreeMap;

use frametrace::Executable;
use frametrace::graph::{Arg, Graph, ModuleTable, Node, NodeId, NodeOp};
use frametrace::runtime::{RuntimeValue, SliceValue};
use rustc_hash::FxHashMap;

use crate::error::BackendError;

/// A validated graph bound to the modules and parameters it reads.
#[derive(Debug)]
pub struct CompiledGraph {
    nodes: Vec<Node>,
    modules: ModuleTable,
    /// Parameter values for each `get_attr` node, resolved at compile time.
    parameters: FxHashMap<NodeId, RuntimeValue>,
    input_count: usize,
}

impl CompiledGraph {
    pub(crate) fn new(graph: &Graph, modules: ModuleTable, parameters: FxHashMap<NodeId, RuntimeValue>) -> Self {
        Self {
            nodes: graph.nodes().to_vec(),
            modules,
            parameters,
            input_count: graph.placeholders().len(),
        }
    }

    /// Number of positional inputs the graph expects.
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn execute(&self, inputs: &[RuntimeValue]) -> Result<RuntimeValue, BackendError> {
        if inputs.len() != self.input_count {
            return Err(BackendError::InputArity {
                expected: self.input_count,
                got: inputs.len(),
            });
        }
        let mut inputs = inputs.iter();
        let mut values: FxHashMap<NodeId, RuntimeValue> = FxHashMap::default();

        for node in &self.nodes {
            let value = match &node.op {
                NodeOp::Placeholder { .. } => inputs.next().cloned().ok_or(BackendError::InputArity {
                    expected: self.input_count,
                    got: values.len(),
                })?,
                NodeOp::GetAttr { target } => self
                    .parameters
                    .get(&node.id)
                    .cloned()
                    .ok_or_else(|| BackendError::UnresolvedParameter(target.clone()))?,
                NodeOp::CallFunction { target } | NodeOp::CallMethod { method: target } => {
                    target.call(&operands(node, &values)?)?
                }
                NodeOp::CallModule { target } => {
                    let module = self
                        .modules
                        .get(target)
                        .ok_or_else(|| BackendError::UnknownModule(target.clone()))?;
                    module.forward(&operands(node, &values)?)?
                }
                NodeOp::Attribute { name } => match operands(node, &values)?.as_slice() {
                    [base] => base.get_attr(name)?,
                    other => {
                        return Err(BackendError::MalformedNode {
                            node: node.id,
                            reason: format!("attribute read takes 1 operand, got {}", other.len()),
                        });
                    }
                },
                NodeOp::Output => {
                    return match operands(node, &values)?.into_iter().next() {
                        Some(result) => Ok(result),
                        None => Err(BackendError::MissingOutput),
                    };
                }
            };
            values.insert(node.id, value);
        }
        Err(BackendError::MissingOutput)
    }
}

impl Executable for CompiledGraph {
    fn run(&self, inputs: &[RuntimeValue]) -> Result<RuntimeValue, String> {
        self.execute(inputs).map_err(|err| err.to_string())
    }
}

fn operands(node: &Node, values: &FxHashMap<NodeId, RuntimeValue>) -> Result<Vec<RuntimeValue>, BackendError> {
    node.args.iter().map(|arg| evaluate(arg, node.id, values)).collect()
}

fn evaluate(arg: &Arg, reader: NodeId, values: &FxHashMap<NodeId, RuntimeValue>) -> Result<RuntimeValue, BackendError> {
    let each = |items: &[Arg]| {
        items
            .iter()
            .map(|item| evaluate(item, reader, values))
            .collect::<Result<Vec<_>, _>>()
    };
    match arg {
        Arg::Node(id) => values.get(id).cloned().ok_or(BackendError::ForwardReference {
            node: reader,
            operand: *id,
        }),
        Arg::Const(literal) => Ok(literal.to_runtime()),
        Arg::Tuple(items) => each(items).map(RuntimeValue::Tuple),
        Arg::List(items) => each(items).map(RuntimeValue::List),
        Arg::Dict(entries) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), evaluate(item, reader, values)?)))
            .collect::<Result<BTreeMap<_, _>, BackendError>>()
            .map(RuntimeValue::Dict),
        Arg::Slice(parts) => {
            let [start, stop, step] = &**parts;
            Ok(RuntimeValue::Slice(SliceValue {
                start: slice_bound(evaluate(start, reader, values)?)?,
                stop: slice_bound(evaluate(stop, reader, values)?)?,
                step: slice_bound(evaluate(step, reader, values)?)?,
            }))
        }
    }
}

fn slice_bound(value: RuntimeValue) -> Result<Option<i64>, BackendError> {
    match value {
        RuntimeValue::None => Ok(None),
        RuntimeValue::Int(i) => Ok(Some(i)),
        RuntimeValue::Bool(b) => Ok(Some(i64::from(b))),
        other => Err(BackendError::BadSliceBound(other.type_tag().to_string())),
    }
}
