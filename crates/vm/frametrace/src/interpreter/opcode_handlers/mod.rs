pub mod arithmetic;
pub mod attribute;
pub mod calls;
pub mod containers;
pub mod control;
pub mod load_store;

use crate::errors::BreakReason;
use crate::graph::{Arg, NodeId};
use crate::runtime::{DType, HostFn};
use crate::value::{ArrayMeta, Literal, SymbolicValue, ValueKind, propagate};

use super::SymbolicInterpreter;

/// Values that can feed a graph node without being constant.
pub(crate) fn is_graph_operand(value: &SymbolicValue) -> bool {
    match value.kind() {
        ValueKind::NumericArray(_) | ValueKind::Scalar(_) => true,
        ValueKind::GetAttr { obj, .. } => is_graph_operand(obj),
        _ => false,
    }
}

/// Metadata an operand contributes to a node result.
fn operand_meta(value: &SymbolicValue, node: NodeId) -> ArrayMeta {
    match value.kind() {
        ValueKind::NumericArray(meta) | ValueKind::Scalar(meta) => meta.clone(),
        ValueKind::Constant(literal) => match literal {
            Literal::Int(_) => ArrayMeta::scalar(node, Some(DType::Int64)),
            Literal::Float(_) => ArrayMeta::scalar(node, Some(DType::Float64)),
            Literal::Bool(_) => ArrayMeta::scalar(node, Some(DType::Bool)),
            _ => ArrayMeta::unknown(node),
        },
        _ => ArrayMeta::unknown(node),
    }
}

fn is_scalar_like(value: &SymbolicValue) -> bool {
    matches!(value.kind(), ValueKind::Scalar(_) | ValueKind::Constant(_))
}

/// Kind of the value produced by node `node` computing `op` over `operands`.
/// For methods the receiver is the first operand.
pub(crate) fn node_result(node: NodeId, op: HostFn, operands: &[SymbolicValue]) -> ValueKind {
    let metas: Vec<_> = operands.iter().map(|operand| operand_meta(operand, node)).collect();
    let first = metas.first();
    match op {
        HostFn::Sum => ValueKind::NumericArray(first.map_or_else(|| ArrayMeta::unknown(node), |meta| ArrayMeta::reduced(node, meta))),
        HostFn::Dim => ValueKind::Scalar(ArrayMeta::scalar(node, Some(DType::Int64))),
        HostFn::Size | HostFn::Stride if operands.len() > 1 => {
            ValueKind::Scalar(ArrayMeta::scalar(node, Some(DType::Int64)))
        }
        HostFn::Size | HostFn::Stride => ValueKind::Scalar(ArrayMeta::unknown(node)),
        HostFn::GetItem => match (operands.first().map(SymbolicValue::kind), operands.get(1).map(SymbolicValue::kind)) {
            (Some(ValueKind::NumericArray(meta)), Some(ValueKind::Constant(Literal::Int(_) | Literal::Bool(_)))) => {
                ValueKind::NumericArray(ArrayMeta::selected(node, meta))
            }
            (Some(ValueKind::NumericArray(meta)), _) => ValueKind::NumericArray(ArrayMeta {
                dtype: meta.dtype,
                device: meta.device,
                ..ArrayMeta::unknown(node)
            }),
            _ => ValueKind::Scalar(ArrayMeta::unknown(node)),
        },
        _ => {
            let meta = ArrayMeta::broadcast(node, op, first, metas.get(1));
            if operands.iter().all(is_scalar_like) {
                ValueKind::Scalar(meta)
            } else {
                ValueKind::NumericArray(meta)
            }
        }
    }
}

impl SymbolicInterpreter<'_> {
    fn dataflow_args(&mut self, values: &[SymbolicValue]) -> Result<Vec<Arg>, BreakReason> {
        values
            .iter()
            .map(|value| value.as_dataflow_node(&mut self.graph).map_err(BreakReason::from))
            .collect()
    }

    /// Emits a `call_function` node over `operands`.
    pub(crate) fn emit_function(&mut self, op: HostFn, operands: &[SymbolicValue]) -> Result<SymbolicValue, BreakReason> {
        let args = self.dataflow_args(operands)?;
        let node = self.graph.call_function(op, args);
        Ok(SymbolicValue::derived(node_result(node, op, operands), propagate(operands)))
    }

    /// Emits a `call_method` node on `receiver`.
    pub(crate) fn emit_method(
        &mut self,
        op: HostFn,
        receiver: &SymbolicValue,
        args: &[SymbolicValue],
    ) -> Result<SymbolicValue, BreakReason> {
        let Arg::Node(receiver_node) = receiver.as_dataflow_node(&mut self.graph)? else {
            return Err(BreakReason::Unsupported(format!("method {op} on {receiver}")));
        };
        let call_args = self.dataflow_args(args)?;
        let node = self.graph.call_method(op, receiver_node, call_args);
        let operands: Vec<_> = std::iter::once(receiver).chain(args).cloned().collect();
        Ok(SymbolicValue::derived(node_result(node, op, &operands), propagate(&operands)))
    }
}

impl<'a> SymbolicInterpreter<'a> {
    /// Name operand of an attribute or global instruction.
    pub(crate) fn name_operand(&self, arg: u32) -> Result<&'a str, BreakReason> {
        let code: &'a crate::code::CodeUnit = self.code;
        code.name_at(arg).ok_or(BreakReason::BadOperand(arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::runtime::ArrayValue;

    #[test]
    fn scalar_results_stay_scalar() {
        let mut graph = GraphBuilder::new();
        let n = graph.placeholder("n");
        let scalar = SymbolicValue::new(ValueKind::Scalar(ArrayMeta::scalar(n, Some(DType::Int64))));
        let kind = node_result(n, HostFn::Add, &[scalar, SymbolicValue::constant(1)]);
        assert!(matches!(kind, ValueKind::Scalar(meta) if meta.dtype == Some(DType::Int64)));
    }

    #[test]
    fn selecting_drops_the_leading_dimension() {
        let mut graph = GraphBuilder::new();
        let x = graph.placeholder("x");
        let meta = ArrayMeta::specialize(x, &ArrayValue::full(vec![3, 2], 0.0), false);
        let array = SymbolicValue::new(ValueKind::NumericArray(meta));
        let kind = node_result(x, HostFn::GetItem, &[array.clone(), SymbolicValue::constant(0)]);
        assert!(matches!(kind, ValueKind::NumericArray(meta) if meta.shape == Some(vec![2])));
        let kind = node_result(x, HostFn::Sum, &[array]);
        assert!(matches!(kind, ValueKind::NumericArray(meta) if meta.ndim == Some(0)));
    }

    #[test]
    fn unknown_operands_never_fold_a_shape() {
        let mut graph = GraphBuilder::new();
        let x = graph.placeholder("x");
        let meta = ArrayMeta::specialize(x, &ArrayValue::full(vec![3], 0.0), false);
        let array = SymbolicValue::new(ValueKind::NumericArray(meta));
        let opaque = SymbolicValue::new(ValueKind::Scalar(ArrayMeta::unknown(x)));
        let kind = node_result(x, HostFn::Mul, &[array, opaque]);
        assert!(matches!(kind, ValueKind::NumericArray(meta) if meta.shape.is_none()));
    }
}
