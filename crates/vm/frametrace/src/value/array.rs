//! Numeric-array values and their compile-time metadata.

use crate::errors::ValueError;
use crate::graph::NodeId;
use crate::runtime::array::{ArrayValue, contiguous_strides};
use crate::runtime::{DType, Device, HostFn, ops};

use super::{Literal, SymbolicValue, ValueKind, propagate};

/// What the tracer knows about an array-valued graph node.
///
/// `shape` and `strides` are only filled in when shapes are specialized;
/// with dynamic shapes they stay `None` and shape queries become graph nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayMeta {
    pub node: NodeId,
    pub dtype: Option<DType>,
    pub device: Option<Device>,
    pub ndim: Option<usize>,
    pub shape: Option<Vec<usize>>,
    pub strides: Option<Vec<usize>>,
}

impl ArrayMeta {
    pub fn unknown(node: NodeId) -> Self {
        Self {
            node,
            dtype: None,
            device: None,
            ndim: None,
            shape: None,
            strides: None,
        }
    }

    pub fn specialize(node: NodeId, array: &ArrayValue, dynamic_shapes: bool) -> Self {
        Self {
            node,
            dtype: Some(array.dtype),
            device: Some(array.device),
            ndim: Some(array.ndim()),
            shape: (!dynamic_shapes).then(|| array.shape.clone()),
            strides: (!dynamic_shapes).then(|| array.strides.clone()),
        }
    }

    /// Metadata of a scalar-typed graph value.
    pub fn scalar(node: NodeId, dtype: Option<DType>) -> Self {
        Self {
            node,
            dtype,
            device: None,
            ndim: Some(0),
            shape: Some(Vec::new()),
            strides: Some(Vec::new()),
        }
    }

    /// Result of applying `op` elementwise to arrays (or scalars) `lhs` and `rhs`.
    pub fn broadcast(node: NodeId, op: HostFn, lhs: Option<&ArrayMeta>, rhs: Option<&ArrayMeta>) -> Self {
        let dtype = match (lhs.and_then(|m| m.dtype), rhs.and_then(|m| m.dtype)) {
            (Some(a), Some(b)) => Some(a.promote(b)),
            (one, None) | (None, one) => one,
        };
        let dtype = if op.is_comparison() {
            Some(DType::Bool)
        } else if op == HostFn::Div {
            dtype.map(|d| if d.is_floating_point() { d } else { DType::Float32 })
        } else {
            dtype
        };
        let (shape, ndim, device) = match (lhs, rhs) {
            (Some(a), Some(b)) if a.ndim == Some(0) => (b.shape.clone(), b.ndim, b.device),
            (Some(a), Some(b)) if b.ndim == Some(0) => (a.shape.clone(), a.ndim, a.device),
            (Some(a), Some(b)) => {
                let shape = if a.shape == b.shape { a.shape.clone() } else { None };
                let ndim = if a.ndim == b.ndim { a.ndim } else { None };
                (shape, ndim, a.device.or(b.device))
            }
            (Some(only), None) | (None, Some(only)) => (only.shape.clone(), only.ndim, only.device),
            (None, None) => (None, None, None),
        };
        Self {
            node,
            dtype,
            device,
            ndim,
            strides: shape.as_deref().map(contiguous_strides),
            shape,
        }
    }

    /// Result of a full reduction such as `sum`.
    pub fn reduced(node: NodeId, from: &ArrayMeta) -> Self {
        Self {
            device: from.device,
            ..Self::scalar(node, from.dtype)
        }
    }

    /// Result of selecting along the first dimension.
    pub fn selected(node: NodeId, from: &ArrayMeta) -> Self {
        let shape = from.shape.as_ref().and_then(|s| s.get(1..)).map(<[usize]>::to_vec);
        Self {
            node,
            dtype: from.dtype,
            device: from.device,
            ndim: from.ndim.and_then(|n| n.checked_sub(1)),
            strides: shape.as_deref().map(contiguous_strides),
            shape,
        }
    }

    fn dims_literal(dims: &[usize]) -> Result<Literal, ValueError> {
        dims.iter()
            .map(|dim| {
                ops::usize_to_int(*dim)
                    .map(Literal::Int)
                    .map_err(|err| ValueError::NotConstant(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Literal::Tuple)
    }
}

impl SymbolicValue {
    /// Attribute of an array that is known without running the graph.
    ///
    /// Call-style queries (`size`, `stride`, `dim`, `ndimension`) come back
    /// wrapped in a derived constant. Returns `None` when the attribute is not
    /// known at trace time.
    pub fn const_attr(&self, name: &str) -> Option<SymbolicValue> {
        let ValueKind::NumericArray(meta) = self.kind() else {
            return None;
        };
        let literal = match name {
            "ndim" | "dim" | "ndimension" => Literal::Int(ops::usize_to_int(meta.ndim?).ok()?),
            "dtype" => Literal::DType(meta.dtype?),
            "device" => Literal::Device(meta.device?),
            "is_cuda" => Literal::Bool(meta.device?.is_cuda()),
            "shape" | "size" => ArrayMeta::dims_literal(meta.shape.as_ref()?).ok()?,
            "stride" => ArrayMeta::dims_literal(meta.strides.as_ref()?).ok()?,
            _ => return None,
        };
        let constant = SymbolicValue::derived(ValueKind::Constant(literal), propagate([self]));
        if matches!(name, "dim" | "ndimension" | "size" | "stride") {
            Some(SymbolicValue::derived(
                ValueKind::DerivedConstant(Box::new(constant)),
                propagate([self]),
            ))
        } else {
            Some(constant)
        }
    }

    /// Materializes a derived constant: no argument yields the payload, one
    /// argument indexes it.
    pub fn call_const(&self, args: &[SymbolicValue]) -> Result<SymbolicValue, ValueError> {
        let ValueKind::DerivedConstant(payload) = self.kind() else {
            return Err(ValueError::NotConstant(self.to_string()));
        };
        let options = propagate(std::iter::once(self).chain(args));
        let literal = payload.as_constant()?;
        let result = match args {
            [] => literal,
            [index] => literal
                .getitem(&index.as_constant()?)
                .map_err(|err| ValueError::NotConstant(err.to_string()))?,
            _ => return Err(ValueError::NotConstant(format!("{self} called with {} arguments", args.len()))),
        };
        Ok(SymbolicValue::derived(ValueKind::Constant(result), options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::guards::{ArraySpec, GuardCheck, GuardSource};

    fn traced(dynamic_shapes: bool) -> SymbolicValue {
        let mut graph = GraphBuilder::new();
        let node = graph.placeholder("x");
        let array = ArrayValue::full(vec![4, 3], 0.0).with_dtype(DType::Float32);
        let value = SymbolicValue::new(ValueKind::NumericArray(ArrayMeta::specialize(node, &array, dynamic_shapes)))
            .with_initial_name("x");
        let guard = value
            .create_guard(GuardCheck::ArrayMatch(ArraySpec::of(&array, dynamic_shapes)))
            .unwrap();
        value.add_guard(guard)
    }

    #[test]
    fn shape_is_folded_when_specialized() {
        let x = traced(false);
        let shape = x.const_attr("shape").unwrap();
        assert_eq!(shape.as_constant().unwrap(), Literal::Tuple(vec![4.into(), 3.into()]));
        assert_eq!(shape.guards(), x.guards());
        assert_eq!(x.const_attr("dtype").unwrap().as_constant().unwrap(), Literal::DType(DType::Float32));
    }

    #[test]
    fn shape_is_unknown_with_dynamic_shapes() {
        let x = traced(true);
        assert!(x.const_attr("shape").is_none());
        assert!(x.const_attr("size").is_none());
        assert_eq!(x.const_attr("ndim").unwrap().as_constant().unwrap(), Literal::Int(2));
    }

    #[test]
    fn size_is_a_derived_constant() {
        let x = traced(false);
        let size = x.const_attr("size").unwrap();
        assert!(!size.is_constant());
        assert_eq!(
            size.call_const(&[]).unwrap().as_constant().unwrap(),
            Literal::Tuple(vec![4.into(), 3.into()])
        );
        let first = size.call_const(&[SymbolicValue::constant(-1)]).unwrap();
        assert_eq!(first.as_constant().unwrap(), Literal::Int(3));
        assert!(first.guards().iter().all(|g| g.source() == GuardSource::Local));
        assert!(size.call_const(&[SymbolicValue::unknown()]).is_err());
    }

    #[test]
    fn broadcasting_keeps_the_array_shape() {
        let mut graph = GraphBuilder::new();
        let node = graph.placeholder("x");
        let meta = ArrayMeta::specialize(node, &ArrayValue::full(vec![2, 2], 0.0), false);
        let scalar = ArrayMeta::scalar(node, Some(DType::Int64));
        let out = ArrayMeta::broadcast(node, HostFn::Add, Some(&meta), Some(&scalar));
        assert_eq!(out.shape, Some(vec![2, 2]));
        assert_eq!(out.dtype, Some(DType::Float64));
        let cmp = ArrayMeta::broadcast(node, HostFn::Lt, Some(&meta), None);
        assert_eq!(cmp.dtype, Some(DType::Bool));
    }
}
