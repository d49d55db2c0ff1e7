//! Identity keys: structural fingerprints of symbolic values.
//!
//! Two values with equal keys are interchangeable for graph construction.
//! Keys ignore guards and support state and are built children first, with
//! dict entries in sorted key order.

use std::sync::Arc;

use crate::graph::NodeId;
use crate::runtime::{BuiltinOp, DictKey, ObjectId, TypeTag};

use super::{HostItem, Literal, SequenceKind, SymbolicValue, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    NumericArray(NodeId),
    Scalar(NodeId),
    StructuredObject(Arc<str>),
    Constant(Literal),
    DerivedConstant(Box<IdentityKey>),
    Builtin(BuiltinOp),
    ListIterator { items: Vec<IdentityKey>, index: usize },
    GetAttr(Box<IdentityKey>, Arc<str>),
    Sequence(SequenceKind, Vec<IdentityKey>),
    ConstDict(Vec<(DictKey, IdentityKey)>),
    UserFunction(ObjectId),
    UserMethod(ObjectId, Box<IdentityKey>),
    AllowedHost(HostItem),
    PythonModule(ObjectId),
    /// Opaque objects are only interchangeable when they are the same
    /// object reached through the same binding.
    Unsupported {
        ty: TypeTag,
        id: Option<ObjectId>,
        binding: Option<Arc<str>>,
    },
    Unknown(ObjectId),
}

impl SymbolicValue {
    pub fn identity_key(&self) -> IdentityKey {
        match self.kind() {
            ValueKind::NumericArray(meta) => IdentityKey::NumericArray(meta.node),
            ValueKind::Scalar(meta) => IdentityKey::Scalar(meta.node),
            ValueKind::StructuredObject { key, .. } => IdentityKey::StructuredObject(key.clone()),
            ValueKind::Constant(literal) => IdentityKey::Constant(literal.clone()),
            ValueKind::DerivedConstant(payload) => IdentityKey::DerivedConstant(Box::new(payload.identity_key())),
            ValueKind::Builtin(op) => IdentityKey::Builtin(*op),
            ValueKind::ListIterator { items, index } => IdentityKey::ListIterator {
                items: items.iter().map(SymbolicValue::identity_key).collect(),
                index: *index,
            },
            ValueKind::GetAttr { obj, name } => IdentityKey::GetAttr(Box::new(obj.identity_key()), name.clone()),
            ValueKind::Sequence { kind, items } => {
                IdentityKey::Sequence(*kind, items.iter().map(SymbolicValue::identity_key).collect())
            }
            ValueKind::ConstDict(map) => IdentityKey::ConstDict(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.identity_key()))
                    .collect(),
            ),
            ValueKind::UserFunction(function) => IdentityKey::UserFunction(function.id),
            ValueKind::UserMethod { function, receiver } => {
                IdentityKey::UserMethod(function.id, Box::new(receiver.identity_key()))
            }
            ValueKind::AllowedHost(item) => IdentityKey::AllowedHost(*item),
            ValueKind::PythonModule(module) => IdentityKey::PythonModule(module.id),
            ValueKind::Unsupported { value, ty } => IdentityKey::Unsupported {
                ty: ty.clone(),
                id: value.object_id(),
                binding: self
                    .initial_name()
                    .or(self.global_name())
                    .map(Arc::from),
            },
            ValueKind::Unknown(token) => IdentityKey::Unknown(*token),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::graph::GraphBuilder;
    use crate::guards::{Guard, GuardCheck, GuardSource};
    use crate::runtime::{HostObject, RuntimeValue};
    use crate::value::{ArrayMeta, propagate};
    use proptest::prelude::*;

    #[test]
    fn keys_ignore_guards_and_names() {
        let plain = SymbolicValue::constant(3);
        let guarded = SymbolicValue::constant(3)
            .with_initial_name("n")
            .add_guard(Guard::new("n", GuardSource::Local, GuardCheck::ConstantMatch(Literal::Int(3))));
        assert_eq!(plain.identity_key(), guarded.identity_key());
        assert_ne!(plain.identity_key(), SymbolicValue::constant(3.0).identity_key());
    }

    #[test]
    fn distinct_nodes_have_distinct_keys() {
        let mut graph = GraphBuilder::new();
        let a = graph.placeholder("a");
        let b = graph.placeholder("b");
        let x = SymbolicValue::new(ValueKind::NumericArray(ArrayMeta::unknown(a)));
        let y = SymbolicValue::new(ValueKind::NumericArray(ArrayMeta::unknown(b)));
        assert_ne!(x.identity_key(), y.identity_key());
        assert_eq!(x.identity_key(), x.copy().identity_key());
    }

    #[test]
    fn distinct_opaque_objects_are_not_interchangeable() {
        let wrap = |object: Arc<HostObject>| SymbolicValue::new(ValueKind::Unsupported {
            ty: TypeTag::Object(object.type_name.clone()),
            value: RuntimeValue::Object(object),
        });
        let a = wrap(HostObject::new("Cfg", []));
        let b = wrap(HostObject::new("Cfg", []));
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn unrelated_unknown_values_are_not_interchangeable() {
        let a = SymbolicValue::unknown();
        let b = SymbolicValue::unknown();
        assert_ne!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key(), a.copy().identity_key());

        let pair = |item: &SymbolicValue| SymbolicValue::sequence(SequenceKind::Tuple, vec![item.clone()]);
        assert_ne!(pair(&a).identity_key(), pair(&b).identity_key());
    }

    #[test]
    fn dict_keys_are_sorted() {
        let mut forward = BTreeMap::new();
        forward.insert(DictKey::Str(Arc::from("b")), SymbolicValue::constant(2));
        forward.insert(DictKey::Int(1), SymbolicValue::constant(1));
        let key = SymbolicValue::new(ValueKind::ConstDict(forward)).identity_key();
        let IdentityKey::ConstDict(entries) = key else {
            panic!("expected a dict key");
        };
        let keys: Vec<_> = entries.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![DictKey::Int(1), DictKey::Str(Arc::from("b"))]);
    }

    proptest! {
        #[test]
        fn equal_keys_build_identical_graph_operands(values in prop::collection::vec(-3i64..3, 0..4)) {
            let build = |items: &[i64]| {
                let items = items.iter().map(|i| SymbolicValue::constant(*i)).collect::<Vec<_>>();
                let options = propagate(&items);
                SymbolicValue::derived(ValueKind::Sequence { kind: SequenceKind::Tuple, items }, options)
            };
            let a = build(&values);
            let b = build(&values);
            prop_assert_eq!(a.identity_key(), b.identity_key());
            let mut graph = GraphBuilder::new();
            prop_assert_eq!(a.as_dataflow_node(&mut graph).unwrap(), b.as_dataflow_node(&mut graph).unwrap());
        }
    }
}
