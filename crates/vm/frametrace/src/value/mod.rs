//! Symbolic values: partially known runtime state during a trace.
//!
//! Every value is immutable. Deriving a value from others goes through
//! [`propagate`], which combines the operands' support states by taking the
//! maximum and unions their guards; "changing" a value means building a new
//! one with the builder-style `with_*` / `add_*` methods. The only state
//! transition in the model, advancing a list iterator, also returns a new
//! value (see [`SymbolicValue::advance`]).

pub mod array;
pub mod containers;
pub mod key;
pub mod literal;
pub mod objects;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use array::ArrayMeta;
pub use containers::SequenceKind;
pub use key::IdentityKey;
pub use literal::Literal;
pub use objects::HostItem;

use crate::errors::ValueError;
use crate::graph::{Arg, GraphBuilder};
use crate::guards::{Guard, GuardCheck, GuardSet, GuardSource};
use crate::runtime::{
    BuiltinOp, DType, DictKey, FunctionObject, HostModule, ModuleObject, ObjectId, RuntimeValue, TypeTag,
};

/// How traceable a value is. Ordered so that combining takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SupportState {
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

impl SupportState {
    pub fn combine(self, other: SupportState) -> SupportState {
        self.max(other)
    }
}

/// Support state and guards inherited from a set of operands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    pub state: SupportState,
    pub guards: GuardSet,
}

/// Combines the operands' support states and unions their guards.
/// An empty operand list yields `Unknown` with no guards.
pub fn propagate<'a>(values: impl IntoIterator<Item = &'a SymbolicValue>) -> Propagation {
    values.into_iter().fold(Propagation::default(), |mut acc, value| {
        acc.state = acc.state.combine(value.state);
        acc.guards.extend(value.guards.iter().cloned());
        acc
    })
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    NumericArray(ArrayMeta),
    /// A graph value of primitive scalar type; shares the array representation.
    Scalar(ArrayMeta),
    /// A module reachable at `key` in the module tree.
    StructuredObject { key: Arc<str>, module: Arc<ModuleObject> },
    Constant(Literal),
    /// Deferred literal: calling it with constant arguments yields a constant.
    DerivedConstant(Box<SymbolicValue>),
    Builtin(BuiltinOp),
    ListIterator { items: Vec<SymbolicValue>, index: usize },
    GetAttr { obj: Box<SymbolicValue>, name: Arc<str> },
    Sequence { kind: SequenceKind, items: Vec<SymbolicValue> },
    ConstDict(BTreeMap<DictKey, SymbolicValue>),
    UserFunction(Arc<FunctionObject>),
    UserMethod { function: Arc<FunctionObject>, receiver: Box<SymbolicValue> },
    AllowedHost(HostItem),
    PythonModule(Arc<HostModule>),
    Unsupported { value: RuntimeValue, ty: TypeTag },
    /// Nothing is known. The token keeps unrelated unknown values apart.
    Unknown(ObjectId),
}

impl ValueKind {
    pub fn unknown() -> Self {
        ValueKind::Unknown(ObjectId::fresh())
    }

    /// Support state a value of this kind has on its own.
    fn intrinsic_state(&self) -> SupportState {
        match self {
            ValueKind::Unsupported { .. } => SupportState::Unsupported,
            ValueKind::Unknown(_) => SupportState::Unknown,
            _ => SupportState::Supported,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            ValueKind::NumericArray(_) => "NumericArray",
            ValueKind::Scalar(_) => "Scalar",
            ValueKind::StructuredObject { .. } => "StructuredObject",
            ValueKind::Constant(_) => "Constant",
            ValueKind::DerivedConstant(_) => "DerivedConstant",
            ValueKind::Builtin(_) => "Builtin",
            ValueKind::ListIterator { .. } => "ListIterator",
            ValueKind::GetAttr { .. } => "GetAttr",
            ValueKind::Sequence { .. } => "Sequence",
            ValueKind::ConstDict(_) => "ConstDict",
            ValueKind::UserFunction(_) => "UserFunction",
            ValueKind::UserMethod { .. } => "UserMethod",
            ValueKind::AllowedHost(_) => "AllowedHost",
            ValueKind::PythonModule(_) => "PythonModule",
            ValueKind::Unsupported { .. } => "Unsupported",
            ValueKind::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolicValue {
    kind: ValueKind,
    state: SupportState,
    guards: GuardSet,
    initial_name: Option<Arc<str>>,
    global_name: Option<Arc<str>>,
}

impl SymbolicValue {
    /// A value with its kind's intrinsic support state and no guards.
    pub fn new(kind: ValueKind) -> Self {
        Self {
            state: kind.intrinsic_state(),
            kind,
            guards: GuardSet::new(),
            initial_name: None,
            global_name: None,
        }
    }

    /// A value derived from operands: its state dominates theirs and it
    /// carries every operand guard.
    pub fn derived(kind: ValueKind, propagation: Propagation) -> Self {
        Self::new(kind).with_propagation(propagation)
    }

    pub fn constant(literal: impl Into<Literal>) -> Self {
        Self::new(ValueKind::Constant(literal.into()))
    }

    pub fn unknown() -> Self {
        Self::new(ValueKind::unknown())
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn state(&self) -> SupportState {
        self.state
    }

    pub fn guards(&self) -> &GuardSet {
        &self.guards
    }

    pub fn initial_name(&self) -> Option<&str> {
        self.initial_name.as_deref()
    }

    pub fn global_name(&self) -> Option<&str> {
        self.global_name.as_deref()
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.state = self.state.combine(propagation.state);
        self.guards.extend(propagation.guards);
        self
    }

    pub fn with_initial_name(mut self, name: &str) -> Self {
        self.initial_name = Some(Arc::from(name));
        self
    }

    pub fn with_global_name(mut self, name: &str) -> Self {
        self.global_name = Some(Arc::from(name));
        self
    }

    /// Drops both source-name bindings.
    pub fn without_names(mut self) -> Self {
        self.initial_name = None;
        self.global_name = None;
        self
    }

    pub fn with_state(mut self, state: SupportState) -> Self {
        self.state = state;
        self
    }

    pub fn add_guard(mut self, guard: Guard) -> Self {
        self.guards.insert(guard);
        self
    }

    pub fn add_guards<'a>(mut self, guards: impl IntoIterator<Item = &'a Guard>) -> Self {
        self.guards.extend(guards.into_iter().cloned());
        self
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_ok()
    }

    /// Already a graph node (array or scalar).
    pub fn is_node(&self) -> bool {
        matches!(self.kind, ValueKind::NumericArray(_) | ValueKind::Scalar(_))
    }

    pub fn can_create_guard(&self) -> bool {
        self.binding().is_some()
    }

    pub fn has_const_attr(&self, name: &str) -> bool {
        self.get_const_attr(name).is_ok()
    }

    /// Binding a guard on this value would name.
    fn binding(&self) -> Option<(String, GuardSource)> {
        if let Some(name) = &self.initial_name {
            return Some((name.to_string(), GuardSource::Local));
        }
        if let Some(name) = &self.global_name {
            return Some((name.to_string(), GuardSource::Global));
        }
        match &self.kind {
            ValueKind::GetAttr { obj, name } => obj
                .binding()
                .map(|(base, source)| (format!("{base}.{name}"), source)),
            _ => None,
        }
    }

    /// A guard on this value's binding; fails when the value is unbound.
    pub fn create_guard(&self, check: GuardCheck) -> Result<Guard, ValueError> {
        let (name, source) = self
            .binding()
            .ok_or_else(|| ValueError::NoGuardPossible(self.to_string()))?;
        Ok(Guard::new(&name, source, check))
    }

    /// The literal this value stands for, when fully known at trace time.
    pub fn as_constant(&self) -> Result<Literal, ValueError> {
        match &self.kind {
            ValueKind::Constant(literal) => Ok(literal.clone()),
            ValueKind::AllowedHost(HostItem::DType(dtype)) => Ok(Literal::DType(*dtype)),
            ValueKind::AllowedHost(HostItem::Device(device)) => Ok(Literal::Device(*device)),
            ValueKind::Sequence { kind, items } => {
                let literals = items
                    .iter()
                    .map(SymbolicValue::as_constant)
                    .collect::<Result<Vec<_>, _>>()?;
                kind.literal(literals)
                    .ok_or_else(|| ValueError::NotConstant(self.to_string()))
            }
            _ => Err(ValueError::NotConstant(self.to_string())),
        }
    }

    /// The graph operand representing this value.
    pub fn as_dataflow_node(&self, graph: &mut GraphBuilder) -> Result<Arg, ValueError> {
        if self.state == SupportState::Unsupported {
            return Err(ValueError::NotANode(self.to_string()));
        }
        match &self.kind {
            ValueKind::NumericArray(meta) | ValueKind::Scalar(meta) => Ok(Arg::Node(meta.node)),
            ValueKind::Constant(literal) => Ok(Arg::Const(literal.clone())),
            ValueKind::AllowedHost(HostItem::DType(_) | HostItem::Device(_)) => {
                self.as_constant().map(Arg::Const)
            }
            ValueKind::Sequence { kind, items } => {
                let args = items
                    .iter()
                    .map(|item| item.as_dataflow_node(graph))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match kind {
                    SequenceKind::List => Arg::List(args),
                    SequenceKind::Tuple => Arg::Tuple(args),
                    SequenceKind::Slice => match <[Arg; 3]>::try_from(args) {
                        Ok(parts) => Arg::Slice(Box::new(parts)),
                        Err(_) => return Err(ValueError::NotANode(self.to_string())),
                    },
                })
            }
            ValueKind::ConstDict(map) => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), value.as_dataflow_node(graph)?)))
                .collect::<Result<Vec<_>, _>>()
                .map(Arg::Dict),
            ValueKind::GetAttr { obj, name } => match obj.as_dataflow_node(graph)? {
                Arg::Node(base) => Ok(Arg::Node(graph.attribute(base, name))),
                _ => Err(ValueError::NotANode(self.to_string())),
            },
            _ => Err(ValueError::NotANode(self.to_string())),
        }
    }

    /// Runtime type of the value.
    pub fn python_type(&self) -> Result<TypeTag, ValueError> {
        match &self.kind {
            ValueKind::NumericArray(_) => Ok(TypeTag::Array),
            ValueKind::Scalar(meta) => match meta.dtype {
                Some(DType::Bool) => Ok(TypeTag::Bool),
                Some(DType::Int64) => Ok(TypeTag::Int),
                Some(DType::Float32 | DType::Float64) => Ok(TypeTag::Float),
                None => Err(ValueError::UnknownType(self.to_string())),
            },
            ValueKind::StructuredObject { module, .. } => Ok(TypeTag::Module(module.type_name.clone())),
            ValueKind::Constant(literal) => Ok(literal.type_tag()),
            ValueKind::Builtin(_) => Ok(TypeTag::Builtin),
            ValueKind::Sequence { kind, .. } => Ok(kind.type_tag()),
            ValueKind::ConstDict(_) => Ok(TypeTag::Dict),
            ValueKind::UserFunction(_) => Ok(TypeTag::Function),
            ValueKind::UserMethod { .. } => Ok(TypeTag::Method),
            ValueKind::AllowedHost(item) => Ok(item.type_tag()),
            ValueKind::PythonModule(_) => Ok(TypeTag::HostModule),
            ValueKind::Unsupported { ty, .. } => Ok(ty.clone()),
            ValueKind::DerivedConstant(_)
            | ValueKind::ListIterator { .. }
            | ValueKind::GetAttr { .. }
            | ValueKind::Unknown(_) => Err(ValueError::UnknownType(self.to_string())),
        }
    }

    /// Deep transform: rebuilds every nested value bottom-up, children
    /// before parents, dict entries in key order.
    pub fn apply<F>(&self, f: &mut F) -> SymbolicValue
    where
        F: FnMut(SymbolicValue) -> SymbolicValue,
    {
        let kind = match &self.kind {
            ValueKind::Sequence { kind, items } => ValueKind::Sequence {
                kind: *kind,
                items: items.iter().map(|item| item.apply(f)).collect(),
            },
            ValueKind::ConstDict(map) => ValueKind::ConstDict(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.apply(f)))
                    .collect(),
            ),
            ValueKind::ListIterator { items, index } => ValueKind::ListIterator {
                items: items.iter().map(|item| item.apply(f)).collect(),
                index: *index,
            },
            ValueKind::GetAttr { obj, name } => ValueKind::GetAttr {
                obj: Box::new(obj.apply(f)),
                name: name.clone(),
            },
            ValueKind::UserMethod { function, receiver } => ValueKind::UserMethod {
                function: function.clone(),
                receiver: Box::new(receiver.apply(f)),
            },
            ValueKind::DerivedConstant(payload) => ValueKind::DerivedConstant(Box::new(payload.apply(f))),
            other => other.clone(),
        };
        f(SymbolicValue {
            kind,
            state: self.state,
            guards: self.guards.clone(),
            initial_name: self.initial_name.clone(),
            global_name: self.global_name.clone(),
        })
    }

    /// Deep copy.
    pub fn copy(&self) -> SymbolicValue {
        self.apply(&mut |value| value)
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.tag())?;
        match &self.kind {
            ValueKind::NumericArray(meta) | ValueKind::Scalar(meta) => write!(f, "({})", meta.node)?,
            ValueKind::StructuredObject { key, .. } => write!(f, "({key})")?,
            ValueKind::Constant(literal) => write!(f, "({literal})")?,
            ValueKind::Builtin(op) => write!(f, "({op})")?,
            ValueKind::GetAttr { obj, name } => write!(f, "({obj}.{name})")?,
            ValueKind::UserFunction(function) => write!(f, "({})", function.name)?,
            ValueKind::UserMethod { function, .. } => write!(f, "({})", function.name)?,
            ValueKind::Unsupported { ty, .. } => write!(f, "({ty})")?,
            _ => {}
        }
        if let Some(name) = self.initial_name.as_deref().or(self.global_name.as_deref()) {
            write!(f, " '{name}'")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostObject;
    use proptest::prelude::*;

    fn guard(name: &str) -> Guard {
        Guard::new(name, GuardSource::Local, GuardCheck::LengthMatch(0))
    }

    fn unsupported() -> SymbolicValue {
        let object = HostObject::new("Opaque", []);
        SymbolicValue::new(ValueKind::Unsupported {
            value: RuntimeValue::Object(object),
            ty: TypeTag::Object(Arc::from("Opaque")),
        })
    }

    #[test]
    fn empty_propagation_is_unknown_and_unguarded() {
        let propagation = propagate(std::iter::empty());
        assert_eq!(propagation.state, SupportState::Unknown);
        assert!(propagation.guards.is_empty());
    }

    #[test]
    fn unsupported_operand_dominates() {
        let a = SymbolicValue::constant(1);
        let b = unsupported();
        let c = SymbolicValue::unknown();
        assert_eq!(propagate([&a, &c]).state, SupportState::Supported);
        assert_eq!(propagate([&a, &b, &c]).state, SupportState::Unsupported);
        assert_eq!(propagate([&c]).state, SupportState::Unknown);
    }

    #[test]
    fn create_guard_requires_a_binding() {
        let bound = SymbolicValue::constant(1).with_initial_name("n");
        let guard = bound.create_guard(GuardCheck::ConstantMatch(Literal::Int(1))).unwrap();
        assert_eq!(guard.name(), "n");
        assert_eq!(guard.source(), GuardSource::Local);

        let global = SymbolicValue::constant(1).with_global_name("G");
        assert_eq!(
            global.create_guard(GuardCheck::TypeMatch(TypeTag::Int)).unwrap().source(),
            GuardSource::Global
        );

        assert!(matches!(
            SymbolicValue::constant(1).create_guard(GuardCheck::TypeMatch(TypeTag::Int)),
            Err(ValueError::NoGuardPossible(_))
        ));
    }

    #[test]
    fn attribute_access_derives_a_dotted_binding() {
        let obj = unsupported().with_initial_name("cfg");
        let attr = SymbolicValue::new(ValueKind::GetAttr {
            obj: Box::new(obj),
            name: Arc::from("hidden"),
        });
        let guard = attr.create_guard(GuardCheck::TypeMatch(TypeTag::Int)).unwrap();
        assert_eq!(guard.name(), "cfg.hidden");
    }

    #[test]
    fn unsupported_values_are_not_nodes() {
        let mut graph = GraphBuilder::new();
        assert!(matches!(unsupported().as_dataflow_node(&mut graph), Err(ValueError::NotANode(_))));
        let seq = SymbolicValue::new(ValueKind::Sequence {
            kind: SequenceKind::Tuple,
            items: vec![SymbolicValue::constant(1), unsupported()],
        });
        assert!(seq.as_dataflow_node(&mut graph).is_err());
    }

    #[test]
    fn sequences_of_constants_are_constant() {
        let seq = SymbolicValue::new(ValueKind::Sequence {
            kind: SequenceKind::List,
            items: vec![SymbolicValue::constant(1), SymbolicValue::constant(2.5)],
        });
        assert_eq!(
            seq.as_constant().unwrap(),
            Literal::List(vec![Literal::Int(1), Literal::Float(2.5)])
        );
        assert_eq!(seq.python_type().unwrap(), TypeTag::List);
    }

    #[test]
    fn apply_visits_children_before_parents_in_key_order() {
        let mut map = BTreeMap::new();
        map.insert(DictKey::Str(Arc::from("b")), SymbolicValue::constant(2));
        map.insert(DictKey::Str(Arc::from("a")), SymbolicValue::constant(1));
        let dict = SymbolicValue::new(ValueKind::ConstDict(map));
        let mut seen = Vec::new();
        let copy = dict.apply(&mut |value: SymbolicValue| {
            seen.push(value.to_string());
            value
        });
        assert_eq!(seen, vec!["Constant(1)", "Constant(2)", "ConstDict"]);
        assert_eq!(copy.identity_key(), dict.identity_key());
    }

    #[test]
    fn apply_can_rewrite_leaves() {
        let seq = SymbolicValue::new(ValueKind::Sequence {
            kind: SequenceKind::Tuple,
            items: vec![SymbolicValue::constant(1), SymbolicValue::constant(2)],
        });
        let doubled = seq.apply(&mut |value: SymbolicValue| match value.kind() {
            ValueKind::Constant(Literal::Int(i)) => SymbolicValue::constant(i * 2),
            _ => value,
        });
        assert_eq!(doubled.as_constant().unwrap(), Literal::Tuple(vec![2.into(), 4.into()]));
        assert_eq!(seq.as_constant().unwrap(), Literal::Tuple(vec![1.into(), 2.into()]));
    }

    fn arb_state() -> impl Strategy<Value = SupportState> {
        prop_oneof![
            Just(SupportState::Unknown),
            Just(SupportState::Supported),
            Just(SupportState::Unsupported),
        ]
    }

    fn arb_value() -> impl Strategy<Value = SymbolicValue> {
        (arb_state(), prop::collection::btree_set("[a-d]", 0..4)).prop_map(|(state, names)| {
            names
                .iter()
                .fold(SymbolicValue::constant(0).with_state(state), |value, name| {
                    value.add_guard(guard(name))
                })
        })
    }

    proptest! {
        #[test]
        fn combined_state_is_the_maximum(values in prop::collection::vec(arb_value(), 0..6)) {
            let propagation = propagate(&values);
            let expected = values.iter().map(SymbolicValue::state).max().unwrap_or_default();
            prop_assert_eq!(propagation.state, expected);
        }

        #[test]
        fn derived_guards_contain_every_operand_guard(values in prop::collection::vec(arb_value(), 0..6)) {
            let derived = SymbolicValue::derived(ValueKind::unknown(), propagate(&values));
            for value in &values {
                prop_assert!(value.guards().is_subset(derived.guards()));
                prop_assert!(derived.state() >= value.state());
            }
        }

        #[test]
        fn deriving_never_mutates_operands(values in prop::collection::vec(arb_value(), 1..6)) {
            let before: Vec<_> = values.iter().map(|v| (v.state(), v.guards().clone())).collect();
            let _ = SymbolicValue::derived(ValueKind::unknown(), propagate(&values));
            let after: Vec<_> = values.iter().map(|v| (v.state(), v.guards().clone())).collect();
            prop_assert_eq!(before, after);
        }
    }
}
