//! Reference-typed host objects: modules, functions, host modules and
//! plain objects. All of them are immutable once built and compare by
//! [`ObjectId`].

use std::sync::Arc;

use indexmap::IndexMap;

use super::ops::{self, HostFn};
use super::{DType, Device, ObjectId, RuntimeValue};
use crate::code::CodeUnit;
use crate::errors::HostError;

/// How a module behaves when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Holds members but has no forward computation of its own.
    Container,
    /// Indexable list of child modules; not callable.
    List,
    /// Calls its children in order, threading the result through.
    Sequential,
    /// Applies a single host function to its inputs.
    Leaf(HostFn),
    /// Multiplies its input by its `weight` member.
    Scale,
}

/// A node of a nested module tree.
///
/// List-like kinds store their children as members named `"0"`, `"1"`, ...
#[derive(Debug)]
pub struct ModuleObject {
    pub id: ObjectId,
    pub type_name: Arc<str>,
    pub kind: ModuleKind,
    members: IndexMap<String, RuntimeValue>,
}

impl ModuleObject {
    pub fn new<'a>(
        type_name: &str,
        kind: ModuleKind,
        members: impl IntoIterator<Item = (&'a str, RuntimeValue)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::fresh(),
            type_name: Arc::from(type_name),
            kind,
            members: members
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        })
    }

    pub fn leaf(type_name: &str, function: HostFn) -> Arc<Self> {
        Self::new(type_name, ModuleKind::Leaf(function), [])
    }

    pub fn scale(weight: RuntimeValue) -> Arc<Self> {
        Self::new("Scale", ModuleKind::Scale, [("weight", weight)])
    }

    pub fn list(children: Vec<Arc<ModuleObject>>) -> Arc<Self> {
        Self::indexed("ModuleList", ModuleKind::List, children)
    }

    pub fn sequential(children: Vec<Arc<ModuleObject>>) -> Arc<Self> {
        Self::indexed("Sequential", ModuleKind::Sequential, children)
    }

    fn indexed(type_name: &str, kind: ModuleKind, children: Vec<Arc<ModuleObject>>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::fresh(),
            type_name: Arc::from(type_name),
            kind,
            members: children
                .into_iter()
                .enumerate()
                .map(|(index, child)| (index.to_string(), RuntimeValue::Module(child)))
                .collect(),
        })
    }

    pub fn member(&self, name: &str) -> Option<&RuntimeValue> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &RuntimeValue)> {
        self.members.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_list_like(&self) -> bool {
        matches!(self.kind, ModuleKind::List | ModuleKind::Sequential)
    }

    /// Number of children of a list-like module.
    pub fn len(&self) -> Option<usize> {
        self.is_list_like().then(|| self.members.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Child at `index` of a list-like module, negative indices counting from the end.
    pub fn child(&self, index: i64) -> Option<&Arc<ModuleObject>> {
        let len = self.len()?;
        let position = super::array::normalize_index(index, len)?;
        match self.members.get_index(position) {
            Some((_, RuntimeValue::Module(child))) => Some(child),
            _ => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Arc<ModuleObject>> {
        self.members.values().filter_map(|value| match value {
            RuntimeValue::Module(child) => Some(child),
            _ => None,
        })
    }

    pub fn forward(&self, args: &[RuntimeValue]) -> Result<RuntimeValue, HostError> {
        match self.kind {
            ModuleKind::Leaf(function) => function.call(args),
            ModuleKind::Scale => {
                let [input] = args else {
                    return Err(arity_error(&self.type_name, 1, args.len()));
                };
                let weight = self.member("weight").ok_or_else(|| {
                    HostError::Attribute(format!("'{}' has no weight", self.type_name))
                })?;
                ops::binary(HostFn::Mul, input, weight)
            }
            ModuleKind::Sequential => {
                let [input] = args else {
                    return Err(arity_error(&self.type_name, 1, args.len()));
                };
                self.children()
                    .try_fold(input.clone(), |acc, child| child.forward(&[acc]))
            }
            ModuleKind::List | ModuleKind::Container => Err(HostError::Type(format!(
                "'{}' object is not callable",
                self.type_name
            ))),
        }
    }
}

fn arity_error(name: &str, expected: usize, got: usize) -> HostError {
    HostError::Type(format!("{name}() takes {expected} argument(s) but {got} were given"))
}

/// A user function: a code unit plus identity.
#[derive(Debug)]
pub struct FunctionObject {
    pub id: ObjectId,
    pub name: Arc<str>,
    pub code: Arc<CodeUnit>,
}

impl FunctionObject {
    pub fn new(code: Arc<CodeUnit>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::fresh(),
            name: Arc::from(code.name.as_str()),
            code,
        })
    }
}

/// A method bound to its receiver.
#[derive(Debug)]
pub enum BoundMethod {
    Host { receiver: RuntimeValue, method: HostFn },
    User { receiver: RuntimeValue, function: Arc<FunctionObject> },
}

/// A host-library module such as the array-operations namespace.
#[derive(Debug)]
pub struct HostModule {
    pub id: ObjectId,
    pub name: Arc<str>,
    pub members: IndexMap<String, RuntimeValue>,
}

impl HostModule {
    pub fn new<'a>(name: &str, members: impl IntoIterator<Item = (&'a str, RuntimeValue)>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::fresh(),
            name: Arc::from(name),
            members: members
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        })
    }

    /// The `ops` namespace: every free host function plus the common dtypes and devices.
    pub fn standard_ops() -> Arc<Self> {
        let functions = HostFn::FREE_FUNCTIONS
            .iter()
            .map(|function| (function.name(), RuntimeValue::HostFunction(*function)));
        let constants = [
            ("float32", RuntimeValue::DType(DType::Float32)),
            ("float64", RuntimeValue::DType(DType::Float64)),
            ("int64", RuntimeValue::DType(DType::Int64)),
            ("cpu", RuntimeValue::Device(Device::Cpu)),
        ];
        Self::new("ops", functions.chain(constants))
    }
}

/// An arbitrary host object the tracer does not understand.
#[derive(Debug)]
pub struct HostObject {
    pub id: ObjectId,
    pub type_name: Arc<str>,
    pub attrs: IndexMap<String, RuntimeValue>,
}

impl HostObject {
    pub fn new<'a>(type_name: &str, attrs: impl IntoIterator<Item = (&'a str, RuntimeValue)>) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::fresh(),
            type_name: Arc::from(type_name),
            attrs: attrs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        })
    }
}
