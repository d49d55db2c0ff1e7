//! Minimal host runtime model.
//!
//! This is the environment the traced code runs against: concrete values
//! held in frames, the objects they reference, and the handful of host
//! operations the reference backend and the constant folder share.

pub mod array;
pub mod frame;
pub mod objects;
pub mod ops;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use array::{ArrayValue, DType, Device};
pub use frame::{Frame, LiveEnvironment};
pub use objects::{BoundMethod, FunctionObject, HostModule, HostObject, ModuleKind, ModuleObject};
pub use ops::{BuiltinOp, HostFn};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn fresh() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Runtime type of a host value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    List,
    Dict,
    Slice,
    Array,
    DType,
    Device,
    Module(Arc<str>),
    Function,
    Method,
    HostFunction,
    Builtin,
    HostModule,
    Object(Arc<str>),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::NoneType => "NoneType",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Tuple => "tuple",
            TypeTag::List => "list",
            TypeTag::Dict => "dict",
            TypeTag::Slice => "slice",
            TypeTag::Array => "array",
            TypeTag::DType => "dtype",
            TypeTag::Device => "device",
            TypeTag::Module(name) | TypeTag::Object(name) => name,
            TypeTag::Function => "function",
            TypeTag::Method => "method",
            TypeTag::HostFunction => "builtin_function_or_method",
            TypeTag::Builtin => "builtin",
            TypeTag::HostModule => "module",
        };
        f.write_str(name)
    }
}

/// Hashable dictionary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DictKey {
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::Int(i) => write!(f, "{i}"),
            DictKey::Str(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SliceValue {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceValue {
    /// Positions selected from a sequence of `len` elements.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, crate::errors::HostError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(crate::errors::HostError::Value(
                "slice step cannot be zero".to_string(),
            ));
        }
        let len = i64::try_from(len)
            .map_err(|_| crate::errors::HostError::Overflow("sequence too long".to_string()))?;
        let clamp = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound.saturating_add(len) } else { bound };
            bound.clamp(low, high)
        };
        let (mut cursor, stop) = if step > 0 {
            (
                self.start.map_or(0, |s| clamp(s, 0, len)),
                self.stop.map_or(len, |s| clamp(s, 0, len)),
            )
        } else {
            (
                self.start.map_or(len.saturating_sub(1), |s| clamp(s, -1, len.saturating_sub(1))),
                self.stop.map_or(-1, |s| clamp(s, -1, len.saturating_sub(1))),
            )
        };
        let mut positions = Vec::new();
        while (step > 0 && cursor < stop) || (step < 0 && cursor > stop) {
            if let Ok(position) = usize::try_from(cursor) {
                positions.push(position);
            }
            cursor = cursor.saturating_add(step);
        }
        Ok(positions)
    }
}

/// A concrete host value.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Vec<RuntimeValue>),
    List(Vec<RuntimeValue>),
    Dict(BTreeMap<DictKey, RuntimeValue>),
    Slice(SliceValue),
    Array(Arc<ArrayValue>),
    DType(DType),
    Device(Device),
    Module(Arc<ModuleObject>),
    Function(Arc<FunctionObject>),
    Method(Arc<BoundMethod>),
    HostFunction(HostFn),
    Builtin(BuiltinOp),
    HostModule(Arc<HostModule>),
    Object(Arc<HostObject>),
}

impl RuntimeValue {
    pub fn str(value: &str) -> Self {
        RuntimeValue::Str(Arc::from(value))
    }

    pub fn array(value: ArrayValue) -> Self {
        RuntimeValue::Array(Arc::new(value))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            RuntimeValue::None => TypeTag::NoneType,
            RuntimeValue::Bool(_) => TypeTag::Bool,
            RuntimeValue::Int(_) => TypeTag::Int,
            RuntimeValue::Float(_) => TypeTag::Float,
            RuntimeValue::Str(_) => TypeTag::Str,
            RuntimeValue::Tuple(_) => TypeTag::Tuple,
            RuntimeValue::List(_) => TypeTag::List,
            RuntimeValue::Dict(_) => TypeTag::Dict,
            RuntimeValue::Slice(_) => TypeTag::Slice,
            RuntimeValue::Array(_) => TypeTag::Array,
            RuntimeValue::DType(_) => TypeTag::DType,
            RuntimeValue::Device(_) => TypeTag::Device,
            RuntimeValue::Module(module) => TypeTag::Module(module.type_name.clone()),
            RuntimeValue::Function(_) => TypeTag::Function,
            RuntimeValue::Method(_) => TypeTag::Method,
            RuntimeValue::HostFunction(_) => TypeTag::HostFunction,
            RuntimeValue::Builtin(_) => TypeTag::Builtin,
            RuntimeValue::HostModule(_) => TypeTag::HostModule,
            RuntimeValue::Object(object) => TypeTag::Object(object.type_name.clone()),
        }
    }

    /// Identity of reference-typed values.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            RuntimeValue::Module(module) => Some(module.id),
            RuntimeValue::Function(function) => Some(function.id),
            RuntimeValue::HostModule(module) => Some(module.id),
            RuntimeValue::Object(object) => Some(object.id),
            _ => None,
        }
    }

    /// Attribute lookup, the `getattr` of the host model.
    pub fn get_attr(&self, name: &str) -> Result<RuntimeValue, crate::errors::HostError> {
        let missing = || {
            crate::errors::HostError::Attribute(format!(
                "'{}' object has no attribute '{name}'",
                self.type_tag()
            ))
        };
        match self {
            RuntimeValue::Module(module) => module.member(name).cloned().ok_or_else(missing),
            RuntimeValue::HostModule(module) => module.members.get(name).cloned().ok_or_else(missing),
            RuntimeValue::Object(object) => match object.attrs.get(name) {
                Some(RuntimeValue::Function(function)) => {
                    Ok(RuntimeValue::Method(Arc::new(BoundMethod::User {
                        receiver: self.clone(),
                        function: function.clone(),
                    })))
                }
                Some(value) => Ok(value.clone()),
                None => Err(missing()),
            },
            RuntimeValue::Array(array) => match name {
                "shape" => Ok(RuntimeValue::Tuple(
                    array
                        .shape
                        .iter()
                        .map(|dim| ops::usize_to_int(*dim).map(RuntimeValue::Int))
                        .collect::<Result<_, _>>()?,
                )),
                "ndim" => Ok(RuntimeValue::Int(ops::usize_to_int(array.ndim())?)),
                "dtype" => Ok(RuntimeValue::DType(array.dtype)),
                "device" => Ok(RuntimeValue::Device(array.device)),
                "is_cuda" => Ok(RuntimeValue::Bool(array.device.is_cuda())),
                _ => HostFn::method(name)
                    .map(|method| {
                        RuntimeValue::Method(Arc::new(BoundMethod::Host {
                            receiver: self.clone(),
                            method,
                        }))
                    })
                    .ok_or_else(missing),
            },
            _ => Err(missing()),
        }
    }

    /// Python truthiness.
    pub fn truthy(&self) -> Result<bool, crate::errors::HostError> {
        match self {
            RuntimeValue::None => Ok(false),
            RuntimeValue::Bool(b) => Ok(*b),
            RuntimeValue::Int(i) => Ok(*i != 0),
            RuntimeValue::Float(f) => Ok(*f != 0.0),
            RuntimeValue::Str(s) => Ok(!s.is_empty()),
            RuntimeValue::Tuple(items) | RuntimeValue::List(items) => Ok(!items.is_empty()),
            RuntimeValue::Dict(map) => Ok(!map.is_empty()),
            RuntimeValue::Array(array) => match array.data.as_slice() {
                [single] => Ok(*single != 0.0),
                _ => Err(crate::errors::HostError::Value(
                    "the truth value of an array with more than one element is ambiguous".to_string(),
                )),
            },
            RuntimeValue::Module(module) => Ok(module.len().is_none_or(|len| len > 0)),
            _ => Ok(true),
        }
    }

    pub fn as_array(&self) -> Option<&Arc<ArrayValue>> {
        match self {
            RuntimeValue::Array(array) => Some(array),
            _ => None,
        }
    }
}

/// Reference types compare by identity, arrays elementwise, the rest structurally.
impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        use RuntimeValue::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Tuple(a), Tuple(b)) | (List(a), List(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Slice(a), Slice(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (DType(a), DType(b)) => a == b,
            (Device(a), Device(b)) => a == b,
            (HostFunction(a), HostFunction(b)) => a == b,
            (Builtin(a), Builtin(b)) => a == b,
            (Method(a), Method(b)) => Arc::ptr_eq(a, b),
            _ => match (self.object_id(), other.object_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<i64> for RuntimeValue {
    fn from(value: i64) -> Self {
        RuntimeValue::Int(value)
    }
}

impl From<f64> for RuntimeValue {
    fn from(value: f64) -> Self {
        RuntimeValue::Float(value)
    }
}

impl From<bool> for RuntimeValue {
    fn from(value: bool) -> Self {
        RuntimeValue::Bool(value)
    }
}

impl From<ArrayValue> for RuntimeValue {
    fn from(value: ArrayValue) -> Self {
        RuntimeValue::array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_indices_follow_python_rules() {
        let s = |start, stop, step| SliceValue { start, stop, step };
        assert_eq!(s(None, None, None).indices(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(s(Some(1), Some(-1), None).indices(4).unwrap(), vec![1, 2]);
        assert_eq!(s(None, None, Some(-1)).indices(3).unwrap(), vec![2, 1, 0]);
        assert_eq!(s(Some(-2), None, None).indices(5).unwrap(), vec![3, 4]);
        assert_eq!(s(Some(10), None, None).indices(3).unwrap(), Vec::<usize>::new());
        assert!(s(None, None, Some(0)).indices(3).is_err());
    }

    #[test]
    fn array_attributes_are_reported() {
        let x = RuntimeValue::array(ArrayValue::full(vec![4, 2], 0.0));
        assert_eq!(
            x.get_attr("shape").unwrap(),
            RuntimeValue::Tuple(vec![RuntimeValue::Int(4), RuntimeValue::Int(2)])
        );
        assert_eq!(x.get_attr("ndim").unwrap(), RuntimeValue::Int(2));
        assert!(matches!(x.get_attr("relu").unwrap(), RuntimeValue::Method(_)));
        assert!(x.get_attr("bogus").is_err());
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = HostObject::new("Config", []);
        let b = HostObject::new("Config", []);
        let a_value = RuntimeValue::Object(a.clone());
        assert_eq!(a_value, RuntimeValue::Object(a));
        assert_ne!(a_value, RuntimeValue::Object(b));
    }
}
