//! Compile-time literals.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::errors::HostError;
use crate::runtime::{DType, Device, DictKey, RuntimeValue, TypeTag, ops, SliceValue};

/// A value fully known at trace time.
///
/// Equality is structural and type-strict (`1 != 1.0`); floats compare by
/// total order so literals can live in guard sets and identity keys.
#[derive(Debug, Clone)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Slice(SliceValue),
    DType(DType),
    Device(Device),
}

impl Literal {
    pub fn str(value: &str) -> Self {
        Literal::Str(Arc::from(value))
    }

    /// Converts a runtime value that is a literal; `None` for everything else.
    pub fn from_runtime(value: &RuntimeValue) -> Option<Self> {
        match value {
            RuntimeValue::None => Some(Literal::None),
            RuntimeValue::Bool(b) => Some(Literal::Bool(*b)),
            RuntimeValue::Int(i) => Some(Literal::Int(*i)),
            RuntimeValue::Float(f) => Some(Literal::Float(*f)),
            RuntimeValue::Str(s) => Some(Literal::Str(s.clone())),
            RuntimeValue::Slice(slice) => Some(Literal::Slice(*slice)),
            RuntimeValue::DType(dtype) => Some(Literal::DType(*dtype)),
            RuntimeValue::Device(device) => Some(Literal::Device(*device)),
            RuntimeValue::Tuple(items) => items.iter().map(Self::from_runtime).collect::<Option<_>>().map(Literal::Tuple),
            RuntimeValue::List(items) => items.iter().map(Self::from_runtime).collect::<Option<_>>().map(Literal::List),
            _ => None,
        }
    }

    pub fn is_literal(value: &RuntimeValue) -> bool {
        Self::from_runtime(value).is_some()
    }

    pub fn to_runtime(&self) -> RuntimeValue {
        match self {
            Literal::None => RuntimeValue::None,
            Literal::Bool(b) => RuntimeValue::Bool(*b),
            Literal::Int(i) => RuntimeValue::Int(*i),
            Literal::Float(f) => RuntimeValue::Float(*f),
            Literal::Str(s) => RuntimeValue::Str(s.clone()),
            Literal::Tuple(items) => RuntimeValue::Tuple(items.iter().map(Self::to_runtime).collect()),
            Literal::List(items) => RuntimeValue::List(items.iter().map(Self::to_runtime).collect()),
            Literal::Slice(slice) => RuntimeValue::Slice(*slice),
            Literal::DType(dtype) => RuntimeValue::DType(*dtype),
            Literal::Device(device) => RuntimeValue::Device(*device),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Literal::None => TypeTag::NoneType,
            Literal::Bool(_) => TypeTag::Bool,
            Literal::Int(_) => TypeTag::Int,
            Literal::Float(_) => TypeTag::Float,
            Literal::Str(_) => TypeTag::Str,
            Literal::Tuple(_) => TypeTag::Tuple,
            Literal::List(_) => TypeTag::List,
            Literal::Slice(_) => TypeTag::Slice,
            Literal::DType(_) => TypeTag::DType,
            Literal::Device(_) => TypeTag::Device,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_dict_key(&self) -> Option<DictKey> {
        match self {
            Literal::Int(i) => Some(DictKey::Int(*i)),
            Literal::Str(s) => Some(DictKey::Str(s.clone())),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Literal]> {
        match self {
            Literal::Tuple(items) | Literal::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn truthy(&self) -> Result<bool, HostError> {
        self.to_runtime().truthy()
    }

    /// `self[key]` with host semantics.
    pub fn getitem(&self, key: &Literal) -> Result<Literal, HostError> {
        let result = ops::subscript(&self.to_runtime(), &key.to_runtime())?;
        Self::from_runtime(&result)
            .ok_or_else(|| HostError::Type(format!("'{}' result is not a literal", result.type_tag())))
    }

    fn rank(&self) -> u8 {
        match self {
            Literal::None => 0,
            Literal::Bool(_) => 1,
            Literal::Int(_) => 2,
            Literal::Float(_) => 3,
            Literal::Str(_) => 4,
            Literal::Tuple(_) => 5,
            Literal::List(_) => 6,
            Literal::Slice(_) => 7,
            Literal::DType(_) => 8,
            Literal::Device(_) => 9,
        }
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Literal::None, Literal::None) => Ordering::Equal,
            (Literal::Bool(a), Literal::Bool(b)) => a.cmp(b),
            (Literal::Int(a), Literal::Int(b)) => a.cmp(b),
            (Literal::Float(a), Literal::Float(b)) => a.total_cmp(b),
            (Literal::Str(a), Literal::Str(b)) => a.cmp(b),
            (Literal::Tuple(a), Literal::Tuple(b)) | (Literal::List(a), Literal::List(b)) => a.cmp(b),
            (Literal::Slice(a), Literal::Slice(b)) => a.cmp(b),
            (Literal::DType(a), Literal::DType(b)) => a.cmp(b),
            (Literal::Device(a), Literal::Device(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Literal::None => {}
            Literal::Bool(b) => b.hash(state),
            Literal::Int(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::Str(s) => s.hash(state),
            Literal::Tuple(items) | Literal::List(items) => items.hash(state),
            Literal::Slice(slice) => slice.hash(state),
            Literal::DType(dtype) => dtype.hash(state),
            Literal::Device(device) => device.hash(state),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write!(f, "'{s}'"),
            Literal::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Literal::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
            Literal::Slice(slice) => {
                let part = |bound: Option<i64>| bound.map_or_else(|| "None".to_string(), |b| b.to_string());
                write!(f, "slice({}, {}, {})", part(slice.start), part(slice.stop), part(slice.step))
            }
            Literal::DType(dtype) => write!(f, "{dtype}"),
            Literal::Device(device) => write!(f, "device('{device}')"),
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}
