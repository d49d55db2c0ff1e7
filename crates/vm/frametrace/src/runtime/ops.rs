//! Host operations.
//!
//! One implementation serves three callers: the uninstrumented interpreter,
//! the reference backend evaluating graph nodes, and the symbolic
//! interpreter's constant folder. Keeping them shared is what makes a folded
//! constant agree with the value the original code would have computed.

use std::cmp::Ordering;
use std::sync::Arc;

use strum::{Display, EnumString, IntoStaticStr};

use super::array::{ArrayValue, DType, normalize_index};
use super::objects::ModuleObject;
use super::{DictKey, RuntimeValue};
use crate::errors::HostError;

/// Allowed host-library operations. These are the only callables that may
/// appear as graph nodes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum HostFn {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Neg,
    Abs,
    Relu,
    Sum,
    GetItem,
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    Size,
    Dim,
    Stride,
}

impl HostFn {
    /// Functions exposed as free functions by the `ops` host module.
    pub const FREE_FUNCTIONS: [HostFn; 8] = [
        HostFn::Add,
        HostFn::Sub,
        HostFn::Mul,
        HostFn::Div,
        HostFn::Neg,
        HostFn::Abs,
        HostFn::Relu,
        HostFn::Sum,
    ];

    /// Comparison operators in `COMPARE_OP` operand order.
    pub const COMPARISONS: [HostFn; 6] = [
        HostFn::Lt,
        HostFn::Le,
        HostFn::Eq,
        HostFn::Ne,
        HostFn::Gt,
        HostFn::Ge,
    ];

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Array method named `name`, if any.
    pub fn method(name: &str) -> Option<HostFn> {
        match name {
            "add" => Some(HostFn::Add),
            "sub" => Some(HostFn::Sub),
            "mul" => Some(HostFn::Mul),
            "div" => Some(HostFn::Div),
            "neg" => Some(HostFn::Neg),
            "abs" => Some(HostFn::Abs),
            "relu" => Some(HostFn::Relu),
            "sum" => Some(HostFn::Sum),
            "size" => Some(HostFn::Size),
            "dim" | "ndimension" => Some(HostFn::Dim),
            "stride" => Some(HostFn::Stride),
            _ => None,
        }
    }

    /// Metadata queries answered from shape and layout alone.
    pub fn is_shape_query(self) -> bool {
        matches!(self, HostFn::Size | HostFn::Dim | HostFn::Stride)
    }

    pub fn is_comparison(self) -> bool {
        Self::COMPARISONS.contains(&self)
    }

    /// Elementwise operations preserve the shape of their array operand.
    pub fn is_elementwise(self) -> bool {
        !matches!(
            self,
            HostFn::Sum | HostFn::GetItem | HostFn::Size | HostFn::Dim | HostFn::Stride
        )
    }

    pub fn call(self, args: &[RuntimeValue]) -> Result<RuntimeValue, HostError> {
        match (self, args) {
            (HostFn::Neg | HostFn::Abs | HostFn::Relu, [value]) => unary(self, value),
            (HostFn::Sum, [value]) => match value {
                RuntimeValue::Array(array) => Ok(RuntimeValue::array(array.sum())),
                RuntimeValue::Int(_) | RuntimeValue::Float(_) | RuntimeValue::Bool(_) => {
                    Ok(value.clone())
                }
                other => Err(HostError::Type(format!("sum() of '{}'", other.type_tag()))),
            },
            (HostFn::GetItem, [container, key]) => subscript(container, key),
            (HostFn::Size | HostFn::Stride, [RuntimeValue::Array(array)]) => {
                let dims = if self == HostFn::Size { &array.shape } else { &array.strides };
                Ok(RuntimeValue::Tuple(
                    dims.iter()
                        .map(|dim| usize_to_int(*dim).map(RuntimeValue::Int))
                        .collect::<Result<_, _>>()?,
                ))
            }
            (HostFn::Size | HostFn::Stride, [RuntimeValue::Array(array), RuntimeValue::Int(index)]) => {
                let dims = if self == HostFn::Size { &array.shape } else { &array.strides };
                let position = normalize_index(*index, dims.len()).ok_or_else(|| {
                    HostError::Index(format!("dimension {index} out of range"))
                })?;
                let dim = dims
                    .get(position)
                    .ok_or_else(|| HostError::Index(format!("dimension {index} out of range")))?;
                Ok(RuntimeValue::Int(usize_to_int(*dim)?))
            }
            (HostFn::Dim, [RuntimeValue::Array(array)]) => {
                Ok(RuntimeValue::Int(usize_to_int(array.ndim())?))
            }
            (
                HostFn::Add
                | HostFn::Sub
                | HostFn::Mul
                | HostFn::Div
                | HostFn::FloorDiv
                | HostFn::Mod
                | HostFn::Lt
                | HostFn::Le
                | HostFn::Eq
                | HostFn::Ne
                | HostFn::Gt
                | HostFn::Ge,
                [lhs, rhs],
            ) => binary(self, lhs, rhs),
            _ => Err(HostError::Type(format!(
                "{}() got {} argument(s) it cannot accept",
                self.name(),
                args.len()
            ))),
        }
    }
}

/// Fixed host builtins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinOp {
    Len,
    Abs,
    Min,
    Max,
    Range,
    Int,
    Float,
}

impl BuiltinOp {
    pub const ALL: [BuiltinOp; 7] = [
        BuiltinOp::Len,
        BuiltinOp::Abs,
        BuiltinOp::Min,
        BuiltinOp::Max,
        BuiltinOp::Range,
        BuiltinOp::Int,
        BuiltinOp::Float,
    ];

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn call(self, args: &[RuntimeValue]) -> Result<RuntimeValue, HostError> {
        match (self, args) {
            (BuiltinOp::Len, [value]) => length(value).and_then(usize_to_int).map(RuntimeValue::Int),
            (BuiltinOp::Abs, [value]) => unary(HostFn::Abs, value),
            (BuiltinOp::Min | BuiltinOp::Max, [RuntimeValue::Tuple(items) | RuntimeValue::List(items)]) => {
                self.extremum(items)
            }
            (BuiltinOp::Min | BuiltinOp::Max, items) if items.len() >= 2 => self.extremum(items),
            (BuiltinOp::Range, bounds) if (1..=3).contains(&bounds.len()) => {
                let ints = bounds
                    .iter()
                    .map(|bound| match bound {
                        RuntimeValue::Int(i) => Ok(*i),
                        other => Err(HostError::Type(format!(
                            "'{}' object cannot be interpreted as an integer",
                            other.type_tag()
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(HostError::Type("range expected 1 to 3 arguments".to_string())),
                };
                if step == 0 {
                    return Err(HostError::Value("range() arg 3 must not be zero".to_string()));
                }
                let len = range_len(start, stop, step);
                if len > MAX_RANGE_LEN {
                    return Err(HostError::Overflow(format!(
                        "range of {len} items exceeds the limit of {MAX_RANGE_LEN}"
                    )));
                }
                (0..len)
                    .map(|index| {
                        let item = i128::from(start) + i128::from(index) * i128::from(step);
                        i64::try_from(item)
                            .map(RuntimeValue::Int)
                            .map_err(|_| HostError::Overflow("range overflow".to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(RuntimeValue::List)
            }
            (BuiltinOp::Int, [value]) => match value {
                RuntimeValue::Int(i) => Ok(RuntimeValue::Int(*i)),
                RuntimeValue::Bool(b) => Ok(RuntimeValue::Int(i64::from(*b))),
                RuntimeValue::Float(f) => float_to_int(*f).map(RuntimeValue::Int),
                RuntimeValue::Str(s) => s
                    .trim()
                    .parse()
                    .map(RuntimeValue::Int)
                    .map_err(|_| HostError::Value(format!("invalid literal for int(): '{s}'"))),
                other => Err(HostError::Type(format!("int() argument must not be '{}'", other.type_tag()))),
            },
            (BuiltinOp::Float, [value]) => match value {
                RuntimeValue::Float(f) => Ok(RuntimeValue::Float(*f)),
                RuntimeValue::Int(i) => Ok(RuntimeValue::Float(int_to_float(*i))),
                RuntimeValue::Bool(b) => Ok(RuntimeValue::Float(f64::from(u8::from(*b)))),
                RuntimeValue::Str(s) => s
                    .trim()
                    .parse()
                    .map(RuntimeValue::Float)
                    .map_err(|_| HostError::Value(format!("could not convert string to float: '{s}'"))),
                other => Err(HostError::Type(format!("float() argument must not be '{}'", other.type_tag()))),
            },
            _ => Err(HostError::Type(format!(
                "{}() got {} argument(s) it cannot accept",
                self.name(),
                args.len()
            ))),
        }
    }

    fn extremum(self, items: &[RuntimeValue]) -> Result<RuntimeValue, HostError> {
        let mut best: Option<(&RuntimeValue, Number)> = None;
        for item in items {
            let key = Number::of(item)
                .ok_or_else(|| HostError::Type(format!("'{}' is not orderable", item.type_tag())))?;
            let wanted = if self == BuiltinOp::Min { Ordering::Less } else { Ordering::Greater };
            let replace = match best {
                None => true,
                Some((_, current)) => key.compare(current) == Some(wanted),
            };
            if replace {
                best = Some((item, key));
            }
        }
        best.map(|(item, _)| item.clone())
            .ok_or_else(|| HostError::Value(format!("{}() arg is an empty sequence", self.name())))
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &RuntimeValue) -> Option<Self> {
        match value {
            RuntimeValue::Bool(b) => Some(Number::Int(i64::from(*b))),
            RuntimeValue::Int(i) => Some(Number::Int(*i)),
            RuntimeValue::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Number::Int(i) => int_to_float(i),
            Number::Float(f) => f,
        }
    }

    /// Exact ordering; ints are not rounded through `f64`. `None` when a
    /// NaN is involved.
    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
            (Number::Int(a), Number::Float(b)) => compare_int_float(a, b),
            (Number::Float(a), Number::Int(b)) => compare_int_float(b, a).map(Ordering::reverse),
        }
    }
}

fn compare_int_float(int: i64, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    let whole = float.trunc();
    let Ok(truncated) = float_to_int(whole) else {
        // Beyond the i64 range in one direction or the other.
        return Some(if float > 0.0 { Ordering::Less } else { Ordering::Greater });
    };
    match int.cmp(&truncated) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)),
        unequal => Some(unequal),
    }
}

/// Largest `range()` the runtime materializes.
pub const MAX_RANGE_LEN: u64 = 1 << 20;

fn range_len(start: i64, stop: i64, step: i64) -> u64 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    if span <= 0 {
        return 0;
    }
    let step = step.abs();
    u64::try_from((span + step - 1) / step).unwrap_or(u64::MAX)
}

#[expect(clippy::as_conversions, reason = "int to float follows host numeric semantics")]
pub fn int_to_float(value: i64) -> f64 {
    value as f64
}

pub fn float_to_int(value: f64) -> Result<i64, HostError> {
    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < -9.223_372_036_854_776e18 || truncated >= 9.223_372_036_854_776e18 {
        return Err(HostError::Overflow(format!("cannot convert float {value} to integer")));
    }
    #[expect(clippy::as_conversions, reason = "range checked above")]
    let value = truncated as i64;
    Ok(value)
}

pub fn usize_to_int(value: usize) -> Result<i64, HostError> {
    i64::try_from(value).map_err(|_| HostError::Overflow(format!("{value} does not fit in an int")))
}

fn bool_to_float(value: bool) -> f64 {
    f64::from(u8::from(value))
}

/// Elementwise kernel of a binary operator.
fn kernel(op: HostFn) -> Option<fn(f64, f64) -> f64> {
    let kernel: fn(f64, f64) -> f64 = match op {
        HostFn::Add => |a, b| a + b,
        HostFn::Sub => |a, b| a - b,
        HostFn::Mul => |a, b| a * b,
        HostFn::Div => |a, b| a / b,
        HostFn::FloorDiv => |a, b| (a / b).floor(),
        HostFn::Mod => |a, b| a - b * (a / b).floor(),
        HostFn::Lt => |a, b| bool_to_float(a < b),
        HostFn::Le => |a, b| bool_to_float(a <= b),
        HostFn::Eq => |a, b| bool_to_float(a == b),
        HostFn::Ne => |a, b| bool_to_float(a != b),
        HostFn::Gt => |a, b| bool_to_float(a > b),
        HostFn::Ge => |a, b| bool_to_float(a >= b),
        _ => return None,
    };
    Some(kernel)
}

/// A python scalar as a 0-d array that does not promote `like`.
fn scalar_like(number: Number, like: DType) -> ArrayValue {
    let dtype = match number {
        Number::Int(_) => like,
        Number::Float(_) if like.is_floating_point() => like,
        Number::Float(_) => DType::Float32,
    };
    ArrayValue::scalar(number.as_float(), dtype)
}

fn array_binary(op: HostFn, lhs: &ArrayValue, rhs: &ArrayValue) -> Result<RuntimeValue, HostError> {
    let kernel = kernel(op).ok_or_else(|| HostError::Type(format!("{op} is not elementwise")))?;
    let mut result = lhs.zip_with(rhs, kernel)?;
    if op.is_comparison() {
        result.dtype = DType::Bool;
    } else if op == HostFn::Div && !result.dtype.is_floating_point() {
        result.dtype = DType::Float32;
    }
    Ok(RuntimeValue::array(result))
}

fn int_binary(op: HostFn, a: i64, b: i64) -> Result<RuntimeValue, HostError> {
    let overflow = || HostError::Overflow(format!("integer overflow in {op}"));
    let zero = || HostError::ZeroDivision("integer division or modulo by zero".to_string());
    match op {
        HostFn::Add => a.checked_add(b).map(RuntimeValue::Int).ok_or_else(overflow),
        HostFn::Sub => a.checked_sub(b).map(RuntimeValue::Int).ok_or_else(overflow),
        HostFn::Mul => a.checked_mul(b).map(RuntimeValue::Int).ok_or_else(overflow),
        HostFn::Div => {
            if b == 0 {
                return Err(HostError::ZeroDivision("division by zero".to_string()));
            }
            Ok(RuntimeValue::Float(int_to_float(a) / int_to_float(b)))
        }
        HostFn::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                quotient.checked_sub(1).map(RuntimeValue::Int).ok_or_else(overflow)
            } else {
                Ok(RuntimeValue::Int(quotient))
            }
        }
        HostFn::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                remainder.checked_add(b).map(RuntimeValue::Int).ok_or_else(overflow)
            } else {
                Ok(RuntimeValue::Int(remainder))
            }
        }
        HostFn::Lt => Ok(RuntimeValue::Bool(a < b)),
        HostFn::Le => Ok(RuntimeValue::Bool(a <= b)),
        HostFn::Eq => Ok(RuntimeValue::Bool(a == b)),
        HostFn::Ne => Ok(RuntimeValue::Bool(a != b)),
        HostFn::Gt => Ok(RuntimeValue::Bool(a > b)),
        HostFn::Ge => Ok(RuntimeValue::Bool(a >= b)),
        _ => Err(HostError::Type(format!("{op} is not a binary operator"))),
    }
}

fn float_binary(op: HostFn, a: f64, b: f64) -> Result<RuntimeValue, HostError> {
    if matches!(op, HostFn::Div | HostFn::FloorDiv | HostFn::Mod) && b == 0.0 {
        return Err(HostError::ZeroDivision("float division by zero".to_string()));
    }
    let kernel = kernel(op).ok_or_else(|| HostError::Type(format!("{op} is not a binary operator")))?;
    let value = kernel(a, b);
    if op.is_comparison() {
        Ok(RuntimeValue::Bool(value != 0.0))
    } else {
        Ok(RuntimeValue::Float(value))
    }
}

/// Applies a binary operator with host semantics.
pub fn binary(op: HostFn, lhs: &RuntimeValue, rhs: &RuntimeValue) -> Result<RuntimeValue, HostError> {
    use RuntimeValue as V;
    match (lhs, rhs) {
        (V::Array(a), V::Array(b)) => return array_binary(op, a, b),
        (V::Array(a), other) => {
            if let Some(number) = Number::of(other) {
                return array_binary(op, a, &scalar_like(number, a.dtype));
            }
        }
        (other, V::Array(b)) => {
            if let Some(number) = Number::of(other) {
                return array_binary(op, &scalar_like(number, b.dtype), b);
            }
        }
        _ => {}
    }
    match (Number::of(lhs), Number::of(rhs)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => return int_binary(op, a, b),
        (Some(a), Some(b)) => return float_binary(op, a.as_float(), b.as_float()),
        _ => {}
    }
    match (op, lhs, rhs) {
        (HostFn::Eq, _, _) => Ok(V::Bool(lhs == rhs)),
        (HostFn::Ne, _, _) => Ok(V::Bool(lhs != rhs)),
        (HostFn::Add, V::Str(a), V::Str(b)) => Ok(V::Str(Arc::from(format!("{a}{b}")))),
        (HostFn::Add, V::Tuple(a), V::Tuple(b)) => Ok(V::Tuple(a.iter().chain(b).cloned().collect())),
        (HostFn::Add, V::List(a), V::List(b)) => Ok(V::List(a.iter().chain(b).cloned().collect())),
        (HostFn::Lt | HostFn::Le | HostFn::Gt | HostFn::Ge, V::Str(a), V::Str(b)) => {
            let ordering = a.cmp(b);
            Ok(V::Bool(match op {
                HostFn::Lt => ordering == Ordering::Less,
                HostFn::Le => ordering != Ordering::Greater,
                HostFn::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        _ => Err(HostError::Type(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            lhs.type_tag(),
            rhs.type_tag()
        ))),
    }
}

/// Applies `neg`, `abs` or `relu`.
pub fn unary(op: HostFn, value: &RuntimeValue) -> Result<RuntimeValue, HostError> {
    let overflow = || HostError::Overflow(format!("integer overflow in {op}"));
    match (op, value) {
        (_, RuntimeValue::Array(array)) => {
            let f: fn(f64) -> f64 = match op {
                HostFn::Neg => |x| -x,
                HostFn::Abs => f64::abs,
                HostFn::Relu => |x| x.max(0.0),
                _ => return Err(HostError::Type(format!("{op} is not unary"))),
            };
            Ok(RuntimeValue::array(array.map(array.dtype, f)))
        }
        (HostFn::Neg, RuntimeValue::Int(i)) => i.checked_neg().map(RuntimeValue::Int).ok_or_else(overflow),
        (HostFn::Abs, RuntimeValue::Int(i)) => i.checked_abs().map(RuntimeValue::Int).ok_or_else(overflow),
        (HostFn::Relu, RuntimeValue::Int(i)) => Ok(RuntimeValue::Int((*i).max(0))),
        (HostFn::Neg, RuntimeValue::Bool(b)) => Ok(RuntimeValue::Int(-i64::from(*b))),
        (HostFn::Abs | HostFn::Relu, RuntimeValue::Bool(b)) => Ok(RuntimeValue::Int(i64::from(*b))),
        (HostFn::Neg, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(-f)),
        (HostFn::Abs, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(f.abs())),
        (HostFn::Relu, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(f.max(0.0))),
        _ => Err(HostError::Type(format!(
            "bad operand type for {op}: '{}'",
            value.type_tag()
        ))),
    }
}

/// `len(value)`.
pub fn length(value: &RuntimeValue) -> Result<usize, HostError> {
    match value {
        RuntimeValue::Tuple(items) | RuntimeValue::List(items) => Ok(items.len()),
        RuntimeValue::Str(s) => Ok(s.chars().count()),
        RuntimeValue::Dict(map) => Ok(map.len()),
        RuntimeValue::Array(array) => array
            .shape
            .first()
            .copied()
            .ok_or_else(|| HostError::Type("len() of a 0-d array".to_string())),
        RuntimeValue::Module(module) => module
            .len()
            .ok_or_else(|| HostError::Type(format!("object of type '{}' has no len()", module.type_name))),
        other => Err(HostError::Type(format!(
            "object of type '{}' has no len()",
            other.type_tag()
        ))),
    }
}

/// `container[key]`.
pub fn subscript(container: &RuntimeValue, key: &RuntimeValue) -> Result<RuntimeValue, HostError> {
    use RuntimeValue as V;
    let out_of_range = |index: &i64| HostError::Index(format!("index {index} out of range"));
    match (container, key) {
        (V::Tuple(items) | V::List(items), V::Int(index)) => normalize_index(*index, items.len())
            .and_then(|position| items.get(position))
            .cloned()
            .ok_or_else(|| out_of_range(index)),
        (V::Tuple(items), V::Slice(slice)) => Ok(V::Tuple(select(items, &slice.indices(items.len())?))),
        (V::List(items), V::Slice(slice)) => Ok(V::List(select(items, &slice.indices(items.len())?))),
        (V::Str(s), V::Int(index)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*index, chars.len())
                .and_then(|position| chars.get(position))
                .map(|c| V::Str(Arc::from(c.to_string())))
                .ok_or_else(|| out_of_range(index))
        }
        (V::Dict(map), V::Int(_) | V::Str(_)) => {
            let dict_key = match key {
                V::Str(s) => DictKey::Str(s.clone()),
                V::Int(i) => DictKey::Int(*i),
                _ => return Err(HostError::Key(format!("unhashable type: '{}'", key.type_tag()))),
            };
            map.get(&dict_key)
                .cloned()
                .ok_or_else(|| HostError::Key(dict_key.to_string()))
        }
        (V::Array(array), V::Int(index)) => array.select(*index).map(V::array),
        (V::Module(module), V::Int(index)) if module.is_list_like() => module
            .child(*index)
            .cloned()
            .map(V::Module)
            .ok_or_else(|| out_of_range(index)),
        (V::Module(module), V::Slice(slice)) if module.is_list_like() => {
            let children: Vec<_> = module.children().cloned().collect();
            let picked = slice
                .indices(children.len())?
                .into_iter()
                .filter_map(|position| children.get(position).cloned())
                .collect();
            Ok(V::Module(ModuleObject::list(picked)))
        }
        _ => Err(HostError::Type(format!(
            "'{}' object is not subscriptable with '{}'",
            container.type_tag(),
            key.type_tag()
        ))),
    }
}

fn select(items: &[RuntimeValue], positions: &[usize]) -> Vec<RuntimeValue> {
    positions
        .iter()
        .filter_map(|position| items.get(*position).cloned())
        .collect()
}
