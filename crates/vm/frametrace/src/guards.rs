//! Guards: the runtime preconditions a compiled artifact relies on.
//!
//! A guard names a binding (a local or global, optionally followed by
//! attribute and index steps such as `xs[1]` or `m.layer`) and a check to run
//! against the live value found there. Guards are plain data: they hash and
//! compare structurally, so two artifacts with the same preconditions have
//! equal guard sets regardless of the order in which tracing produced them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::runtime::array::ArrayValue;
use crate::runtime::{
    BuiltinOp, DType, Device, DictKey, HostFn, LiveEnvironment, ObjectId, RuntimeValue, TypeTag, ops,
};
use crate::value::Literal;

/// Where a guarded binding lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuardSource {
    Local,
    Global,
}

impl fmt::Display for GuardSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardSource::Local => write!(f, "LOCAL"),
            GuardSource::Global => write!(f, "GLOBAL"),
        }
    }
}

/// Array properties an `ArrayMatch` guard pins down.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArraySpec {
    pub dtype: DType,
    pub device: Device,
    pub ndim: usize,
    /// Present only when shapes are specialized.
    pub shape: Option<Vec<usize>>,
    pub strides: Option<Vec<usize>>,
}

impl ArraySpec {
    pub fn of(array: &ArrayValue, dynamic_shapes: bool) -> Self {
        Self {
            dtype: array.dtype,
            device: array.device,
            ndim: array.ndim(),
            shape: (!dynamic_shapes).then(|| array.shape.clone()),
            strides: (!dynamic_shapes).then(|| array.strides.clone()),
        }
    }

    fn mismatch(&self, array: &ArrayValue) -> Option<String> {
        if array.dtype != self.dtype {
            return Some(format!("dtype {} != {}", array.dtype, self.dtype));
        }
        if array.device != self.device {
            return Some(format!("device {} != {}", array.device, self.device));
        }
        if array.ndim() != self.ndim {
            return Some(format!("ndim {} != {}", array.ndim(), self.ndim));
        }
        if let Some(shape) = &self.shape {
            if &array.shape != shape {
                return Some(format!("shape {:?} != {shape:?}", array.shape));
            }
        }
        if let Some(strides) = &self.strides {
            if &array.strides != strides {
                return Some(format!("strides {:?} != {strides:?}", array.strides));
            }
        }
        None
    }
}

/// The predicate a guard evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuardCheck {
    TypeMatch(TypeTag),
    ConstantMatch(Literal),
    IdMatch(ObjectId),
    ArrayMatch(ArraySpec),
    LengthMatch(usize),
    /// A dict holding exactly these keys, in sorted order.
    KeysMatch(Vec<DictKey>),
    /// Same host function or builtin.
    HostMatch(HostKey),
    /// Nothing bound under the name. A missing binding is the passing case.
    Unbound,
}

/// Identity of a stateless host callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostKey {
    HostFunction(HostFn),
    Builtin(BuiltinOp),
}

impl GuardCheck {
    /// `Err(reason)` when `value` does not satisfy the check.
    pub fn evaluate(&self, value: &RuntimeValue) -> Result<(), String> {
        match self {
            GuardCheck::TypeMatch(tag) => {
                let actual = value.type_tag();
                if &actual == tag { Ok(()) } else { Err(format!("type {actual} != {tag}")) }
            }
            GuardCheck::ConstantMatch(expected) => match Literal::from_runtime(value) {
                Some(actual) if &actual == expected => Ok(()),
                Some(actual) => Err(format!("{actual} != {expected}")),
                None => Err(format!("{} is not a literal", value.type_tag())),
            },
            GuardCheck::IdMatch(expected) => match value.object_id() {
                Some(actual) if actual == *expected => Ok(()),
                Some(actual) => Err(format!("id {actual} != {expected}")),
                None => Err(format!("{} has no identity", value.type_tag())),
            },
            GuardCheck::ArrayMatch(spec) => match value {
                RuntimeValue::Array(array) => spec.mismatch(array).map_or(Ok(()), Err),
                other => Err(format!("type {} != array", other.type_tag())),
            },
            GuardCheck::LengthMatch(expected) => match value {
                RuntimeValue::Tuple(items) | RuntimeValue::List(items) if items.len() == *expected => Ok(()),
                RuntimeValue::Tuple(items) | RuntimeValue::List(items) => {
                    Err(format!("len {} != {expected}", items.len()))
                }
                other => Err(format!("{} has no length", other.type_tag())),
            },
            GuardCheck::KeysMatch(expected) => match value {
                RuntimeValue::Dict(entries) if entries.keys().eq(expected.iter()) => Ok(()),
                RuntimeValue::Dict(entries) => Err(format!(
                    "keys [{}] != [{}]",
                    join_keys(entries.keys()),
                    join_keys(expected.iter())
                )),
                other => Err(format!("type {} != dict", other.type_tag())),
            },
            GuardCheck::HostMatch(expected) => {
                let actual = match value {
                    RuntimeValue::HostFunction(function) => Some(HostKey::HostFunction(*function)),
                    RuntimeValue::Builtin(builtin) => Some(HostKey::Builtin(*builtin)),
                    _ => None,
                };
                if actual == Some(*expected) {
                    Ok(())
                } else {
                    Err(format!("{} is not {expected:?}", value.type_tag()))
                }
            }
            GuardCheck::Unbound => Err(format!("bound to {}", value.type_tag())),
        }
    }
}

fn join_keys<'k>(keys: impl Iterator<Item = &'k DictKey>) -> String {
    keys.map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for GuardCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardCheck::TypeMatch(tag) => write!(f, "TYPE_MATCH({tag})"),
            GuardCheck::ConstantMatch(literal) => write!(f, "CONSTANT_MATCH({literal})"),
            GuardCheck::IdMatch(id) => write!(f, "ID_MATCH({id})"),
            GuardCheck::ArrayMatch(spec) => {
                write!(f, "ARRAY_MATCH({}, {}, ndim={}", spec.dtype, spec.device, spec.ndim)?;
                if let Some(shape) = &spec.shape {
                    write!(f, ", shape={shape:?}")?;
                }
                if let Some(strides) = &spec.strides {
                    write!(f, ", strides={strides:?}")?;
                }
                write!(f, ")")
            }
            GuardCheck::LengthMatch(len) => write!(f, "LENGTH_MATCH({len})"),
            GuardCheck::KeysMatch(keys) => write!(f, "KEYS_MATCH([{}])", join_keys(keys.iter())),
            GuardCheck::HostMatch(key) => write!(f, "HOST_MATCH({key:?})"),
            GuardCheck::Unbound => write!(f, "UNBOUND"),
        }
    }
}

/// A single runtime precondition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guard {
    name: Arc<str>,
    source: GuardSource,
    check: GuardCheck,
}

impl Guard {
    pub fn new(name: &str, source: GuardSource, check: GuardCheck) -> Self {
        Self {
            name: Arc::from(name),
            source,
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> GuardSource {
        self.source
    }

    pub fn check(&self) -> &GuardCheck {
        &self.check
    }

    /// Evaluates the guard against the live environment. Missing bindings and
    /// unresolvable paths count as failures, except for [`GuardCheck::Unbound`].
    pub fn validate(&self, env: &dyn LiveEnvironment) -> Result<(), GuardFailure> {
        let fail = |reason: String| GuardFailure {
            guard: self.clone(),
            reason,
        };
        let value = match resolve_binding(env, &self.name, self.source) {
            Err(PathError::Unbound(_)) if self.check == GuardCheck::Unbound => return Ok(()),
            resolved => resolved.map_err(|err| fail(err.to_string()))?,
        };
        self.check.evaluate(&value).map_err(fail)
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' {}", self.source, self.name, self.check)
    }
}

/// Guard sets compare independent of insertion order.
pub type GuardSet = BTreeSet<Guard>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("guard {guard} failed: {reason}")]
pub struct GuardFailure {
    pub guard: Guard,
    pub reason: String,
}

/// Checks every guard; the first failure rejects the whole set.
pub fn check_guards(guards: &GuardSet, env: &dyn LiveEnvironment) -> Result<(), GuardFailure> {
    guards.iter().try_for_each(|guard| guard.validate(env))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("malformed binding path `{0}`")]
    Malformed(String),
    #[error("`{0}` is not bound")]
    Unbound(String),
    #[error("cannot resolve `{path}`: {reason}")]
    Step { path: String, reason: String },
}

/// One step of a binding path after its root name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Attr(String),
    Index(DictKey),
}

/// A parsed binding path: `name(.attr | [index])*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    pub root: String,
    pub steps: Vec<PathStep>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl BindingPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let malformed = || PathError::Malformed(path.to_string());
        let root_end = path.find(['.', '[']).unwrap_or(path.len());
        let (root, mut rest) = path.split_at(root_end);
        if !is_identifier(root) {
            return Err(malformed());
        }
        let mut steps = Vec::new();
        while !rest.is_empty() {
            if let Some(after_dot) = rest.strip_prefix('.') {
                let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
                let (attr, tail) = after_dot.split_at(end);
                // Module list members are addressed as `m.layers.2`.
                if attr.is_empty() || !(is_identifier(attr) || attr.chars().all(|c| c.is_ascii_digit())) {
                    return Err(malformed());
                }
                steps.push(PathStep::Attr(attr.to_string()));
                rest = tail;
            } else if let Some(after_bracket) = rest.strip_prefix('[') {
                let end = after_bracket.find(']').ok_or_else(malformed)?;
                let (inner, tail) = after_bracket.split_at(end);
                let key = if let Some(quoted) = inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
                    DictKey::Str(Arc::from(quoted))
                } else {
                    DictKey::Int(inner.parse().map_err(|_| malformed())?)
                };
                steps.push(PathStep::Index(key));
                rest = tail.strip_prefix(']').ok_or_else(malformed)?;
            } else {
                return Err(malformed());
            }
        }
        Ok(Self {
            root: root.to_string(),
            steps,
        })
    }

    pub fn resolve(&self, env: &dyn LiveEnvironment, source: GuardSource) -> Result<RuntimeValue, PathError> {
        let mut value = env
            .lookup(&self.root, source)
            .ok_or_else(|| PathError::Unbound(self.root.clone()))?;
        for step in &self.steps {
            let next = match step {
                PathStep::Attr(name) => value.get_attr(name),
                PathStep::Index(DictKey::Int(index)) => ops::subscript(&value, &RuntimeValue::Int(*index)),
                PathStep::Index(DictKey::Str(key)) => ops::subscript(&value, &RuntimeValue::Str(key.clone())),
            };
            value = next.map_err(|err| PathError::Step {
                path: self.to_string(),
                reason: err.to_string(),
            })?;
        }
        Ok(value)
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                PathStep::Attr(name) => write!(f, ".{name}")?,
                PathStep::Index(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

/// Resolves a binding path string against the live environment.
pub fn resolve_binding(env: &dyn LiveEnvironment, path: &str, source: GuardSource) -> Result<RuntimeValue, PathError> {
    BindingPath::parse(path)?.resolve(env, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Frame, HostObject, ModuleKind, ModuleObject};

    fn array(shape: Vec<usize>) -> RuntimeValue {
        RuntimeValue::array(ArrayValue::full(shape, 0.0))
    }

    #[test]
    fn binding_paths_parse_and_print() {
        for path in ["x", "xs[1]", "m.layers.2", "cfg.sizes[0]", "d['k']"] {
            assert_eq!(BindingPath::parse(path).unwrap().to_string(), path);
        }
        for bad in ["", "1x", "x.", "x[", "x[a]", "x]"] {
            assert!(BindingPath::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn paths_resolve_through_containers_and_modules() {
        let list = ModuleObject::list(vec![ModuleObject::leaf("A", HostFn::Relu)]);
        let holder = ModuleObject::new("Net", ModuleKind::Container, [("layers", RuntimeValue::Module(list))]);
        let frame = Frame::new()
            .with_local("xs", RuntimeValue::List(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]))
            .with_global("m", RuntimeValue::Module(holder));
        assert_eq!(resolve_binding(&frame, "xs[-1]", GuardSource::Local).unwrap(), RuntimeValue::Int(2));
        let leaf = resolve_binding(&frame, "m.layers.0", GuardSource::Global).unwrap();
        assert_eq!(leaf.type_tag().to_string(), "A");
        assert!(matches!(
            resolve_binding(&frame, "m", GuardSource::Local),
            Err(PathError::Unbound(_))
        ));
        assert!(matches!(
            resolve_binding(&frame, "xs[5]", GuardSource::Local),
            Err(PathError::Step { .. })
        ));
    }

    #[test]
    fn array_match_respects_specialization() {
        let x = ArrayValue::full(vec![4, 2], 0.0);
        let frame = Frame::new().with_local("x", array(vec![7, 2]));
        let specialized = Guard::new("x", GuardSource::Local, GuardCheck::ArrayMatch(ArraySpec::of(&x, false)));
        let dynamic = Guard::new("x", GuardSource::Local, GuardCheck::ArrayMatch(ArraySpec::of(&x, true)));
        let failure = specialized.validate(&frame).unwrap_err();
        assert!(failure.reason.contains("shape"));
        assert!(dynamic.validate(&frame).is_ok());
    }

    #[test]
    fn missing_bindings_fail_instead_of_erroring() {
        let guard = Guard::new("y", GuardSource::Local, GuardCheck::ConstantMatch(Literal::Int(1)));
        let failure = guard.validate(&Frame::new()).unwrap_err();
        assert_eq!(failure.guard, guard);
    }

    #[test]
    fn constant_and_identity_checks() {
        let object = HostObject::new("Cfg", []);
        let frame = Frame::new()
            .with_local("n", RuntimeValue::Int(3))
            .with_local("cfg", RuntimeValue::Object(object.clone()));
        let guards: GuardSet = [
            Guard::new("n", GuardSource::Local, GuardCheck::ConstantMatch(Literal::Int(3))),
            Guard::new("cfg", GuardSource::Local, GuardCheck::IdMatch(object.id)),
        ]
        .into_iter()
        .collect();
        assert!(check_guards(&guards, &frame).is_ok());
        let mut stricter = guards.clone();
        stricter.insert(Guard::new("n", GuardSource::Local, GuardCheck::ConstantMatch(Literal::Float(3.0))));
        assert!(check_guards(&stricter, &frame).is_err());
    }

    #[test]
    fn unbound_guards_pass_only_while_the_name_is_missing() {
        let guard = Guard::new("len", GuardSource::Global, GuardCheck::Unbound);
        assert!(guard.validate(&Frame::new()).is_ok());
        // A local of the same name does not shadow a global lookup.
        assert!(guard.validate(&Frame::new().with_local("len", RuntimeValue::Int(1))).is_ok());

        let shadowed = Frame::new().with_global("len", RuntimeValue::Builtin(BuiltinOp::Max));
        let failure = guard.validate(&shadowed).unwrap_err();
        assert!(failure.reason.starts_with("bound to"));
        assert_eq!(guard.to_string(), "GLOBAL 'len' UNBOUND");
    }

    #[test]
    fn keys_match_requires_the_exact_key_set() {
        let dict = |keys: &[&str]| {
            RuntimeValue::Dict(keys.iter().map(|key| (DictKey::Str(Arc::from(*key)), RuntimeValue::Int(0))).collect())
        };
        let check = GuardCheck::KeysMatch(vec![DictKey::Str(Arc::from("a"))]);
        assert!(check.evaluate(&dict(&["a"])).is_ok());
        let grown = check.evaluate(&dict(&["a", "b"])).unwrap_err();
        assert_eq!(grown, "keys ['a', 'b'] != ['a']");
        assert!(check.evaluate(&dict(&[])).is_err());
        assert!(check.evaluate(&RuntimeValue::Int(1)).is_err());
        assert_eq!(check.to_string(), "KEYS_MATCH(['a'])");
    }

    #[test]
    fn guard_sets_ignore_insertion_order() {
        let a = Guard::new("a", GuardSource::Local, GuardCheck::LengthMatch(1));
        let b = Guard::new("b", GuardSource::Global, GuardCheck::TypeMatch(TypeTag::Int));
        let forward: GuardSet = [a.clone(), b.clone()].into_iter().collect();
        let backward: GuardSet = [b, a].into_iter().collect();
        assert_eq!(forward, backward);
    }
}
