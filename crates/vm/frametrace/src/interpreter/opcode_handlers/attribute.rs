use std::sync::Arc;

use crate::errors::{BreakReason, HostError};
use crate::guards::GuardSource;
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::runtime::{HostFn, RuntimeValue};
use crate::value::{ArrayMeta, HostItem, Literal, SymbolicValue, ValueKind, propagate};

// Attribute Operations (2)
// Opcodes: LOAD_ATTR, LOAD_METHOD

fn lazy_attr(obj: &SymbolicValue, name: &str) -> SymbolicValue {
    SymbolicValue::derived(
        ValueKind::GetAttr {
            obj: Box::new(obj.clone()),
            name: Arc::from(name),
        },
        propagate([obj]),
    )
}

/// Nested attributes try the constant path first.
fn const_or_lazy(obj: &SymbolicValue, name: &str) -> SymbolicValue {
    match obj.get_const_attr(name) {
        Ok(literal) => SymbolicValue::derived(ValueKind::Constant(literal), propagate([obj])),
        Err(_) => lazy_attr(obj, name),
    }
}

fn no_attribute(obj: &SymbolicValue, name: &str) -> BreakReason {
    BreakReason::Host(HostError::Attribute(format!("{obj} has no attribute '{name}'")))
}

impl SymbolicInterpreter<'_> {
    // LOAD_ATTR and LOAD_METHOD operations
    //
    // Both push the attribute itself; the call that consumes a method pops
    // it like any other callable.
    pub fn op_load_attr(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let name = self.name_operand(arg)?;
        let [obj] = self.pop()?;
        let attr = self.get_attr(&obj, name)?;
        self.push(attr);
        Ok(OpcodeResult::Continue)
    }

    /// `obj.name`, folded to a constant whenever the attribute is provably
    /// one; otherwise a lazy attribute value that becomes a graph node only
    /// if used as one.
    pub(crate) fn get_attr(&mut self, obj: &SymbolicValue, name: &str) -> Result<SymbolicValue, BreakReason> {
        match obj.kind() {
            ValueKind::StructuredObject { key, module } => {
                let member = module.member(name).ok_or_else(|| no_attribute(obj, name))?;
                let kind = match member {
                    RuntimeValue::Module(child) => ValueKind::StructuredObject {
                        key: Arc::from(format!("{key}.{name}").as_str()),
                        module: child.clone(),
                    },
                    RuntimeValue::Array(array) => {
                        self.modules.register(key, module.clone());
                        let node = self.graph.get_attr(&format!("{key}.{name}"));
                        ValueKind::NumericArray(ArrayMeta::specialize(node, array, self.config.dynamic_shapes))
                    }
                    RuntimeValue::Function(function) => ValueKind::UserFunction(function.clone()),
                    RuntimeValue::HostFunction(function) => ValueKind::AllowedHost(HostItem::Function(*function)),
                    other => match Literal::from_runtime(other) {
                        Some(literal) => ValueKind::Constant(literal),
                        None => return Ok(lazy_attr(obj, name)),
                    },
                };
                Ok(SymbolicValue::derived(kind, propagate([obj])))
            }
            ValueKind::Unsupported { value, .. } => {
                let binding = obj
                    .initial_name()
                    .map(|base| (base, GuardSource::Local))
                    .or_else(|| obj.global_name().map(|base| (base, GuardSource::Global)));
                match binding {
                    Some((base, source)) => {
                        let live = value.get_attr(name)?;
                        let path = format!("{base}.{name}");
                        Ok(self.wrap(&live, &path, source)?.add_guards(obj.guards()))
                    }
                    None => Ok(const_or_lazy(obj, name)),
                }
            }
            ValueKind::NumericArray(_) => Ok(obj.const_attr(name).unwrap_or_else(|| lazy_attr(obj, name))),
            ValueKind::GetAttr { .. } => Ok(const_or_lazy(obj, name)),
            ValueKind::Scalar(_) => Ok(lazy_attr(obj, name)),
            ValueKind::PythonModule(module) => {
                let member = module.members.get(name).ok_or_else(|| no_attribute(obj, name))?;
                Ok(self.wrap_host_member(obj, member))
            }
            _ => Ok(SymbolicValue::derived(ValueKind::unknown(), propagate([obj]))),
        }
    }

    /// Array method referenced by a lazy attribute, if it names one.
    pub(crate) fn array_method(value: &SymbolicValue) -> Option<(HostFn, &SymbolicValue)> {
        match value.kind() {
            ValueKind::GetAttr { obj, name } if obj.is_node() => HostFn::method(name).map(|method| (method, &**obj)),
            _ => None,
        }
    }
}
