//! Module trees, attribute access and opaque host objects.

use std::sync::Arc;

use crate::errors::ValueError;
use crate::runtime::{DType, Device, HostFn, RuntimeValue, TypeTag};

use super::{Literal, SymbolicValue, ValueKind, propagate};

/// An allowed host-library entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostItem {
    Function(HostFn),
    DType(DType),
    Device(Device),
}

impl HostItem {
    pub fn type_tag(self) -> TypeTag {
        match self {
            HostItem::Function(_) => TypeTag::HostFunction,
            HostItem::DType(_) => TypeTag::DType,
            HostItem::Device(_) => TypeTag::Device,
        }
    }
}

fn not_constant(name: &str, reason: impl Into<String>) -> ValueError {
    ValueError::AttributeNotConstant {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn literal_member(value: Option<&RuntimeValue>, name: &str) -> Result<Literal, ValueError> {
    let value = value.ok_or_else(|| not_constant(name, "no such attribute"))?;
    Literal::from_runtime(value).ok_or_else(|| not_constant(name, format!("{} is not a literal", value.type_tag())))
}

impl SymbolicValue {
    /// A module registered at `key`.
    pub fn structured(key: &str, module: Arc<crate::runtime::ModuleObject>) -> SymbolicValue {
        SymbolicValue::new(ValueKind::StructuredObject {
            key: Arc::from(key),
            module,
        })
    }

    /// One value per child of a list-like module, keyed `<key>.<index>`.
    pub fn expand_module_list(&self) -> Result<Vec<SymbolicValue>, ValueError> {
        let ValueKind::StructuredObject { key, module } = self.kind() else {
            return Err(ValueError::NotConstant(format!("{self} is not a module")));
        };
        if !module.is_list_like() {
            return Err(ValueError::NotConstant(format!("{} is not a module list", module.type_name)));
        }
        Ok(module
            .children()
            .enumerate()
            .map(|(index, child)| {
                SymbolicValue::structured(&format!("{key}.{index}"), child.clone()).with_propagation(propagate([self]))
            })
            .collect())
    }

    /// The child at a constant `index` of a list-like module. Siblings are
    /// never materialized.
    pub fn index_module(&self, index: i64, key_value: &SymbolicValue) -> Result<SymbolicValue, ValueError> {
        let ValueKind::StructuredObject { key, module } = self.kind() else {
            return Err(ValueError::NotConstant(format!("{self} is not a module")));
        };
        let len = module
            .len()
            .ok_or_else(|| ValueError::NotConstant(format!("{} is not a module list", module.type_name)))?;
        let position = crate::runtime::array::normalize_index(index, len)
            .ok_or_else(|| ValueError::NotConstant(format!("module index {index} out of range")))?;
        let child = module
            .child(index)
            .ok_or_else(|| ValueError::NotConstant(format!("module index {index} out of range")))?;
        Ok(SymbolicValue::structured(&format!("{key}.{position}"), child.clone())
            .with_propagation(propagate([self, key_value])))
    }

    /// A nested attribute proven to be a compile-time literal.
    ///
    /// Works on attribute-access values whose object is a module or an opaque
    /// object, on modules themselves and on unsupported objects.
    pub fn get_const_attr(&self, name: &str) -> Result<Literal, ValueError> {
        match self.kind() {
            ValueKind::GetAttr { obj, name: step } => {
                let intermediate = match obj.kind() {
                    ValueKind::StructuredObject { module, .. } => module.member(step).cloned(),
                    ValueKind::Unsupported { value, .. } => value.get_attr(step).ok(),
                    _ => None,
                }
                .ok_or_else(|| not_constant(name, format!("cannot resolve {self}")))?;
                match &intermediate {
                    RuntimeValue::Module(module) => literal_member(module.member(name), name),
                    RuntimeValue::Object(object) => literal_member(object.attrs.get(name), name),
                    other => Err(not_constant(name, format!("{} has no constant attributes", other.type_tag()))),
                }
            }
            ValueKind::StructuredObject { module, .. } => literal_member(module.member(name), name),
            ValueKind::Unsupported { value: RuntimeValue::Object(object), .. } => {
                literal_member(object.attrs.get(name), name)
            }
            _ => Err(not_constant(name, format!("{self} has no constant attributes"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{HostObject, ModuleKind, ModuleObject};

    fn layers() -> (SymbolicValue, Vec<Arc<ModuleObject>>) {
        let children: Vec<_> = (0..3)
            .map(|i| ModuleObject::leaf(&format!("L{i}"), HostFn::Relu))
            .collect();
        let list = ModuleObject::list(children.clone());
        let guard = crate::guards::Guard::new("m", crate::guards::GuardSource::Local, crate::guards::GuardCheck::IdMatch(list.id));
        (SymbolicValue::structured("m.layers", list).add_guard(guard), children)
    }

    #[test]
    fn indexing_a_module_list_materializes_one_child() {
        let (list, children) = layers();
        let child = list.index_module(-1, &SymbolicValue::constant(-1)).unwrap();
        match child.kind() {
            ValueKind::StructuredObject { key, module } => {
                assert_eq!(&**key, "m.layers.2");
                assert_eq!(module.id, children[2].id);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(child.guards(), list.guards());
        assert!(list.index_module(3, &SymbolicValue::constant(3)).is_err());
    }

    #[test]
    fn expanding_a_module_list_keys_every_child() {
        let (list, _) = layers();
        let keys: Vec<_> = list
            .expand_module_list()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            keys,
            vec![
                "StructuredObject(m.layers.0)",
                "StructuredObject(m.layers.1)",
                "StructuredObject(m.layers.2)"
            ]
        );
    }

    #[test]
    fn const_attr_through_a_module_member() {
        let config = HostObject::new("Config", [("hidden", RuntimeValue::Int(64)), ("act", RuntimeValue::HostFunction(HostFn::Relu))]);
        let model = ModuleObject::new("Net", ModuleKind::Container, [("config", RuntimeValue::Object(config)), ("depth", RuntimeValue::Int(2))]);
        let m = SymbolicValue::structured("m", model);
        let attr = SymbolicValue::new(ValueKind::GetAttr {
            obj: Box::new(m.clone()),
            name: Arc::from("config"),
        });
        assert_eq!(attr.get_const_attr("hidden").unwrap(), Literal::Int(64));
        assert!(matches!(attr.get_const_attr("act"), Err(ValueError::AttributeNotConstant { .. })));
        assert!(matches!(attr.get_const_attr("missing"), Err(ValueError::AttributeNotConstant { .. })));
        assert_eq!(m.get_const_attr("depth").unwrap(), Literal::Int(2));
        assert!(SymbolicValue::constant(1).get_const_attr("real").is_err());
    }
}
