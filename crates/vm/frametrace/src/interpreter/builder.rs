//! Variable builder: turns live frame values into guarded symbolic values.
//!
//! Every value read from the frame is wrapped exactly once, under the
//! binding path it was reached through (`x`, `xs[1]`, `cfg.hidden`). The
//! guard attached to the wrapped value is what lets a later call reuse the
//! artifact: it pins down exactly the properties the trace specialized on.

use std::collections::BTreeMap;

use crate::errors::BreakReason;
use crate::guards::{ArraySpec, Guard, GuardCheck, GuardSource, HostKey};
use crate::jit::types::InputBinding;
use crate::runtime::{DType, RuntimeValue, TypeTag};
use crate::value::{ArrayMeta, HostItem, Literal, SequenceKind, SymbolicValue, ValueKind, propagate};

use super::SymbolicInterpreter;

impl SymbolicInterpreter<'_> {
    /// Value of the local `name`, wrapping it on first use.
    pub(crate) fn load_local(&mut self, name: &str) -> Result<SymbolicValue, BreakReason> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        let live = self
            .env
            .lookup(name, GuardSource::Local)
            .ok_or_else(|| BreakReason::UnboundName(name.to_string()))?;
        let value = self.wrap(&live, name, GuardSource::Local)?;
        self.locals.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Value of the global `name`, falling back to the builtins.
    pub(crate) fn load_global(&mut self, name: &str) -> Result<SymbolicValue, BreakReason> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        let value = match self.env.lookup(name, GuardSource::Global) {
            Some(live) => self.wrap(&live, name, GuardSource::Global)?,
            None => {
                let builtin = name
                    .parse()
                    .map_err(|_| BreakReason::UnboundName(name.to_string()))?;
                // Binding the name later must invalidate what was traced here.
                let unbound = Guard::new(name, GuardSource::Global, GuardCheck::Unbound);
                SymbolicValue::new(ValueKind::Builtin(builtin)).add_guard(unbound)
            }
        };
        self.globals.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Wraps the live value bound at `path`.
    pub(crate) fn wrap(
        &mut self,
        live: &RuntimeValue,
        path: &str,
        source: GuardSource,
    ) -> Result<SymbolicValue, BreakReason> {
        let (value, check) = match live {
            RuntimeValue::Array(array) => {
                let node = self.input_placeholder(path, source);
                let meta = ArrayMeta::specialize(node, array, self.config.dynamic_shapes);
                (
                    SymbolicValue::new(ValueKind::NumericArray(meta)),
                    GuardCheck::ArrayMatch(ArraySpec::of(array, self.config.dynamic_shapes)),
                )
            }
            RuntimeValue::Int(_) | RuntimeValue::Float(_) if !self.config.specialize_scalars => {
                let node = self.input_placeholder(path, source);
                let (dtype, tag) = match live {
                    RuntimeValue::Int(_) => (DType::Int64, TypeTag::Int),
                    _ => (DType::Float64, TypeTag::Float),
                };
                (
                    SymbolicValue::new(ValueKind::Scalar(ArrayMeta::scalar(node, Some(dtype)))),
                    GuardCheck::TypeMatch(tag),
                )
            }
            RuntimeValue::Tuple(items) | RuntimeValue::List(items) => {
                let kind = match live {
                    RuntimeValue::Tuple(_) => SequenceKind::Tuple,
                    _ => SequenceKind::List,
                };
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.wrap(item, &format!("{path}[{index}]"), source))
                    .collect::<Result<Vec<_>, _>>()?;
                (SymbolicValue::sequence(kind, items), GuardCheck::LengthMatch(items_len(live)))
            }
            RuntimeValue::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    let wrapped = self.wrap(item, &format!("{path}[{key}]"), source)?;
                    map.insert(key.clone(), wrapped);
                }
                let options = propagate(map.values());
                (
                    SymbolicValue::derived(ValueKind::ConstDict(map), options),
                    GuardCheck::KeysMatch(entries.keys().cloned().collect()),
                )
            }
            RuntimeValue::Module(module) => (
                SymbolicValue::structured(path, module.clone()),
                GuardCheck::IdMatch(module.id),
            ),
            RuntimeValue::Function(function) => (
                SymbolicValue::new(ValueKind::UserFunction(function.clone())),
                GuardCheck::IdMatch(function.id),
            ),
            RuntimeValue::HostFunction(function) => (
                SymbolicValue::new(ValueKind::AllowedHost(HostItem::Function(*function))),
                GuardCheck::HostMatch(HostKey::HostFunction(*function)),
            ),
            RuntimeValue::Builtin(builtin) => (
                SymbolicValue::new(ValueKind::Builtin(*builtin)),
                GuardCheck::HostMatch(HostKey::Builtin(*builtin)),
            ),
            RuntimeValue::HostModule(module) => (
                SymbolicValue::new(ValueKind::PythonModule(module.clone())),
                GuardCheck::IdMatch(module.id),
            ),
            RuntimeValue::Object(_) | RuntimeValue::Method(_) => {
                let ty = live.type_tag();
                (
                    SymbolicValue::new(ValueKind::Unsupported {
                        value: live.clone(),
                        ty: ty.clone(),
                    }),
                    GuardCheck::TypeMatch(ty),
                )
            }
            other => {
                let literal = Literal::from_runtime(other).ok_or_else(|| {
                    BreakReason::Unsupported(format!("cannot wrap {} at `{path}`", other.type_tag()))
                })?;
                (SymbolicValue::constant(literal.clone()), GuardCheck::ConstantMatch(literal))
            }
        };
        let value = match source {
            GuardSource::Local => value.with_initial_name(path),
            GuardSource::Global => value.with_global_name(path),
        };
        let guard = value.create_guard(check)?;
        Ok(value.add_guard(guard))
    }

    /// Wraps a member of a host module. Host modules are pinned by identity,
    /// so their members need no guards of their own.
    pub(crate) fn wrap_host_member(&self, module: &SymbolicValue, live: &RuntimeValue) -> SymbolicValue {
        let kind = match live {
            RuntimeValue::HostFunction(function) => ValueKind::AllowedHost(HostItem::Function(*function)),
            RuntimeValue::DType(dtype) => ValueKind::AllowedHost(HostItem::DType(*dtype)),
            RuntimeValue::Device(device) => ValueKind::AllowedHost(HostItem::Device(*device)),
            RuntimeValue::Builtin(builtin) => ValueKind::Builtin(*builtin),
            RuntimeValue::HostModule(inner) => ValueKind::PythonModule(inner.clone()),
            other => match Literal::from_runtime(other) {
                Some(literal) => ValueKind::Constant(literal),
                None => ValueKind::Unsupported {
                    value: other.clone(),
                    ty: other.type_tag(),
                },
            },
        };
        SymbolicValue::derived(kind, propagate([module]))
    }

    /// Graph input for the frame binding at `path`.
    fn input_placeholder(&mut self, path: &str, source: GuardSource) -> crate::graph::NodeId {
        let node = self.graph.placeholder(path);
        if !self.inputs.iter().any(|input| input.name == path && input.source == source) {
            self.inputs.push(InputBinding {
                name: path.to_string(),
                source,
            });
        }
        node
    }
}

fn items_len(value: &RuntimeValue) -> usize {
    match value {
        RuntimeValue::Tuple(items) | RuntimeValue::List(items) => items.len(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::code::CodeUnit;
    use crate::jit::types::EngineConfig;
    use crate::runtime::{ArrayValue, DictKey, Frame, HostModule, HostObject, ModuleObject};

    fn code() -> CodeUnit {
        CodeUnit::new("f", Vec::new())
    }

    #[test]
    fn arrays_become_guarded_placeholders() {
        let code = code();
        let frame = Frame::new().with_local("x", ArrayValue::full(vec![5], 1.0));
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);

        let x = interp.load_local("x").unwrap();
        assert!(matches!(x.kind(), ValueKind::NumericArray(meta) if meta.shape == Some(vec![5])));
        assert_eq!(x.guards().len(), 1);
        assert_eq!(interp.inputs, vec![InputBinding { name: "x".to_string(), source: GuardSource::Local }]);

        // A second read reuses the wrapped value.
        let again = interp.load_local("x").unwrap();
        assert_eq!(again.identity_key(), x.identity_key());
        assert_eq!(interp.inputs.len(), 1);
    }

    #[test]
    fn scalars_follow_the_specialization_switch() {
        let code = code();
        let frame = Frame::new().with_local("n", 3i64);
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
        let n = interp.load_local("n").unwrap();
        assert_eq!(n.as_constant().unwrap(), Literal::Int(3));
        let guard = n.guards().iter().next().unwrap();
        assert_eq!(guard.check(), &GuardCheck::ConstantMatch(Literal::Int(3)));

        let config = EngineConfig {
            specialize_scalars: false,
            ..EngineConfig::default()
        };
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
        let n = interp.load_local("n").unwrap();
        assert!(matches!(n.kind(), ValueKind::Scalar(_)));
        let guard = n.guards().iter().next().unwrap();
        assert_eq!(guard.check(), &GuardCheck::TypeMatch(TypeTag::Int));
        assert_eq!(interp.inputs.len(), 1);
    }

    #[test]
    fn sequence_items_are_wrapped_under_indexed_paths() {
        let code = code();
        let frame = Frame::new().with_local("xs", RuntimeValue::List(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]));
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
        let xs = interp.load_local("xs").unwrap();
        let names: Vec<_> = xs.guards().iter().map(|guard| guard.name().to_string()).collect();
        assert_eq!(names, vec!["xs", "xs[0]", "xs[1]"]);
        assert!(xs.guards().iter().any(|guard| guard.check() == &GuardCheck::LengthMatch(2)));
    }

    #[test]
    fn modules_and_objects_are_pinned() {
        let code = code();
        let model = ModuleObject::leaf("ReLU", crate::runtime::HostFn::Relu);
        let config_object = HostObject::new("Config", []);
        let frame = Frame::new()
            .with_local("m", RuntimeValue::Module(model.clone()))
            .with_local("cfg", RuntimeValue::Object(config_object))
            .with_global("ops", RuntimeValue::HostModule(HostModule::standard_ops()));
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);

        let m = interp.load_local("m").unwrap();
        assert!(matches!(m.kind(), ValueKind::StructuredObject { key, .. } if &**key == "m"));
        assert!(m.guards().iter().all(|guard| guard.check() == &GuardCheck::IdMatch(model.id)));

        let cfg = interp.load_local("cfg").unwrap();
        assert_eq!(cfg.state(), crate::value::SupportState::Unsupported);
        assert!(cfg
            .guards()
            .iter()
            .all(|guard| guard.check() == &GuardCheck::TypeMatch(TypeTag::Object(Arc::from("Config")))));

        let ops = interp.load_global("ops").unwrap();
        assert!(matches!(ops.kind(), ValueKind::PythonModule(_)));
        assert_eq!(ops.guards().iter().next().unwrap().source(), GuardSource::Global);
    }

    #[test]
    fn unknown_globals_resolve_to_builtins() {
        let code = code();
        let frame = Frame::new();
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
        let len = interp.load_global("len").unwrap();
        assert!(matches!(len.kind(), ValueKind::Builtin(crate::runtime::BuiltinOp::Len)));
        let guards: Vec<_> = len.guards().iter().map(ToString::to_string).collect();
        assert_eq!(guards, vec!["GLOBAL 'len' UNBOUND"]);
        assert!(matches!(interp.load_global("nope"), Err(BreakReason::UnboundName(_))));
        assert!(matches!(interp.load_local("x"), Err(BreakReason::UnboundName(_))));
    }

    #[test]
    fn dict_items_use_quoted_key_paths() {
        let code = code();
        let mut entries = BTreeMap::new();
        entries.insert(DictKey::Str(Arc::from("scale")), RuntimeValue::Float(0.5));
        let frame = Frame::new().with_local("d", RuntimeValue::Dict(entries));
        let config = EngineConfig::default();
        let mut interp = SymbolicInterpreter::new(&code, &frame, &config);
        let d = interp.load_local("d").unwrap();
        assert!(d.guards().iter().any(|guard| guard.name() == "d['scale']"));
        assert!(d.guards().iter().any(|guard| guard.name() == "d"
            && guard.check() == &GuardCheck::KeysMatch(vec![DictKey::Str(Arc::from("scale"))])));
    }
}
