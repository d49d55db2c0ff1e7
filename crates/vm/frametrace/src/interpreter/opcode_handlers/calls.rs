use crate::errors::BreakReason;
use crate::graph::NodeId;
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::runtime::{BuiltinOp, DType, HostFn, ModuleKind, ModuleObject, RuntimeValue, ops};
use crate::value::{ArrayMeta, HostItem, Literal, SymbolicValue, ValueKind, propagate};

use super::is_graph_operand;

// Call Operations (2)
// Opcodes: CALL_FUNCTION, CALL_METHOD

/// Output metadata of calling `module` on an input described by `input`.
fn module_output(module: &ModuleObject, node: NodeId, input: Option<&ArrayMeta>, dynamic_shapes: bool) -> ArrayMeta {
    match &module.kind {
        ModuleKind::Leaf(HostFn::Sum) => input.map_or_else(|| ArrayMeta::unknown(node), |meta| ArrayMeta::reduced(node, meta)),
        ModuleKind::Leaf(function) if function.is_elementwise() => ArrayMeta::broadcast(node, *function, input, None),
        ModuleKind::Scale => {
            let weight = match module.member("weight") {
                Some(RuntimeValue::Array(array)) => ArrayMeta::specialize(node, array, dynamic_shapes),
                Some(RuntimeValue::Int(_)) => ArrayMeta::scalar(node, Some(DType::Int64)),
                Some(RuntimeValue::Float(_)) => ArrayMeta::scalar(node, Some(DType::Float64)),
                _ => ArrayMeta::unknown(node),
            };
            ArrayMeta::broadcast(node, HostFn::Mul, input, Some(&weight))
        }
        ModuleKind::Sequential => {
            let mut meta = input.cloned();
            for child in module.children() {
                meta = Some(module_output(child, node, meta.as_ref(), dynamic_shapes));
            }
            meta.unwrap_or_else(|| ArrayMeta::unknown(node))
        }
        _ => ArrayMeta::unknown(node),
    }
}

fn all_constant(args: &[SymbolicValue]) -> Option<Vec<RuntimeValue>> {
    args.iter()
        .map(|arg| arg.as_constant().ok().map(|literal| literal.to_runtime()))
        .collect()
}

impl SymbolicInterpreter<'_> {
    // CALL_FUNCTION and CALL_METHOD operations
    pub fn op_call(&mut self, argc: u32) -> Result<OpcodeResult, BreakReason> {
        let args = self.pop_n(argc)?;
        let [callable] = self.pop()?;
        let result = self.call(&callable, &args)?;
        self.push(result);
        Ok(OpcodeResult::Continue)
    }

    pub(crate) fn call(&mut self, callable: &SymbolicValue, args: &[SymbolicValue]) -> Result<SymbolicValue, BreakReason> {
        let options = propagate(std::iter::once(callable).chain(args));
        match callable.kind() {
            ValueKind::DerivedConstant(_) => Ok(callable.call_const(args)?),
            ValueKind::Builtin(builtin) => self.call_builtin(*builtin, callable, args),
            ValueKind::AllowedHost(HostItem::Function(function)) => {
                if let Some(values) = all_constant(args) {
                    let result = function.call(&values)?;
                    let literal = Literal::from_runtime(&result)
                        .ok_or_else(|| BreakReason::Unsupported(format!("{function}() returned {}", result.type_tag())))?;
                    return Ok(SymbolicValue::derived(ValueKind::Constant(literal), options));
                }
                Ok(self.emit_function(*function, args)?.with_propagation(options))
            }
            ValueKind::StructuredObject { key, module } => {
                if matches!(module.kind, ModuleKind::List | ModuleKind::Container) {
                    return Err(BreakReason::Unsupported(format!("module {key} is not callable")));
                }
                let call_args = args
                    .iter()
                    .map(|arg| arg.as_dataflow_node(&mut self.graph))
                    .collect::<Result<Vec<_>, _>>()?;
                let target = self.modules.register(key, module.clone());
                let node = self.graph.call_module(&target, call_args);
                let input = match args.first().map(SymbolicValue::kind) {
                    Some(ValueKind::NumericArray(meta) | ValueKind::Scalar(meta)) => Some(meta.clone()),
                    _ => None,
                };
                let meta = module_output(module, node, input.as_ref(), self.config.dynamic_shapes);
                Ok(SymbolicValue::derived(ValueKind::NumericArray(meta), options))
            }
            ValueKind::GetAttr { name, .. } => match Self::array_method(callable) {
                Some((method, receiver)) => Ok(self.emit_method(method, receiver, args)?.with_propagation(options)),
                None => Err(BreakReason::Unsupported(format!("call to attribute `{name}`"))),
            },
            ValueKind::UserFunction(function) => Err(BreakReason::UserCall(function.name.to_string())),
            ValueKind::UserMethod { function, .. } => Err(BreakReason::UserCall(function.name.to_string())),
            ValueKind::Unsupported { value: RuntimeValue::Method(_), ty } => Err(BreakReason::UserCall(ty.to_string())),
            _ => Err(BreakReason::Unsupported(format!("call to {callable}"))),
        }
    }

    fn call_builtin(
        &mut self,
        builtin: BuiltinOp,
        callable: &SymbolicValue,
        args: &[SymbolicValue],
    ) -> Result<SymbolicValue, BreakReason> {
        let options = propagate(std::iter::once(callable).chain(args));
        if let (BuiltinOp::Len, [container]) = (builtin, args) {
            if let Some(len) = container.known_len() {
                return Ok(SymbolicValue::derived(ValueKind::Constant(Literal::Int(ops::usize_to_int(len)?)), options));
            }
            if matches!(container.kind(), ValueKind::NumericArray(_)) {
                let dim = SymbolicValue::constant(0);
                return Ok(self.emit_method(HostFn::Size, container, &[dim])?.with_propagation(options));
            }
        }
        if let Some(values) = all_constant(args) {
            let result = builtin.call(&values)?;
            let literal = Literal::from_runtime(&result)
                .ok_or_else(|| BreakReason::Unsupported(format!("{builtin}() returned {}", result.type_tag())))?;
            return Ok(SymbolicValue::derived(ValueKind::Constant(literal), options));
        }
        match (builtin, args) {
            (BuiltinOp::Abs, [value]) if is_graph_operand(value) => {
                Ok(self.emit_function(HostFn::Abs, args)?.with_propagation(options))
            }
            _ => Err(BreakReason::Unsupported(format!("{builtin}() on traced values"))),
        }
    }
}
