use crate::errors::BreakReason;
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::value::{SymbolicValue, ValueKind};

// Iteration and Control Flow Operations (5)
// Opcodes: GET_ITER, FOR_ITER, POP_JUMP_IF_FALSE, POP_JUMP_IF_TRUE, RETURN_VALUE
// JUMP_ABSOLUTE is resolved in the run loop.

/// Truth value of `value` when it does not depend on graph data.
fn static_truth(value: &SymbolicValue) -> Result<bool, BreakReason> {
    if let Ok(literal) = value.as_constant() {
        return Ok(literal.truthy()?);
    }
    match value.kind() {
        ValueKind::Sequence { .. } | ValueKind::ConstDict(_) => value
            .known_len()
            .map(|len| len > 0)
            .ok_or_else(|| BreakReason::DataDependentBranch(value.to_string())),
        ValueKind::StructuredObject { module, .. } => Ok(module.len().is_none_or(|len| len > 0)),
        ValueKind::UserFunction(_)
        | ValueKind::UserMethod { .. }
        | ValueKind::AllowedHost(_)
        | ValueKind::Builtin(_)
        | ValueKind::PythonModule(_) => Ok(true),
        _ => Err(BreakReason::DataDependentBranch(value.to_string())),
    }
}

impl SymbolicInterpreter<'_> {
    // GET_ITER operation
    pub fn op_get_iter(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [iterable] = self.pop()?;
        let iterator = iterable.iterate()?;
        self.push(iterator);
        Ok(OpcodeResult::Continue)
    }

    // FOR_ITER operation
    //
    // Exhaustion pops the iterator and jumps past the loop body.
    pub fn op_for_iter(&mut self, target: u32) -> Result<OpcodeResult, BreakReason> {
        let target = Self::jump_target(target)?;
        let [iterator] = self.pop()?;
        match iterator.advance()? {
            Some((item, next)) => {
                self.push(next);
                self.push(item);
                Ok(OpcodeResult::Continue)
            }
            None => Ok(OpcodeResult::Jump(target)),
        }
    }

    // POP_JUMP_IF_FALSE and POP_JUMP_IF_TRUE operations
    pub fn op_pop_jump_if(&mut self, target: u32, jump_when: bool) -> Result<OpcodeResult, BreakReason> {
        let target = Self::jump_target(target)?;
        let [condition] = self.pop()?;
        if static_truth(&condition)? == jump_when {
            Ok(OpcodeResult::Jump(target))
        } else {
            Ok(OpcodeResult::Continue)
        }
    }

    // RETURN_VALUE operation
    pub fn op_return_value(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [value] = self.pop()?;
        let output = value.as_dataflow_node(&mut self.graph)?;
        Ok(OpcodeResult::Return(output))
    }
}
