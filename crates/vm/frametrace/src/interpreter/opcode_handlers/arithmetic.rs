use crate::code::Opcode;
use crate::errors::BreakReason;
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::runtime::{HostFn, ops};
use crate::value::{Literal, SequenceKind, SymbolicValue, ValueKind, propagate};

use super::is_graph_operand;

// Arithmetic and Comparison Operations (8)
// Opcodes: BINARY_ADD, BINARY_SUBTRACT, BINARY_MULTIPLY, BINARY_TRUE_DIVIDE,
//          BINARY_FLOOR_DIVIDE, BINARY_MODULO, UNARY_NEGATIVE, COMPARE_OP

impl SymbolicInterpreter<'_> {
    // BINARY_* operations
    pub fn op_binary(&mut self, opcode: Opcode) -> Result<OpcodeResult, BreakReason> {
        let op = opcode.binary_fn().ok_or_else(|| BreakReason::Unsupported(format!("{opcode} is not arithmetic")))?;
        let [lhs, rhs] = self.pop()?;
        let result = self.binary(op, &lhs, &rhs)?;
        self.push(result);
        Ok(OpcodeResult::Continue)
    }

    // COMPARE_OP operation
    pub fn op_compare(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let op = usize::try_from(arg)
            .ok()
            .and_then(|index| HostFn::COMPARISONS.get(index))
            .copied()
            .ok_or(BreakReason::BadOperand(arg))?;
        let [lhs, rhs] = self.pop()?;
        let result = self.binary(op, &lhs, &rhs)?;
        self.push(result);
        Ok(OpcodeResult::Continue)
    }

    // UNARY_NEGATIVE operation
    pub fn op_unary_negative(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [operand] = self.pop()?;
        let result = if let Ok(literal) = operand.as_constant() {
            let negated = ops::unary(HostFn::Neg, &literal.to_runtime())?;
            let literal = Literal::from_runtime(&negated)
                .ok_or_else(|| BreakReason::Unsupported(format!("-{literal}")))?;
            SymbolicValue::derived(ValueKind::Constant(literal), propagate([&operand]))
        } else if is_graph_operand(&operand) {
            self.emit_function(HostFn::Neg, std::slice::from_ref(&operand))?
        } else {
            SymbolicValue::derived(ValueKind::unknown(), propagate([&operand]))
        };
        self.push(result);
        Ok(OpcodeResult::Continue)
    }

    /// `lhs <op> rhs`: folded when both sides are constant, a graph node when
    /// either side is traced, otherwise an unknown value.
    pub(crate) fn binary(&mut self, op: HostFn, lhs: &SymbolicValue, rhs: &SymbolicValue) -> Result<SymbolicValue, BreakReason> {
        let options = propagate([lhs, rhs]);
        if let (Ok(a), Ok(b)) = (lhs.as_constant(), rhs.as_constant()) {
            let result = ops::binary(op, &a.to_runtime(), &b.to_runtime())?;
            let literal = Literal::from_runtime(&result)
                .ok_or_else(|| BreakReason::Unsupported(format!("{op} of {a} and {b}")))?;
            return Ok(SymbolicValue::derived(ValueKind::Constant(literal), options));
        }
        if is_graph_operand(lhs) || is_graph_operand(rhs) {
            return self.emit_function(op, &[lhs.clone(), rhs.clone()]);
        }
        match (op, lhs.kind(), rhs.kind()) {
            (
                HostFn::Add,
                ValueKind::Sequence { kind: left, items: head },
                ValueKind::Sequence { kind: right, items: tail },
            ) if left == right && *left != SequenceKind::Slice => {
                let items = head.iter().chain(tail).cloned().collect();
                Ok(SymbolicValue::derived(ValueKind::Sequence { kind: *left, items }, options))
            }
            _ => Ok(SymbolicValue::derived(ValueKind::unknown(), options)),
        }
    }
}
