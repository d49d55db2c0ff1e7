use std::collections::BTreeMap;

use crate::errors::{BreakReason, HostError};
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::runtime::{HostFn, ops};
use crate::value::{Literal, SequenceKind, SymbolicValue, ValueKind, propagate};

use super::is_graph_operand;

// Container Operations (6)
// Opcodes: BINARY_SUBSCR, BUILD_TUPLE, BUILD_LIST, BUILD_SLICE,
//          BUILD_CONST_KEY_MAP, UNPACK_SEQUENCE

impl SymbolicInterpreter<'_> {
    // BINARY_SUBSCR operation
    pub fn op_binary_subscr(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [container, key] = self.pop()?;
        let item = self.subscript(&container, &key)?;
        self.push(item);
        Ok(OpcodeResult::Continue)
    }

    /// `container[key]`. Traced containers index through a graph node; any
    /// other container needs a constant key.
    pub(crate) fn subscript(&mut self, container: &SymbolicValue, key: &SymbolicValue) -> Result<SymbolicValue, BreakReason> {
        if key.is_constant() {
            if is_graph_operand(container) {
                return self.emit_function(HostFn::GetItem, &[container.clone(), key.clone()]);
            }
            return Ok(container.getitem_const(key)?);
        }
        if matches!(container.kind(), ValueKind::NumericArray(_)) && is_graph_operand(key) {
            return self.emit_function(HostFn::GetItem, &[container.clone(), key.clone()]);
        }
        Err(BreakReason::NonConstantIndex(container.to_string()))
    }

    // BUILD_TUPLE and BUILD_LIST operations
    pub fn op_build_sequence(&mut self, kind: SequenceKind, count: u32) -> Result<OpcodeResult, BreakReason> {
        let items = self.pop_n(count)?;
        self.push(SymbolicValue::sequence(kind, items));
        Ok(OpcodeResult::Continue)
    }

    // BUILD_SLICE operation
    pub fn op_build_slice(&mut self, count: u32) -> Result<OpcodeResult, BreakReason> {
        let mut parts = match count {
            2 | 3 => self.pop_n(count)?,
            _ => return Err(BreakReason::BadOperand(count)),
        };
        if parts.len() == 2 {
            parts.push(SymbolicValue::constant(Literal::None));
        }
        self.push(SymbolicValue::sequence(SequenceKind::Slice, parts));
        Ok(OpcodeResult::Continue)
    }

    // BUILD_CONST_KEY_MAP operation
    pub fn op_build_const_key_map(&mut self, count: u32) -> Result<OpcodeResult, BreakReason> {
        let [keys] = self.pop()?;
        let values = self.pop_n(count)?;
        let literal = keys.as_constant()?;
        let key_literals = match &literal {
            Literal::Tuple(items) if items.len() == values.len() => items,
            _ => return Err(BreakReason::Unsupported(format!("map keys {literal}"))),
        };
        let mut map = BTreeMap::new();
        for (key, value) in key_literals.iter().zip(&values) {
            let dict_key = key
                .as_dict_key()
                .ok_or_else(|| BreakReason::Unsupported(format!("dict key {key}")))?;
            map.insert(dict_key, value.clone());
        }
        let options = propagate(std::iter::once(&keys).chain(&values));
        self.push(SymbolicValue::derived(ValueKind::ConstDict(map), options));
        Ok(OpcodeResult::Continue)
    }

    // UNPACK_SEQUENCE operation
    pub fn op_unpack_sequence(&mut self, count: u32) -> Result<OpcodeResult, BreakReason> {
        let expected = usize::try_from(count).map_err(|_| BreakReason::BadOperand(count))?;
        let [sequence] = self.pop()?;
        let items = match sequence.kind() {
            ValueKind::NumericArray(meta) => {
                let rows = meta
                    .shape
                    .as_ref()
                    .and_then(|shape| shape.first().copied())
                    .ok_or_else(|| BreakReason::Unsupported(format!("unpacking {sequence} of unknown length")))?;
                if rows != expected {
                    return Err(unpack_mismatch(expected, rows));
                }
                let mut items = Vec::with_capacity(rows);
                for row in 0..rows {
                    let index = SymbolicValue::constant(ops::usize_to_int(row)?);
                    items.push(self.emit_function(HostFn::GetItem, &[sequence.clone(), index])?);
                }
                items
            }
            _ => sequence.sequence_items()?,
        };
        if items.len() != expected {
            return Err(unpack_mismatch(expected, items.len()));
        }
        for item in items.into_iter().rev() {
            self.push(item);
        }
        Ok(OpcodeResult::Continue)
    }
}

fn unpack_mismatch(expected: usize, actual: usize) -> BreakReason {
    BreakReason::Host(HostError::Value(format!(
        "expected {expected} values to unpack, got {actual}"
    )))
}
