use crate::errors::BreakReason;
use crate::interpreter::{OpcodeResult, SymbolicInterpreter};
use crate::value::SymbolicValue;

// Stack, Load and Store Operations (7)
// Opcodes: POP_TOP, ROT_TWO, DUP_TOP, LOAD_CONST, LOAD_FAST, STORE_FAST, LOAD_GLOBAL

impl<'a> SymbolicInterpreter<'a> {
    // POP_TOP operation
    pub fn op_pop_top(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [_] = self.pop()?;
        Ok(OpcodeResult::Continue)
    }

    // ROT_TWO operation
    pub fn op_rot_two(&mut self) -> Result<OpcodeResult, BreakReason> {
        let [second, top] = self.pop()?;
        self.push(top);
        self.push(second);
        Ok(OpcodeResult::Continue)
    }

    // DUP_TOP operation
    pub fn op_dup_top(&mut self) -> Result<OpcodeResult, BreakReason> {
        let top = self.top()?.clone();
        self.push(top);
        Ok(OpcodeResult::Continue)
    }

    // LOAD_CONST operation
    pub fn op_load_const(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let literal = self.code.constant(arg).ok_or(BreakReason::BadOperand(arg))?.clone();
        self.push(SymbolicValue::constant(literal));
        Ok(OpcodeResult::Continue)
    }

    // LOAD_FAST operation
    pub fn op_load_fast(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let code: &'a crate::code::CodeUnit = self.code;
        let name = code.varname(arg).ok_or(BreakReason::BadOperand(arg))?;
        let value = self.load_local(name)?;
        self.push(value);
        Ok(OpcodeResult::Continue)
    }

    // STORE_FAST operation
    pub fn op_store_fast(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let code: &'a crate::code::CodeUnit = self.code;
        let name = code.varname(arg).ok_or(BreakReason::BadOperand(arg))?;
        let [value] = self.pop()?;
        self.locals.insert(name.to_string(), value);
        Ok(OpcodeResult::Continue)
    }

    // LOAD_GLOBAL operation
    pub fn op_load_global(&mut self, arg: u32) -> Result<OpcodeResult, BreakReason> {
        let name = self.name_operand(arg)?;
        let value = self.load_global(name)?;
        self.push(value);
        Ok(OpcodeResult::Continue)
    }
}
