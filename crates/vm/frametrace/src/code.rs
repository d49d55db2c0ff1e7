//! Decoded instruction streams.
//!
//! A [`CodeUnit`] is what an external decoder hands the engine: a flat list of
//! instructions plus the constant, name and local-variable tables their
//! operands index into. Jump operands are absolute instruction indices.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use strum::{Display, EnumString};

use crate::runtime::HostFn;
use crate::value::Literal;

#[allow(non_camel_case_types)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Hash, EnumString, Display)]
pub enum Opcode {
    // Stack manipulation
    POP_TOP = 1,
    ROT_TWO = 2,
    DUP_TOP = 4,
    NOP = 9,

    // Arithmetic
    UNARY_NEGATIVE = 11,
    BINARY_MULTIPLY = 20,
    BINARY_MODULO = 22,
    BINARY_ADD = 23,
    BINARY_SUBTRACT = 24,
    BINARY_SUBSCR = 25,
    BINARY_FLOOR_DIVIDE = 26,
    BINARY_TRUE_DIVIDE = 27,

    // Iteration and control flow
    GET_ITER = 68,
    RETURN_VALUE = 83,
    UNPACK_SEQUENCE = 92,
    FOR_ITER = 93,
    JUMP_ABSOLUTE = 113,
    POP_JUMP_IF_FALSE = 114,
    POP_JUMP_IF_TRUE = 115,

    // Loads and stores
    LOAD_CONST = 100,
    LOAD_ATTR = 106,
    LOAD_GLOBAL = 116,
    LOAD_FAST = 124,
    STORE_FAST = 125,
    LOAD_METHOD = 160,

    // Builders
    BUILD_TUPLE = 102,
    BUILD_LIST = 103,
    BUILD_SLICE = 133,
    BUILD_CONST_KEY_MAP = 156,

    COMPARE_OP = 107,
    CALL_FUNCTION = 131,
    CALL_METHOD = 161,
}

impl Opcode {
    /// Host operation behind a `BINARY_*` arithmetic opcode.
    pub fn binary_fn(self) -> Option<HostFn> {
        match self {
            Opcode::BINARY_ADD => Some(HostFn::Add),
            Opcode::BINARY_SUBTRACT => Some(HostFn::Sub),
            Opcode::BINARY_MULTIPLY => Some(HostFn::Mul),
            Opcode::BINARY_TRUE_DIVIDE => Some(HostFn::Div),
            Opcode::BINARY_FLOOR_DIVIDE => Some(HostFn::FloorDiv),
            Opcode::BINARY_MODULO => Some(HostFn::Mod),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        let opcode = match byte {
            1 => POP_TOP,
            2 => ROT_TWO,
            4 => DUP_TOP,
            9 => NOP,
            11 => UNARY_NEGATIVE,
            20 => BINARY_MULTIPLY,
            22 => BINARY_MODULO,
            23 => BINARY_ADD,
            24 => BINARY_SUBTRACT,
            25 => BINARY_SUBSCR,
            26 => BINARY_FLOOR_DIVIDE,
            27 => BINARY_TRUE_DIVIDE,
            68 => GET_ITER,
            83 => RETURN_VALUE,
            92 => UNPACK_SEQUENCE,
            93 => FOR_ITER,
            100 => LOAD_CONST,
            102 => BUILD_TUPLE,
            103 => BUILD_LIST,
            106 => LOAD_ATTR,
            107 => COMPARE_OP,
            113 => JUMP_ABSOLUTE,
            114 => POP_JUMP_IF_FALSE,
            115 => POP_JUMP_IF_TRUE,
            116 => LOAD_GLOBAL,
            124 => LOAD_FAST,
            125 => STORE_FAST,
            131 => CALL_FUNCTION,
            133 => BUILD_SLICE,
            156 => BUILD_CONST_KEY_MAP,
            160 => LOAD_METHOD,
            161 => CALL_METHOD,
            other => return Err(other),
        };
        Ok(opcode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, arg: u32) -> Self {
        Self { opcode, arg }
    }

    /// Instruction whose operand is ignored.
    pub fn bare(opcode: Opcode) -> Self {
        Self { opcode, arg: 0 }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.opcode, self.arg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseInstructionError {
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("bad operand `{0}`")]
    BadOperand(String),
    #[error("empty instruction")]
    Empty,
}

/// Parses `"LOAD_FAST 0"` or `"RETURN_VALUE"`.
impl FromStr for Instruction {
    type Err = ParseInstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let name = parts.next().ok_or(ParseInstructionError::Empty)?;
        let opcode = Opcode::from_str(name)
            .map_err(|_| ParseInstructionError::UnknownOpcode(name.to_string()))?;
        let arg = match parts.next() {
            Some(operand) => operand
                .parse()
                .map_err(|_| ParseInstructionError::BadOperand(operand.to_string()))?,
            None => 0,
        };
        if let Some(extra) = parts.next() {
            return Err(ParseInstructionError::BadOperand(extra.to_string()));
        }
        Ok(Self { opcode, arg })
    }
}

static NEXT_CODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a code unit; the compilation cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(u64);

impl CodeId {
    pub fn fresh() -> Self {
        Self(NEXT_CODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded function body.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub id: CodeId,
    pub name: String,
    /// Number of leading `varnames` bound from call arguments.
    pub argcount: usize,
    pub varnames: Vec<String>,
    pub names: Vec<String>,
    pub constants: Vec<Literal>,
    pub instructions: Vec<Instruction>,
}

impl CodeUnit {
    pub fn new(name: &str, instructions: Vec<Instruction>) -> Self {
        Self {
            id: CodeId::fresh(),
            name: name.to_string(),
            argcount: 0,
            varnames: Vec::new(),
            names: Vec::new(),
            constants: Vec::new(),
            instructions,
        }
    }

    /// Assembles one instruction per non-empty line.
    pub fn assemble(name: &str, source: &str) -> Result<Self, ParseInstructionError> {
        let instructions = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Instruction::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, instructions))
    }

    /// Sets the local-variable table; the first `argcount` entries are parameters.
    pub fn with_varnames(mut self, varnames: &[&str], argcount: usize) -> Self {
        self.varnames = varnames.iter().map(|name| name.to_string()).collect();
        self.argcount = argcount.min(self.varnames.len());
        self
    }

    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_constants(mut self, constants: Vec<Literal>) -> Self {
        self.constants = constants;
        self
    }

    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.instructions.get(pc).copied()
    }

    pub fn varname(&self, index: u32) -> Option<&str> {
        self.varnames.get(usize::try_from(index).ok()?).map(String::as_str)
    }

    pub fn name_at(&self, index: u32) -> Option<&str> {
        self.names.get(usize::try_from(index).ok()?).map(String::as_str)
    }

    pub fn constant(&self, index: u32) -> Option<&Literal> {
        self.constants.get(usize::try_from(index).ok()?)
    }

    /// Parameter names, in call order.
    pub fn parameters(&self) -> &[String] {
        self.varnames.get(..self.argcount).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_parse_by_name_and_byte() {
        assert_eq!(Opcode::from_str("LOAD_FAST").unwrap(), Opcode::LOAD_FAST);
        assert_eq!(Opcode::try_from(124).unwrap(), Opcode::LOAD_FAST);
        assert_eq!(Opcode::try_from(0), Err(0));
        assert_eq!(Opcode::CALL_METHOD.to_string(), "CALL_METHOD");
    }

    #[test]
    fn assemble_skips_blank_lines() {
        let code = CodeUnit::assemble(
            "f",
            "
            LOAD_FAST 0
            RETURN_VALUE
            ",
        )
        .unwrap()
        .with_varnames(&["x"], 1);
        assert_eq!(code.instructions.len(), 2);
        assert_eq!(code.instruction(0), Some(Instruction::new(Opcode::LOAD_FAST, 0)));
        assert_eq!(code.instruction(1), Some(Instruction::bare(Opcode::RETURN_VALUE)));
        assert_eq!(code.parameters(), ["x".to_string()]);
    }

    #[test]
    fn malformed_instructions_are_rejected() {
        assert_eq!(
            "FROB 1".parse::<Instruction>(),
            Err(ParseInstructionError::UnknownOpcode("FROB".to_string()))
        );
        assert!(matches!(
            "LOAD_FAST x".parse::<Instruction>(),
            Err(ParseInstructionError::BadOperand(_))
        ));
        assert!(matches!("LOAD_FAST 1 2".parse::<Instruction>(), Err(ParseInstructionError::BadOperand(_))));
    }

    #[test]
    fn code_ids_are_unique() {
        let a = CodeUnit::new("a", vec![]);
        let b = CodeUnit::new("a", vec![]);
        assert_ne!(a.id, b.id);
    }
}
