//! Symbolic interpreter.
//!
//! Abstractly executes a [`CodeUnit`] over an operand stack and a locals map
//! of [`SymbolicValue`]s. Frame inputs are wrapped on first use (see
//! [`builder`]); every handler builds its result from its operands so that
//! guards and support state flow along with the data. A trace attempt either
//! completes with a graph, the union of the guards of every value it touched
//! and the input bindings of the graph placeholders, or aborts with a
//! [`GraphBreak`].

pub mod builder;
pub mod opcode_handlers;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::code::{CodeUnit, Opcode};
use crate::errors::{BreakReason, GraphBreak};
use crate::graph::{Arg, Graph, GraphBuilder, ModuleTable};
use crate::guards::GuardSet;
use crate::jit::types::{EngineConfig, InputBinding};
use crate::runtime::LiveEnvironment;
use crate::value::SymbolicValue;

/// Upper bound on executed instructions per attempt.
pub const MAX_TRACE_STEPS: usize = 1 << 16;

/// Lifecycle of one trace attempt. `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    Started,
    Running,
    Completed,
    Aborted,
}

/// What a handler asks the run loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpcodeResult {
    Continue,
    Jump(usize),
    Return(Arg),
}

/// Result of a completed trace.
#[derive(Debug)]
pub struct TraceOutput {
    pub graph: Graph,
    pub guards: GuardSet,
    /// Frame bindings feeding the graph placeholders, in placeholder order.
    pub inputs: Vec<InputBinding>,
    /// Modules the graph reads parameters from or calls.
    pub modules: ModuleTable,
}

pub struct SymbolicInterpreter<'a> {
    code: &'a CodeUnit,
    env: &'a dyn LiveEnvironment,
    config: &'a EngineConfig,
    stack: Vec<SymbolicValue>,
    locals: FxHashMap<String, SymbolicValue>,
    globals: FxHashMap<String, SymbolicValue>,
    graph: GraphBuilder,
    modules: ModuleTable,
    inputs: Vec<InputBinding>,
    guards: GuardSet,
    pc: usize,
    state: TraceState,
}

impl<'a> SymbolicInterpreter<'a> {
    pub fn new(code: &'a CodeUnit, env: &'a dyn LiveEnvironment, config: &'a EngineConfig) -> Self {
        Self {
            code,
            env,
            config,
            stack: Vec::new(),
            locals: FxHashMap::default(),
            globals: FxHashMap::default(),
            graph: GraphBuilder::new(),
            modules: ModuleTable::new(),
            inputs: Vec::new(),
            guards: GuardSet::new(),
            pc: 0,
            state: TraceState::Started,
        }
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    /// Runs the attempt to completion.
    pub fn run(&mut self) -> Result<TraceOutput, GraphBreak> {
        if self.state != TraceState::Started {
            return Err(GraphBreak {
                pc: self.pc,
                opcode: None,
                reason: BreakReason::Unsupported("trace attempt already finished".to_string()),
            });
        }
        self.state = TraceState::Running;
        match self.execute() {
            Ok(output) => {
                self.state = TraceState::Completed;
                Ok(output)
            }
            Err(graph_break) => {
                self.state = TraceState::Aborted;
                Err(graph_break)
            }
        }
    }

    fn execute(&mut self) -> Result<TraceOutput, GraphBreak> {
        for _ in 0..MAX_TRACE_STEPS {
            let Some(instruction) = self.code.instruction(self.pc) else {
                return Err(self.abort(None, BreakReason::MissingReturn));
            };
            let opcode = instruction.opcode;
            let arg = instruction.arg;
            debug!(code = %self.code.name, pc = self.pc, %instruction, depth = self.stack.len(), "trace step");

            let op_result = match opcode {
                Opcode::NOP => Ok(OpcodeResult::Continue),
                Opcode::POP_TOP => self.op_pop_top(),
                Opcode::ROT_TWO => self.op_rot_two(),
                Opcode::DUP_TOP => self.op_dup_top(),
                Opcode::LOAD_CONST => self.op_load_const(arg),
                Opcode::LOAD_FAST => self.op_load_fast(arg),
                Opcode::STORE_FAST => self.op_store_fast(arg),
                Opcode::LOAD_GLOBAL => self.op_load_global(arg),
                Opcode::LOAD_ATTR | Opcode::LOAD_METHOD => self.op_load_attr(arg),
                Opcode::CALL_FUNCTION | Opcode::CALL_METHOD => self.op_call(arg),
                Opcode::BINARY_ADD
                | Opcode::BINARY_SUBTRACT
                | Opcode::BINARY_MULTIPLY
                | Opcode::BINARY_TRUE_DIVIDE
                | Opcode::BINARY_FLOOR_DIVIDE
                | Opcode::BINARY_MODULO => self.op_binary(opcode),
                Opcode::COMPARE_OP => self.op_compare(arg),
                Opcode::UNARY_NEGATIVE => self.op_unary_negative(),
                Opcode::BINARY_SUBSCR => self.op_binary_subscr(),
                Opcode::BUILD_TUPLE => self.op_build_sequence(crate::value::SequenceKind::Tuple, arg),
                Opcode::BUILD_LIST => self.op_build_sequence(crate::value::SequenceKind::List, arg),
                Opcode::BUILD_SLICE => self.op_build_slice(arg),
                Opcode::BUILD_CONST_KEY_MAP => self.op_build_const_key_map(arg),
                Opcode::UNPACK_SEQUENCE => self.op_unpack_sequence(arg),
                Opcode::GET_ITER => self.op_get_iter(),
                Opcode::FOR_ITER => self.op_for_iter(arg),
                Opcode::JUMP_ABSOLUTE => Self::jump_target(arg).map(OpcodeResult::Jump),
                Opcode::POP_JUMP_IF_FALSE => self.op_pop_jump_if(arg, false),
                Opcode::POP_JUMP_IF_TRUE => self.op_pop_jump_if(arg, true),
                Opcode::RETURN_VALUE => self.op_return_value(),
            };

            match op_result {
                Ok(OpcodeResult::Continue) => self.pc = self.pc.saturating_add(1),
                Ok(OpcodeResult::Jump(target)) => self.pc = target,
                Ok(OpcodeResult::Return(output)) => return Ok(self.finish(output)),
                Err(reason) => return Err(self.abort(Some(opcode), reason)),
            }
        }
        Err(self.abort(
            None,
            BreakReason::Unsupported(format!("no return within {MAX_TRACE_STEPS} instructions")),
        ))
    }

    fn abort(&self, opcode: Option<Opcode>, reason: BreakReason) -> GraphBreak {
        GraphBreak {
            pc: self.pc,
            opcode,
            reason,
        }
    }

    fn finish(&mut self, output: Arg) -> TraceOutput {
        TraceOutput {
            graph: std::mem::take(&mut self.graph).finish(output),
            guards: std::mem::take(&mut self.guards),
            inputs: std::mem::take(&mut self.inputs),
            modules: std::mem::take(&mut self.modules),
        }
    }

    /// Pushes a value; its guards join the trace's guard set.
    pub(crate) fn push(&mut self, value: SymbolicValue) {
        self.guards.extend(value.guards().iter().cloned());
        self.stack.push(value);
    }

    /// Pops `N` values, deepest first.
    pub(crate) fn pop<const N: usize>(&mut self) -> Result<[SymbolicValue; N], BreakReason> {
        let split = self.stack.len().checked_sub(N).ok_or(BreakReason::StackUnderflow)?;
        let popped: Vec<_> = self.stack.drain(split..).collect();
        <[SymbolicValue; N]>::try_from(popped).map_err(|_| BreakReason::StackUnderflow)
    }

    /// Pops `count` values, deepest first.
    pub(crate) fn pop_n(&mut self, count: u32) -> Result<Vec<SymbolicValue>, BreakReason> {
        let count = usize::try_from(count).map_err(|_| BreakReason::BadOperand(count))?;
        let split = self.stack.len().checked_sub(count).ok_or(BreakReason::StackUnderflow)?;
        Ok(self.stack.drain(split..).collect())
    }

    pub(crate) fn top(&self) -> Result<&SymbolicValue, BreakReason> {
        self.stack.last().ok_or(BreakReason::StackUnderflow)
    }

    pub(crate) fn jump_target(arg: u32) -> Result<usize, BreakReason> {
        usize::try_from(arg).map_err(|_| BreakReason::BadOperand(arg))
    }
}

/// Traces `code` against the bindings visible through `env`.
pub fn trace(code: &CodeUnit, env: &dyn LiveEnvironment, config: &EngineConfig) -> Result<TraceOutput, GraphBreak> {
    SymbolicInterpreter::new(code, env, config).run()
}

#[cfg(test)]
mod tests;
