//! Uninstrumented execution of code units.
//!
//! [`run_uninstrumented`] interprets a [`CodeUnit`] over concrete
//! [`RuntimeValue`]s with no tracing, guards or caching. It is what the
//! frame gate falls back to, and the reference every compiled artifact must
//! agree with.

use std::str::FromStr;

use frametrace::code::{CodeUnit, Opcode};
use frametrace::runtime::{BoundMethod, BuiltinOp, DictKey, Frame, HostFn, RuntimeValue, SliceValue, ops};
use frametrace::HostError;
use rustc_hash::FxHashMap;

/// Nested user calls deeper than this raise instead of exhausting the stack.
pub const MAX_CALL_DEPTH: usize = 64;

/// Run `code` against `frame` and return what it returns.
pub fn run_uninstrumented(code: &CodeUnit, frame: &Frame) -> Result<RuntimeValue, HostError> {
    HostInterpreter {
        code,
        locals: frame.locals.clone(),
        globals: &frame.globals,
        stack: Vec::new(),
        depth: 0,
    }
    .run()
}

/// An operand stack entry. Iterators only live on the stack between
/// `GET_ITER` and loop exhaustion.
#[derive(Debug, Clone)]
enum Slot {
    Value(RuntimeValue),
    Iter(std::vec::IntoIter<RuntimeValue>),
}

struct HostInterpreter<'a> {
    code: &'a CodeUnit,
    locals: FxHashMap<String, RuntimeValue>,
    globals: &'a FxHashMap<String, RuntimeValue>,
    stack: Vec<Slot>,
    depth: usize,
}

fn malformed(message: impl Into<String>) -> HostError {
    HostError::System(message.into())
}

impl<'a> HostInterpreter<'a> {
    fn run(mut self) -> Result<RuntimeValue, HostError> {
        let mut pc = 0;
        while let Some(instruction) = self.code.instruction(pc) {
            let arg = instruction.arg;
            let mut next = pc.saturating_add(1);
            match instruction.opcode {
                Opcode::NOP => {}
                Opcode::POP_TOP => {
                    self.pop_slot()?;
                }
                Opcode::ROT_TWO => {
                    let top = self.pop_slot()?;
                    let second = self.pop_slot()?;
                    self.stack.push(top);
                    self.stack.push(second);
                }
                Opcode::DUP_TOP => {
                    let top = self.stack.last().cloned().ok_or_else(|| malformed("stack underflow"))?;
                    self.stack.push(top);
                }
                Opcode::LOAD_CONST => {
                    let value = self
                        .code
                        .constant(arg)
                        .map(|literal| literal.to_runtime())
                        .ok_or_else(|| malformed(format!("no constant {arg}")))?;
                    self.push(value);
                }
                Opcode::LOAD_FAST => {
                    let name = self.varname(arg)?;
                    let value = self
                        .locals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| HostError::Name(name.to_string()))?;
                    self.push(value);
                }
                Opcode::STORE_FAST => {
                    let name = self.varname(arg)?;
                    let value = self.pop()?;
                    self.locals.insert(name.to_string(), value);
                }
                Opcode::LOAD_GLOBAL => {
                    let name = self.name(arg)?;
                    let value = match self.globals.get(name) {
                        Some(value) => value.clone(),
                        None => BuiltinOp::from_str(name)
                            .map(RuntimeValue::Builtin)
                            .map_err(|_| HostError::Name(name.to_string()))?,
                    };
                    self.push(value);
                }
                Opcode::LOAD_ATTR | Opcode::LOAD_METHOD => {
                    let name = self.name(arg)?;
                    let base = self.pop()?;
                    self.push(base.get_attr(name)?);
                }
                Opcode::CALL_FUNCTION | Opcode::CALL_METHOD => {
                    let args = self.pop_n(arg)?;
                    let callable = self.pop()?;
                    let result = self.call(&callable, args)?;
                    self.push(result);
                }
                Opcode::BINARY_ADD
                | Opcode::BINARY_SUBTRACT
                | Opcode::BINARY_MULTIPLY
                | Opcode::BINARY_TRUE_DIVIDE
                | Opcode::BINARY_FLOOR_DIVIDE
                | Opcode::BINARY_MODULO => {
                    let op = instruction
                        .opcode
                        .binary_fn()
                        .ok_or_else(|| malformed(format!("{} is not arithmetic", instruction.opcode)))?;
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.push(ops::binary(op, &lhs, &rhs)?);
                }
                Opcode::COMPARE_OP => {
                    let op = usize::try_from(arg)
                        .ok()
                        .and_then(|index| HostFn::COMPARISONS.get(index))
                        .copied()
                        .ok_or_else(|| malformed(format!("bad comparison {arg}")))?;
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.push(ops::binary(op, &lhs, &rhs)?);
                }
                Opcode::UNARY_NEGATIVE => {
                    let operand = self.pop()?;
                    self.push(ops::unary(HostFn::Neg, &operand)?);
                }
                Opcode::BINARY_SUBSCR => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    self.push(ops::subscript(&container, &key)?);
                }
                Opcode::BUILD_TUPLE => {
                    let items = self.pop_n(arg)?;
                    self.push(RuntimeValue::Tuple(items));
                }
                Opcode::BUILD_LIST => {
                    let items = self.pop_n(arg)?;
                    self.push(RuntimeValue::List(items));
                }
                Opcode::BUILD_SLICE => {
                    let parts = match arg {
                        2 | 3 => self.pop_n(arg)?,
                        _ => return Err(malformed(format!("bad slice arity {arg}"))),
                    };
                    let mut bounds = parts.iter().map(slice_bound);
                    let mut bound = || bounds.next().transpose().map(Option::flatten);
                    let slice = SliceValue {
                        start: bound()?,
                        stop: bound()?,
                        step: bound()?,
                    };
                    self.push(RuntimeValue::Slice(slice));
                }
                Opcode::BUILD_CONST_KEY_MAP => {
                    let keys = self.pop()?;
                    let values = self.pop_n(arg)?;
                    let RuntimeValue::Tuple(keys) = keys else {
                        return Err(malformed("map keys must be a tuple"));
                    };
                    if keys.len() != values.len() {
                        return Err(malformed("map keys and values differ in length"));
                    }
                    let map = keys
                        .iter()
                        .map(dict_key)
                        .zip(values)
                        .map(|(key, value)| key.map(|key| (key, value)))
                        .collect::<Result<_, _>>()?;
                    self.push(RuntimeValue::Dict(map));
                }
                Opcode::UNPACK_SEQUENCE => {
                    let expected = usize::try_from(arg).map_err(|_| malformed(format!("bad count {arg}")))?;
                    let sequence = self.pop()?;
                    let items = iteration_items(&sequence)?;
                    if items.len() != expected {
                        return Err(HostError::Value(format!(
                            "expected {expected} values to unpack, got {}",
                            items.len()
                        )));
                    }
                    for item in items.into_iter().rev() {
                        self.push(item);
                    }
                }
                Opcode::GET_ITER => {
                    let iterable = self.pop()?;
                    self.stack.push(Slot::Iter(iteration_items(&iterable)?.into_iter()));
                }
                Opcode::FOR_ITER => {
                    let Slot::Iter(mut iterator) = self.pop_slot()? else {
                        return Err(malformed("FOR_ITER without an iterator"));
                    };
                    match iterator.next() {
                        Some(item) => {
                            self.stack.push(Slot::Iter(iterator));
                            self.push(item);
                        }
                        None => next = jump_target(arg)?,
                    }
                }
                Opcode::JUMP_ABSOLUTE => next = jump_target(arg)?,
                Opcode::POP_JUMP_IF_FALSE | Opcode::POP_JUMP_IF_TRUE => {
                    let jump_when = instruction.opcode == Opcode::POP_JUMP_IF_TRUE;
                    if self.pop()?.truthy()? == jump_when {
                        next = jump_target(arg)?;
                    }
                }
                Opcode::RETURN_VALUE => return self.pop(),
            }
            pc = next;
        }
        Err(malformed(format!("`{}` ended without returning", self.code.name)))
    }

    fn call(&self, callable: &RuntimeValue, args: Vec<RuntimeValue>) -> Result<RuntimeValue, HostError> {
        match callable {
            RuntimeValue::HostFunction(function) => function.call(&args),
            RuntimeValue::Builtin(builtin) => builtin.call(&args),
            RuntimeValue::Module(module) => module.forward(&args),
            RuntimeValue::Function(function) => self.call_user(&function.code, args),
            RuntimeValue::Method(method) => match method.as_ref() {
                BoundMethod::Host { receiver, method } => {
                    let mut all = Vec::with_capacity(args.len().saturating_add(1));
                    all.push(receiver.clone());
                    all.extend(args);
                    method.call(&all)
                }
                BoundMethod::User { receiver, function } => {
                    let mut all = Vec::with_capacity(args.len().saturating_add(1));
                    all.push(receiver.clone());
                    all.extend(args);
                    self.call_user(&function.code, all)
                }
            },
            other => Err(HostError::Type(format!("'{}' object is not callable", other.type_tag()))),
        }
    }

    fn call_user(&self, code: &CodeUnit, args: Vec<RuntimeValue>) -> Result<RuntimeValue, HostError> {
        let depth = self.depth.saturating_add(1);
        if depth > MAX_CALL_DEPTH {
            return Err(malformed("maximum recursion depth exceeded"));
        }
        let parameters = code.parameters();
        if parameters.len() != args.len() {
            return Err(HostError::Type(format!(
                "{}() takes {} positional argument(s) but {} were given",
                code.name,
                parameters.len(),
                args.len()
            )));
        }
        let locals = parameters.iter().cloned().zip(args).collect();
        HostInterpreter {
            code,
            locals,
            globals: self.globals,
            stack: Vec::new(),
            depth,
        }
        .run()
    }

    fn varname(&self, arg: u32) -> Result<&'a str, HostError> {
        let code: &'a CodeUnit = self.code;
        code.varname(arg)
            .ok_or_else(|| malformed(format!("no local variable {arg}")))
    }

    fn name(&self, arg: u32) -> Result<&'a str, HostError> {
        let code: &'a CodeUnit = self.code;
        code.name_at(arg).ok_or_else(|| malformed(format!("no name {arg}")))
    }

    fn push(&mut self, value: RuntimeValue) {
        self.stack.push(Slot::Value(value));
    }

    fn pop_slot(&mut self) -> Result<Slot, HostError> {
        self.stack.pop().ok_or_else(|| malformed("stack underflow"))
    }

    fn pop(&mut self) -> Result<RuntimeValue, HostError> {
        match self.pop_slot()? {
            Slot::Value(value) => Ok(value),
            Slot::Iter(_) => Err(malformed("iterator used as a value")),
        }
    }

    /// Pops `count` values, returned in push order.
    fn pop_n(&mut self, count: u32) -> Result<Vec<RuntimeValue>, HostError> {
        let count = usize::try_from(count).map_err(|_| malformed(format!("bad count {count}")))?;
        let mut values = (0..count).map(|_| self.pop()).collect::<Result<Vec<_>, _>>()?;
        values.reverse();
        Ok(values)
    }
}

fn jump_target(arg: u32) -> Result<usize, HostError> {
    usize::try_from(arg).map_err(|_| malformed(format!("bad jump target {arg}")))
}

/// Elements produced by iterating `value`.
fn iteration_items(value: &RuntimeValue) -> Result<Vec<RuntimeValue>, HostError> {
    match value {
        RuntimeValue::Tuple(items) | RuntimeValue::List(items) => Ok(items.clone()),
        RuntimeValue::Dict(map) => Ok(map
            .keys()
            .map(|key| match key {
                DictKey::Int(i) => RuntimeValue::Int(*i),
                DictKey::Str(s) => RuntimeValue::Str(s.clone()),
            })
            .collect()),
        RuntimeValue::Str(s) => Ok(s.chars().map(|c| RuntimeValue::str(&c.to_string())).collect()),
        RuntimeValue::Array(array) => {
            let rows = array
                .shape
                .first()
                .copied()
                .ok_or_else(|| HostError::Type("iteration over a 0-d array".to_string()))?;
            (0..rows)
                .map(|row| array.select(ops::usize_to_int(row)?).map(RuntimeValue::array))
                .collect()
        }
        RuntimeValue::Module(module) if module.is_list_like() => {
            Ok(module.children().cloned().map(RuntimeValue::Module).collect())
        }
        other => Err(HostError::Type(format!("'{}' object is not iterable", other.type_tag()))),
    }
}

fn slice_bound(value: &RuntimeValue) -> Result<Option<i64>, HostError> {
    match value {
        RuntimeValue::None => Ok(None),
        RuntimeValue::Int(i) => Ok(Some(*i)),
        RuntimeValue::Bool(b) => Ok(Some(i64::from(*b))),
        other => Err(HostError::Type(format!(
            "slice indices must be integers or None, not '{}'",
            other.type_tag()
        ))),
    }
}

fn dict_key(value: &RuntimeValue) -> Result<DictKey, HostError> {
    match value {
        RuntimeValue::Int(i) => Ok(DictKey::Int(*i)),
        RuntimeValue::Str(s) => Ok(DictKey::Str(s.clone())),
        other => Err(HostError::Type(format!("unhashable type: '{}'", other.type_tag()))),
    }
}
