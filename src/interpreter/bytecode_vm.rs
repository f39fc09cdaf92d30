//! Instruction dispatch
//!
//! The stream interleaves opcodes and their inline operands. One call to
//! `step_instruction` decodes one opcode (plus its operand, if any) and
//! applies the transition. Engine errors are annotated with the failing
//! instruction before they leave this module.

use super::environment::{Binding, BlockKind, Environment, Hoist, ScopeKind};
use super::stack::StackFrame;
use super::{HostFn, Vm};
use crate::compiler::{Instruction, OpCode, Operand};
use crate::error::JsError;
use crate::gc::HeapValue;
use crate::prelude::FxHashMap;
use crate::value::{
    FunctionKind, HeapRef, IterationCursor, JsFunction, JsString, LValue, ObjectKind,
    PropertyDescriptor, PropertyKey, Value, to_int32, to_uint32,
};

/// Operand-stack entries rendered into a fault report
const FAULT_STACK_DEPTH: usize = 5;

/// `CreateObject` member tags
const MEMBER_PROPERTY: usize = 0;
const MEMBER_GETTER: usize = 1;
const MEMBER_SETTER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClosureKind {
    Function,
    Lambda,
    Generator,
}

/// What a call site resolved its callee to
enum CallTarget {
    Host {
        func: HostFn,
        captures: Vec<Value>,
    },
    Bytecode {
        entry: usize,
        param_count: usize,
        upvalues: FxHashMap<JsString, HeapRef>,
        this: Option<Value>,
        with_arguments: bool,
    },
}

impl Vm {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Decoding
    // ═══════════════════════════════════════════════════════════════════════════════

    fn fetch_op(&mut self) -> Result<OpCode, JsError> {
        match self.code.get(self.pc) {
            Some(Instruction::Op(op)) => {
                self.pc += 1;
                Ok(*op)
            }
            Some(Instruction::Operand(operand)) => Err(JsError::malformed(format!(
                "expected an opcode at {}, found operand {:?}",
                self.pc, operand
            ))),
            None => Err(JsError::malformed(format!(
                "program counter {} is past the end of the code",
                self.pc
            ))),
        }
    }

    fn read_operand(&mut self) -> Result<Operand, JsError> {
        match self.code.get(self.pc) {
            Some(Instruction::Operand(operand)) => {
                self.pc += 1;
                Ok(*operand)
            }
            _ => Err(JsError::malformed(format!("missing operand at {}", self.pc))),
        }
    }

    fn read_label(&mut self) -> Result<usize, JsError> {
        match self.read_operand()? {
            Operand::Label(target) => Ok(target),
            other => Err(JsError::malformed(format!("expected a label, found {:?}", other))),
        }
    }

    fn read_count(&mut self) -> Result<usize, JsError> {
        match self.read_operand()? {
            Operand::Literal(n) => usize::try_from(n)
                .map_err(|_| JsError::malformed(format!("negative count {}", n))),
            other => Err(JsError::malformed(format!("expected a count, found {:?}", other))),
        }
    }

    fn read_constant(&mut self) -> Result<Value, JsError> {
        let index = match self.read_operand()? {
            Operand::Constant(index) => index,
            other => {
                return Err(JsError::malformed(format!(
                    "expected a constant, found {:?}",
                    other
                )));
            }
        };
        self.constants
            .get(index)
            .map(Value::from)
            .ok_or(JsError::IndexOutOfBounds {
                index,
                len: self.constants.len(),
            })
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Decode and execute one instruction
    pub(crate) fn step_instruction(&mut self) -> Result<(), JsError> {
        self.maybe_collect();
        let at = self.pc;
        let op = match self.fetch_op() {
            Ok(op) => op,
            Err(e) => return Err(self.fault(at, "<decode>", e)),
        };
        log::trace!("{:>5} {:<24} depth={}", at, op.name(), self.stack.len());
        match self.execute_op(op, at) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fault(at, op.name(), e)),
        }
    }

    /// Annotate an engine error with the failing instruction
    fn fault(&self, pc: usize, opcode: &str, error: JsError) -> JsError {
        match error {
            JsError::Uncaught { .. } | JsError::Fault { .. } => error,
            source => JsError::Fault {
                pc,
                opcode: opcode.to_string(),
                stack: self
                    .stack
                    .iter()
                    .rev()
                    .take(FAULT_STACK_DEPTH)
                    .rev()
                    .map(|v| self.inspect(v))
                    .collect(),
                source: Box::new(source),
            },
        }
    }

    fn execute_op(&mut self, op: OpCode, at: usize) -> Result<(), JsError> {
        match op {
            // ───────────────────────────────────────────────────────────────────────
            // Literals & stack
            // ───────────────────────────────────────────────────────────────────────
            OpCode::Const => {
                let value = self.read_constant()?;
                self.push(value);
            }
            OpCode::Push => {
                let value = match self.read_operand()? {
                    Operand::Literal(n) => Value::Number(n as f64),
                    Operand::Label(target) => Value::Number(target as f64),
                    Operand::Constant(_) => {
                        return Err(JsError::malformed("Push takes a literal or a label"));
                    }
                };
                self.push(value);
            }
            OpCode::Undefined => self.push(Value::Undefined),
            OpCode::Null => self.push(Value::Null),
            OpCode::True => self.push(Value::Boolean(true)),
            OpCode::False => self.push(Value::Boolean(false)),
            OpCode::One => self.push(Value::Number(1.0)),
            OpCode::Dup => {
                let top = self.peek()?.clone();
                self.push(top);
            }
            OpCode::Drop => {
                self.pop()?;
            }
            OpCode::This => {
                let this = self.current_this();
                self.push(this);
            }
            OpCode::Nop => {}

            // ───────────────────────────────────────────────────────────────────────
            // Operators
            // ───────────────────────────────────────────────────────────────────────
            OpCode::Add => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                    (Value::String(a), _) => {
                        Value::String(a.clone() + self.to_js_string(&right).as_str())
                    }
                    (_, Value::String(b)) => Value::String(self.to_js_string(&left) + b.as_str()),
                    _ => Value::Number(left.to_number() + right.to_number()),
                };
                self.push(result);
            }
            OpCode::Sub => self.numeric_binary(|a, b| a - b)?,
            OpCode::Mul => self.numeric_binary(|a, b| a * b)?,
            OpCode::Div => self.numeric_binary(|a, b| a / b)?,
            OpCode::Mod => self.numeric_binary(|a, b| a % b)?,
            OpCode::Pow => self.numeric_binary(f64::powf)?,
            OpCode::LT => self.compare(|o| o == std::cmp::Ordering::Less)?,
            OpCode::GT => self.compare(|o| o == std::cmp::Ordering::Greater)?,
            OpCode::LTE => self.compare(|o| o != std::cmp::Ordering::Greater)?,
            OpCode::GTE => self.compare(|o| o != std::cmp::Ordering::Less)?,
            OpCode::StrictEQ => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Boolean(left.strict_equals(&right)));
            }
            OpCode::StrictNEQ => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Boolean(!left.strict_equals(&right)));
            }
            OpCode::LogicalAnd => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(if left.to_boolean() { right } else { left });
            }
            OpCode::LogicalOr => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(if left.to_boolean() { left } else { right });
            }
            OpCode::LogicalNot => {
                let value = self.pop()?;
                self.push(Value::Boolean(!value.to_boolean()));
            }
            OpCode::BitwiseAnd => self.int32_binary(|a, b| a & b)?,
            OpCode::BitwiseOr => self.int32_binary(|a, b| a | b)?,
            OpCode::BitwiseXor => self.int32_binary(|a, b| a ^ b)?,
            OpCode::BitwiseNot => {
                let value = self.pop()?;
                self.push(Value::Number(f64::from(!to_int32(value.to_number()))));
            }
            OpCode::LeftArithmeticShift => {
                self.int32_binary(|a, b| a.wrapping_shl(b as u32 & 31))?
            }
            OpCode::RightArithmeticShift => {
                self.int32_binary(|a, b| a.wrapping_shr(b as u32 & 31))?
            }
            OpCode::RightLogicalShift => {
                let right = self.pop()?;
                let left = self.pop()?;
                let shift = to_uint32(right.to_number()) & 31;
                let result = to_uint32(left.to_number()) >> shift;
                self.push(Value::Number(f64::from(result)));
            }
            OpCode::PrefixPlus => {
                let value = self.pop()?;
                self.push(Value::Number(value.to_number()));
            }
            OpCode::PrefixMinus => {
                let value = self.pop()?;
                self.push(Value::Number(-value.to_number()));
            }
            OpCode::TypeOf => {
                let value = self.pop()?;
                let name = self.type_of(&value);
                self.push(Value::from(name));
            }

            // ───────────────────────────────────────────────────────────────────────
            // Scopes & bindings
            // ───────────────────────────────────────────────────────────────────────
            OpCode::Def | OpCode::DefBlock => {
                let name = self.pop_string()?;
                let value = self.pop()?;
                let hoist = if op == OpCode::Def {
                    Hoist::FunctionLevel
                } else {
                    Hoist::Block
                };
                self.envs.define(name, value, hoist, &mut self.heap)?;
            }
            OpCode::Load => {
                let name = self.pop_string()?;
                let value = self.envs.lookup(name.as_str(), &self.heap)?;
                self.push(value);
            }
            OpCode::Set => {
                let name = self.pop_string()?;
                let value = self.pop()?;
                self.envs.assign(name.as_str(), value, &mut self.heap)?;
            }
            OpCode::LoadLeftValue => {
                let target = match self.pop()? {
                    Value::String(name) => LValue::Name(name),
                    object => {
                        let key = self.pop()?;
                        LValue::Member {
                            object,
                            key: PropertyKey::from_value(&key),
                        }
                    }
                };
                self.push(Value::LValue(Box::new(target)));
            }
            OpCode::SetLeftValue => {
                let target = match self.pop()? {
                    Value::LValue(target) => *target,
                    other => return Err(JsError::invalid_cast("lvalue", other.kind_name())),
                };
                let value = self.pop()?;
                match target {
                    LValue::Name(name) => self.envs.assign(name.as_str(), value, &mut self.heap)?,
                    LValue::Member { object, key } => self.write_property(&object, key, value)?,
                }
            }
            OpCode::EnterBlockScope => self.enter_block(BlockKind::Normal),
            OpCode::EnterLabeledBlockScope => {
                let exit = self.read_label()?;
                let label = self.pop_string()?;
                self.enter_block(BlockKind::Labeled { label, exit });
            }
            OpCode::EnterIterableBlockScope => {
                let exit = self.read_label()?;
                self.enter_block(BlockKind::Iterable { exit });
            }
            OpCode::EnterTryBlockScope => {
                let catch_target = self.read_label()?;
                let stack_height = self.stack.len();
                self.enter_block(BlockKind::Try {
                    catch_target,
                    stack_height,
                });
            }
            OpCode::ExitBlockScope => {
                self.envs.pop_block()?;
            }

            // ───────────────────────────────────────────────────────────────────────
            // Control transfer
            // ───────────────────────────────────────────────────────────────────────
            OpCode::Jump => {
                self.pc = self.read_label()?;
            }
            OpCode::JumpIfTrue | OpCode::JumpIfFalse => {
                let target = self.read_label()?;
                let condition = self.pop()?.to_boolean();
                if condition == (op == OpCode::JumpIfTrue) {
                    self.pc = target;
                }
            }
            OpCode::Break => self.break_to(None)?,
            OpCode::BreakLabel => {
                let label = self.pop_string()?;
                self.break_to(Some(label))?;
            }
            OpCode::Throw => {
                let value = self.pop()?;
                self.throw_value(value)?;
            }

            // ───────────────────────────────────────────────────────────────────────
            // Calls
            // ───────────────────────────────────────────────────────────────────────
            OpCode::Call => {
                let callee = self.pop()?;
                let args = self.pop_args()?;
                self.call_value(callee, args, Value::Undefined, false)?;
            }
            OpCode::CallMethod => {
                let key = PropertyKey::from_value(&self.pop()?);
                let receiver = self.pop()?;
                let args = self.pop_args()?;
                let method = match self.lookup_property(&receiver, &key)? {
                    super::property::Lookup::Value(value) => value,
                    super::property::Lookup::Getter(getter) => {
                        match self.invoke(getter, receiver.clone(), Vec::new()) {
                            Ok(value) => value,
                            Err(e) => return self.rethrow_host_error(e),
                        }
                    }
                };
                if !self.heap.is_callable(&method) {
                    return Err(JsError::type_error(format!(
                        "{}.{} is not a function",
                        self.inspect(&receiver),
                        key
                    )));
                }
                self.call_value(method, args, receiver, false)?;
            }
            OpCode::New => {
                let callee = self.pop()?;
                let args = self.pop_args()?;
                self.construct(callee, args)?;
            }
            OpCode::Ret => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| JsError::malformed("Ret outside a function"))?;
                let value = self.frame_result(&frame)?;
                if frame.generator.is_some() {
                    return self.finish_generator(frame, value);
                }
                self.stack.truncate(frame.entry);
                self.envs.truncate(frame.env_base);
                self.pc = frame.ret;
                if !frame.discard_result {
                    self.push(value);
                }
            }

            // ───────────────────────────────────────────────────────────────────────
            // Functions & generators
            // ───────────────────────────────────────────────────────────────────────
            OpCode::CreateFunction => self.create_closure(ClosureKind::Function)?,
            OpCode::CreateLambda => self.create_closure(ClosureKind::Lambda)?,
            OpCode::CreateGenerator => self.create_closure(ClosureKind::Generator)?,
            OpCode::CreateGeneratorContext => {
                let body = self.read_label()?;
                self.create_generator_context(body)?;
            }
            OpCode::Yield => {
                let value = self.pop()?;
                self.suspend_generator(value, self.pc)?;
            }
            OpCode::YieldStar => self.yield_star(at)?,
            OpCode::GeneratorReturn => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| JsError::malformed("GeneratorReturn outside a generator"))?;
                if frame.generator.is_none() {
                    return Err(JsError::malformed("GeneratorReturn outside a generator"));
                }
                let value = self.frame_result(&frame)?;
                self.finish_generator(frame, value)?;
            }

            // ───────────────────────────────────────────────────────────────────────
            // Objects
            // ───────────────────────────────────────────────────────────────────────
            OpCode::CreateObject => {
                let count = self.read_count()?;
                self.create_object_literal(count)?;
            }
            OpCode::CreateArray => {
                let count = self.read_count()?;
                let items = self.pop_n(count)?;
                let array = self.create_array(items);
                self.push(Value::Reference(array));
            }
            OpCode::PropAccess => {
                let key = PropertyKey::from_value(&self.pop()?);
                let object = self.pop()?;
                self.read_property(object, key)?;
            }
            OpCode::PropAssignment => {
                let value = self.pop()?;
                let key = PropertyKey::from_value(&self.pop()?);
                let object = self.pop()?;
                // pushed first so a scheduled setter frame sits above it
                self.push(value.clone());
                self.write_property(&object, key, value)?;
            }

            // ───────────────────────────────────────────────────────────────────────
            // Iteration
            // ───────────────────────────────────────────────────────────────────────
            OpCode::ForInStart => {
                let target = self.pop()?;
                let keys = self.for_in_keys(&target)?;
                let iterator = self
                    .heap
                    .alloc(HeapValue::Iterator(IterationCursor::snapshot(keys)));
                self.push(Value::Reference(iterator));
            }
            OpCode::ForOfStart => {
                let target = self.pop()?;
                let cursor = self.for_of_cursor(&target)?;
                let iterator = self.heap.alloc(HeapValue::Iterator(cursor));
                self.push(Value::Reference(iterator));
            }
            OpCode::ForInNext | OpCode::ForOfNext => {
                let iterator = match self.pop()? {
                    Value::Reference(r) => r,
                    other => return Err(JsError::invalid_cast("iterator", other.kind_name())),
                };
                let item = match self.advance_cursor(iterator) {
                    Ok(item) => item,
                    Err(e) => return self.rethrow_host_error(e),
                };
                match item {
                    Some(item) => {
                        self.push(item);
                        self.push(Value::Boolean(false));
                    }
                    None => self.push(Value::Boolean(true)),
                }
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════════════════════

    fn numeric_binary(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), JsError> {
        let right = self.pop()?.to_number();
        let left = self.pop()?.to_number();
        self.push(Value::Number(f(left, right)));
        Ok(())
    }

    fn int32_binary(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<(), JsError> {
        let right = to_int32(self.pop()?.to_number());
        let left = to_int32(self.pop()?.to_number());
        self.push(Value::Number(f64::from(f(left, right))));
        Ok(())
    }

    /// Strings compare lexicographically, everything else numerically.
    /// Comparisons involving NaN are false.
    fn compare(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), JsError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let ordering = match (&left, &right) {
            (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => left.to_number().partial_cmp(&right.to_number()),
        };
        self.push(Value::Boolean(ordering.is_some_and(accept)));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Scopes, breaks & exceptions
    // ═══════════════════════════════════════════════════════════════════════════════

    fn enter_block(&mut self, kind: BlockKind) {
        self.envs.push(Environment::new(ScopeKind::Block(kind)));
    }

    /// Pop block scopes up to and including the matching `Iterable` scope
    /// (or `Labeled` scope with `label`) and jump to its exit.
    fn break_to(&mut self, label: Option<JsString>) -> Result<(), JsError> {
        loop {
            let exit = match self.envs.last().map(|env| &env.kind) {
                Some(ScopeKind::Block(BlockKind::Iterable { exit })) if label.is_none() => {
                    Some(*exit)
                }
                Some(ScopeKind::Block(BlockKind::Labeled { label: l, exit }))
                    if label.as_ref() == Some(l) =>
                {
                    Some(*exit)
                }
                Some(ScopeKind::Block(_)) => None,
                _ => {
                    return Err(JsError::IllegalBreak {
                        label: label.map(|l| l.to_string()),
                    });
                }
            };
            self.envs.pop_block()?;
            if let Some(exit) = exit {
                self.pc = exit;
                return Ok(());
            }
        }
    }

    /// Unwind to the innermost `Try` scope, or fail with `Uncaught` at the
    /// global scope or at the boundary of an active host call.
    pub(crate) fn throw_value(&mut self, value: Value) -> Result<(), JsError> {
        loop {
            if let Some(boundary) = self.boundaries.last() {
                if self.envs.len() <= boundary.envs {
                    return Err(self.uncaught(value));
                }
            }
            let kind = match self.envs.last() {
                Some(env) => &env.kind,
                None => return Err(self.uncaught(value)),
            };
            match kind {
                ScopeKind::Global => return Err(self.uncaught(value)),
                ScopeKind::Block(BlockKind::Try {
                    catch_target,
                    stack_height,
                }) => {
                    let (target, height) = (*catch_target, *stack_height);
                    self.envs.pop_block()?;
                    self.stack.truncate(height);
                    self.push(value);
                    self.pc = target;
                    return Ok(());
                }
                ScopeKind::Block(_) => {
                    self.envs.pop_block()?;
                }
                ScopeKind::Lexer { .. } => {
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| JsError::internal_error("function scope without a frame"))?;
                    if let Some(ctx) = frame.generator {
                        self.mark_generator_done(ctx)?;
                    }
                    self.envs.truncate(frame.env_base);
                    self.stack.truncate(frame.entry);
                    self.pc = frame.ret;
                }
            }
        }
    }

    fn uncaught(&self, value: Value) -> JsError {
        JsError::Uncaught {
            message: self.display(&value),
            value,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Pop the argument count and then the arguments, in push order
    fn pop_args(&mut self) -> Result<Vec<Value>, JsError> {
        let count = self.pop_index()?;
        self.pop_n(count)
    }

    /// Return value of a finishing frame: its top of stack, if it pushed one
    fn frame_result(&mut self, frame: &StackFrame) -> Result<Value, JsError> {
        if self.stack.len() > frame.entry {
            self.pop()
        } else {
            Ok(Value::Undefined)
        }
    }

    fn resolve_call_target(&self, callee: &Value, this: &Value) -> Result<CallTarget, JsError> {
        let Some(func) = self.heap.function_of(callee) else {
            return Err(JsError::type_error(format!(
                "{} is not a function",
                self.inspect(callee)
            )));
        };
        let bytecode = |bound: Option<Value>, with_arguments: bool| -> Result<CallTarget, JsError> {
            Ok(CallTarget::Bytecode {
                entry: func
                    .entry
                    .ok_or_else(|| JsError::malformed("bytecode function without an entry"))?,
                param_count: func.param_count,
                upvalues: func.upvalues.clone(),
                this: bound,
                with_arguments,
            })
        };
        match &func.kind {
            FunctionKind::Native { id, captures } | FunctionKind::Bridge { id, captures } => {
                Ok(CallTarget::Host {
                    func: self.native(*id)?,
                    captures: captures.clone(),
                })
            }
            FunctionKind::Bytecode => bytecode(Some(this.clone()), true),
            FunctionKind::Lambda { this } => bytecode(Some(this.clone()), false),
            FunctionKind::Generator => bytecode(None, false),
        }
    }

    /// Dispatch a call the way a call site does. Natives push their result
    /// (unless `discard`), bridges manage the stack themselves, bytecode
    /// functions get a new frame that returns to the current pc.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        this: Value,
        discard: bool,
    ) -> Result<(), JsError> {
        match self.resolve_call_target(&callee, &this)? {
            CallTarget::Host {
                func: HostFn::Native(f),
                captures,
            } => match f(self, this, &args, &captures) {
                Ok(value) => {
                    if !discard {
                        self.push(value);
                    }
                    Ok(())
                }
                Err(e) => self.rethrow_host_error(e),
            },
            CallTarget::Host {
                func: HostFn::Bridge(f),
                captures,
            } => {
                let (height, depth) = (self.stack.len(), self.frames.len());
                if let Err(e) = f(self, this, &args, &captures) {
                    return self.rethrow_host_error(e);
                }
                if discard {
                    match self.frames.get_mut(depth) {
                        Some(frame) => frame.discard_result = true,
                        None => self.stack.truncate(height),
                    }
                }
                Ok(())
            }
            CallTarget::Bytecode {
                entry,
                param_count,
                upvalues,
                this: bound_this,
                with_arguments,
            } => {
                self.check_call_depth()?;
                self.frames.push(StackFrame {
                    ret: self.pc,
                    entry: self.stack.len(),
                    env_base: self.envs.len(),
                    this: bound_this.unwrap_or(this),
                    generator: None,
                    discard_result: discard,
                });
                let mut scope = Environment::new(ScopeKind::Lexer { upvalues });
                if with_arguments {
                    let arguments = self.create_array(args.clone());
                    scope.bindings.insert(
                        JsString::from("arguments"),
                        Binding::Value(Value::Reference(arguments)),
                    );
                }
                self.envs.push(scope);
                // Reversed so the first parameter `Def` pops the first argument
                for i in (0..param_count).rev() {
                    self.push(args.get(i).cloned().unwrap_or_default());
                }
                self.pc = entry;
                Ok(())
            }
        }
    }

    /// Thrown values escaping host code become language throws again;
    /// engine errors keep propagating.
    pub(crate) fn rethrow_host_error(&mut self, error: JsError) -> Result<(), JsError> {
        match error {
            JsError::Uncaught { value, .. } => self.throw_value(value),
            other => Err(other),
        }
    }

    /// `New`: allocate the instance, push it and run the constructor with it
    /// as `this`. The constructor's own result lands above the instance.
    fn construct(&mut self, callee: Value, args: Vec<Value>) -> Result<(), JsError> {
        let prototype = match self.heap.function_of(&callee) {
            Some(func) => match func.kind {
                FunctionKind::Lambda { .. } | FunctionKind::Generator => {
                    return Err(JsError::type_error(format!(
                        "{} is not a constructor",
                        self.inspect(&callee)
                    )));
                }
                _ => {
                    let Value::Reference(r) = &callee else {
                        return Err(JsError::internal_error("function value without a reference"));
                    };
                    self.heap.get_property(*r, &PropertyKey::from("prototype"))?
                }
            },
            None => {
                return Err(JsError::type_error(format!(
                    "{} is not a constructor",
                    self.inspect(&callee)
                )));
            }
        };
        let proto = match prototype {
            Value::Reference(_) => prototype,
            _ => Value::Reference(self.realm.object_prototype),
        };
        let instance = Value::Reference(self.heap.alloc_object(proto, ObjectKind::Ordinary));
        self.push(instance.clone());
        self.call_value(callee, args, instance, false)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Functions & literals
    // ═══════════════════════════════════════════════════════════════════════════════

    /// `CreateFunction` / `CreateLambda` / `CreateGenerator`
    fn create_closure(&mut self, kind: ClosureKind) -> Result<(), JsError> {
        let source_text = self.pop_string()?;
        let name = match kind {
            ClosureKind::Lambda => JsString::from(""),
            ClosureKind::Function | ClosureKind::Generator => self.pop_string()?,
        };
        let param_count = self.pop_index()?;
        let entry = self.pop_index()?;
        let upvalue_count = self.pop_index()?;

        let mut upvalues = FxHashMap::default();
        for _ in 0..upvalue_count {
            let upvalue = self.pop_string()?;
            if let Some(cell) = self.envs.capture(&upvalue, &mut self.heap)? {
                upvalues.insert(upvalue, cell);
            }
        }

        let function_kind = match kind {
            ClosureKind::Function => FunctionKind::Bytecode,
            ClosureKind::Lambda => FunctionKind::Lambda {
                this: self.current_this(),
            },
            ClosureKind::Generator => FunctionKind::Generator,
        };
        let function = self.create_function(JsFunction {
            name: name.clone(),
            param_count,
            entry: Some(entry),
            upvalues,
            source_text,
            kind: function_kind,
        })?;

        if !name.is_empty() {
            self.envs.define(
                name,
                Value::Reference(function),
                Hoist::FunctionLevel,
                &mut self.heap,
            )?;
        }
        self.push(Value::Reference(function));
        Ok(())
    }

    /// Pops `count` (value, key, member tag) triples
    fn create_object_literal(&mut self, count: usize) -> Result<(), JsError> {
        let entries = self.pop_n(count.saturating_mul(3))?;
        let obj = self.create_object();
        for member in entries.chunks(3) {
            let [value, key, tag] = member else {
                return Err(JsError::internal_error("object literal member is not a triple"));
            };
            let key = PropertyKey::from_value(key);
            match tag.as_index()? {
                MEMBER_PROPERTY => self.heap.set_property(obj, key, value.clone())?,
                tag @ (MEMBER_GETTER | MEMBER_SETTER) => {
                    let object = self.heap.object_mut(obj)?;
                    let mut desc = match object.properties.get(&key) {
                        Some(existing) if existing.is_accessor() => existing.clone(),
                        _ => PropertyDescriptor {
                            value: None,
                            enumerable: true,
                            writable: true,
                            getter: None,
                            setter: None,
                        },
                    };
                    if tag == MEMBER_GETTER {
                        desc.getter = Some(value.clone());
                    } else {
                        desc.setter = Some(value.clone());
                    }
                    object.define(key, desc);
                }
                other => {
                    return Err(JsError::malformed(format!("unknown object member tag {}", other)));
                }
            }
        }
        self.push(Value::Reference(obj));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Iteration snapshots
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Own enumerable keys, as strings, at the time the loop starts
    fn for_in_keys(&self, target: &Value) -> Result<Vec<Value>, JsError> {
        match target {
            Value::Reference(r) => Ok(self
                .heap
                .object(*r)?
                .own_keys(true)
                .iter()
                .map(|key| Value::String(key.to_js_string()))
                .collect()),
            Value::String(s) => Ok((0..s.char_count())
                .map(|i| Value::from(i.to_string()))
                .collect()),
            // nothing to enumerate on other primitives
            _ => Ok(Vec::new()),
        }
    }

    /// Cursor for `for...of`. Generators are stepped through their `next`
    /// method; everything else is read when the loop starts.
    fn for_of_cursor(&self, target: &Value) -> Result<IterationCursor, JsError> {
        match target {
            Value::String(s) => Ok(IterationCursor::snapshot(
                s.as_str()
                    .chars()
                    .map(|c| Value::from(c.to_string()))
                    .collect(),
            )),
            Value::Reference(r) => {
                let obj = self.heap.object(*r)?;
                if matches!(obj.kind, ObjectKind::Generator(_)) {
                    return Ok(IterationCursor::protocol(target.clone()));
                }
                Ok(IterationCursor::snapshot(obj.own_enumerable_values()))
            }
            other => Err(JsError::type_error(format!(
                "{} is not iterable",
                self.inspect(other)
            ))),
        }
    }

    /// Next loop item, or `None` once the cursor is exhausted
    fn advance_cursor(&mut self, cursor: HeapRef) -> Result<Option<Value>, JsError> {
        let iterator = match self.heap.iterator_mut(cursor)? {
            IterationCursor::Snapshot { items, cursor: position } => {
                let item = items.get(*position).cloned();
                if item.is_some() {
                    *position += 1;
                }
                return Ok(item);
            }
            IterationCursor::Protocol { done: true, .. } => return Ok(None),
            IterationCursor::Protocol { iterator, .. } => iterator.clone(),
        };

        let next = self.get_property(&iterator, "next")?;
        let result = self.invoke(next, iterator, Vec::new())?;
        if self.get_property(&result, "done")?.to_boolean() {
            if let IterationCursor::Protocol { done, .. } = self.heap.iterator_mut(cursor)? {
                *done = true;
            }
            return Ok(None);
        }
        self.get_property(&result, "value").map(Some)
    }
}
