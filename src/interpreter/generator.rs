//! Generator suspension and resumption
//!
//! A generator call runs the function prologue (parameter binding) and then
//! `CreateGeneratorContext` moves the frame's operand stack slice and scopes
//! into a heap-allocated [`GeneratorContext`]. `next` re-pushes a frame and
//! restores that state; `Yield` saves it again and returns to the caller with
//! a `{ value, done }` record.
//!
//! Try scopes record absolute operand stack heights, so saved scopes store
//! them relative to the frame entry and are rebased on resume.

use serde::{Deserialize, Serialize};

use super::Vm;
use super::environment::{BlockKind, Environment, ScopeKind};
use super::stack::StackFrame;
use crate::error::JsError;
use crate::gc::{HeapValue, Traceable};
use crate::value::{HeapRef, ObjectKind, PropertyDescriptor, PropertyKey, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Running,
    Done,
}

/// Source a `YieldStar` is draining
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Delegate {
    /// Array elements or string characters
    Values { items: Vec<Value>, cursor: usize },
    /// Another generator's iterator object
    Generator(HeapRef),
}

/// Saved execution state of one generator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorContext {
    pub state: GeneratorState,
    pub resume_pc: usize,
    /// Operand stack above the frame entry
    pub stack: Vec<Value>,
    /// The frame's function scope and any blocks above it
    pub environments: Vec<Environment>,
    pub this: Value,
    pub delegate: Option<Delegate>,
}

impl Traceable for Delegate {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        match self {
            Delegate::Values { items, .. } => items.trace(visitor),
            Delegate::Generator(obj) => visitor(*obj),
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        match self {
            Delegate::Values { items, .. } => items.relocate(map),
            Delegate::Generator(obj) => *obj = map(*obj),
        }
    }
}

impl Traceable for GeneratorContext {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        self.stack.trace(visitor);
        self.environments.trace(visitor);
        self.this.trace(visitor);
        self.delegate.trace(visitor);
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.stack.relocate(map);
        self.environments.relocate(map);
        self.this.relocate(map);
        self.delegate.relocate(map);
    }
}

fn rebase_try_heights(envs: &mut [Environment], base: usize, forward: bool) {
    for env in envs {
        if let ScopeKind::Block(BlockKind::Try { stack_height, .. }) = &mut env.kind {
            *stack_height = if forward {
                *stack_height + base
            } else {
                stack_height.saturating_sub(base)
            };
        }
    }
}

impl Vm {
    /// `{ value, done }` iterator result record
    pub(crate) fn iter_result(&mut self, value: Value, done: bool) -> Result<Value, JsError> {
        let obj = self.create_object();
        self.heap
            .set_property(obj, PropertyKey::from("value"), value)?;
        self.heap
            .set_property(obj, PropertyKey::from("done"), Value::Boolean(done))?;
        Ok(Value::Reference(obj))
    }

    /// `CreateGeneratorContext`: capture the running prologue frame and
    /// push the iterator object that drives it
    pub(crate) fn create_generator_context(&mut self, resume_pc: usize) -> Result<(), JsError> {
        let frame = self.current_frame()?.clone();
        let stack = self.stack.split_off(frame.entry.min(self.stack.len()));
        let mut environments: Vec<Environment> =
            self.envs.iter().skip(frame.env_base).cloned().collect();
        rebase_try_heights(&mut environments, frame.entry, false);

        let ctx = self.heap.alloc(HeapValue::Generator(Box::new(GeneratorContext {
            state: GeneratorState::SuspendedStart,
            resume_pc,
            stack,
            environments,
            this: frame.this,
            delegate: None,
        })));

        let proto = Value::Reference(self.realm.object_prototype);
        let iterator = self.heap.alloc_object(proto, ObjectKind::Generator(ctx));
        let next = self.create_host_function("next", 1, self.intrinsics.generator_next, vec![
            Value::Reference(ctx),
        ])?;
        let ret = self.create_host_function("return", 1, self.intrinsics.generator_return, vec![
            Value::Reference(ctx),
        ])?;
        self.heap.define_property(
            iterator,
            PropertyKey::from("next"),
            PropertyDescriptor::hidden(Value::Reference(next)),
        )?;
        self.heap.define_property(
            iterator,
            PropertyKey::from("return"),
            PropertyDescriptor::hidden(Value::Reference(ret)),
        )?;

        log::debug!("generator {} created, body at {}", ctx, resume_pc);
        self.push(Value::Reference(iterator));
        Ok(())
    }

    /// `next(arg)`: resume a suspended generator in a new frame
    pub(crate) fn resume_generator(&mut self, ctx_ref: HeapRef, arg: Value) -> Result<(), JsError> {
        self.check_call_depth()?;
        let ctx = self.heap.generator_mut(ctx_ref)?;
        match ctx.state {
            GeneratorState::Done => {
                let result = self.iter_result(Value::Undefined, true)?;
                self.push(result);
                return Ok(());
            }
            GeneratorState::Running => {
                return Err(JsError::type_error("generator is already running"));
            }
            GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {}
        }

        let push_arg = ctx.state == GeneratorState::SuspendedYield || ctx.delegate.is_some();
        ctx.state = GeneratorState::Running;
        let mut stack = std::mem::take(&mut ctx.stack);
        let mut environments = std::mem::take(&mut ctx.environments);
        let this = ctx.this.clone();
        let resume_pc = ctx.resume_pc;

        let entry = self.stack.len();
        rebase_try_heights(&mut environments, entry, true);
        self.frames.push(StackFrame {
            ret: self.pc,
            entry,
            env_base: self.envs.len(),
            this,
            generator: Some(ctx_ref),
            discard_result: false,
        });
        self.envs.extend(environments);
        self.stack.append(&mut stack);
        if push_arg {
            self.push(arg);
        }
        self.pc = resume_pc;
        log::debug!("generator {} resumed at {}", ctx_ref, resume_pc);
        Ok(())
    }

    /// Save the running generator and return `{ value, done: false }` to
    /// its caller. Execution resumes at `resume_pc`.
    pub(crate) fn suspend_generator(&mut self, value: Value, resume_pc: usize) -> Result<(), JsError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| JsError::malformed("Yield outside a generator"))?;
        let Some(ctx_ref) = frame.generator else {
            return Err(JsError::malformed("Yield outside a generator"));
        };
        let stack = self.stack.split_off(frame.entry.min(self.stack.len()));
        let mut environments = self.envs.split_off(frame.env_base);
        rebase_try_heights(&mut environments, frame.entry, false);

        let ctx = self.heap.generator_mut(ctx_ref)?;
        ctx.stack = stack;
        ctx.environments = environments;
        ctx.resume_pc = resume_pc;
        ctx.state = GeneratorState::SuspendedYield;

        self.pc = frame.ret;
        log::debug!("generator {} suspended, resumes at {}", ctx_ref, resume_pc);
        let result = self.iter_result(value, false)?;
        self.push(result);
        Ok(())
    }

    /// Complete a generator frame with `{ value, done: true }`
    pub(crate) fn finish_generator(&mut self, frame: StackFrame, value: Value) -> Result<(), JsError> {
        self.stack.truncate(frame.entry);
        self.envs.truncate(frame.env_base);
        self.pc = frame.ret;
        if let Some(ctx_ref) = frame.generator {
            self.mark_generator_done(ctx_ref)?;
        }
        let result = self.iter_result(value, true)?;
        self.push(result);
        Ok(())
    }

    pub(crate) fn mark_generator_done(&mut self, ctx_ref: HeapRef) -> Result<(), JsError> {
        let ctx = self.heap.generator_mut(ctx_ref)?;
        ctx.state = GeneratorState::Done;
        ctx.stack.clear();
        ctx.environments.clear();
        ctx.delegate = None;
        log::debug!("generator {} finished", ctx_ref);
        Ok(())
    }

    /// `return(value)` on an iterator object
    pub(crate) fn return_generator(&mut self, ctx_ref: HeapRef, value: Value) -> Result<(), JsError> {
        if self.heap.generator(ctx_ref)?.state == GeneratorState::Running {
            return Err(JsError::type_error("generator is already running"));
        }
        self.mark_generator_done(ctx_ref)?;
        let result = self.iter_result(value, true)?;
        self.push(result);
        Ok(())
    }

    fn delegate_for(&self, iterable: Value) -> Result<Delegate, JsError> {
        match &iterable {
            Value::String(s) => Ok(Delegate::Values {
                items: s.as_str().chars().map(|c| Value::from(c.to_string())).collect(),
                cursor: 0,
            }),
            Value::Reference(r) => match &self.heap.object(*r)?.kind {
                ObjectKind::Array(_) => Ok(Delegate::Values {
                    items: self.heap.object(*r)?.own_enumerable_values(),
                    cursor: 0,
                }),
                ObjectKind::Generator(_) => Ok(Delegate::Generator(*r)),
                _ => Err(JsError::type_error("yield* operand is not iterable")),
            },
            other => Err(JsError::type_error(format!(
                "yield* operand is not iterable: {}",
                self.inspect(other)
            ))),
        }
    }

    /// `YieldStar` at `at_pc`. While a delegate is active the instruction
    /// re-executes on every resume, consuming the value passed to `next`.
    pub(crate) fn yield_star(&mut self, at_pc: usize) -> Result<(), JsError> {
        let ctx_ref = self
            .current_frame()?
            .generator
            .ok_or_else(|| JsError::malformed("YieldStar outside a generator"))?;
        let (mut delegate, sent) = match self.heap.generator_mut(ctx_ref)?.delegate.take() {
            None => {
                let iterable = self.pop()?;
                (self.delegate_for(iterable)?, Value::Undefined)
            }
            Some(delegate) => (delegate, self.pop()?),
        };

        let step = match &mut delegate {
            Delegate::Values { items, cursor } => match items.get(*cursor).cloned() {
                Some(item) => {
                    *cursor += 1;
                    Some(item)
                }
                None => {
                    self.push(Value::Undefined);
                    None
                }
            },
            Delegate::Generator(obj) => {
                let receiver = Value::Reference(*obj);
                let next = self.heap.get_property(*obj, &PropertyKey::from("next"))?;
                let result = match self.invoke(next, receiver, vec![sent]) {
                    Ok(result) => result,
                    Err(e) => return self.rethrow_host_error(e),
                };
                let done = self.get_property(&result, "done")?.to_boolean();
                let value = self.get_property(&result, "value")?;
                if done {
                    self.push(value);
                    None
                } else {
                    Some(value)
                }
            }
        };

        match step {
            Some(value) => {
                self.heap.generator_mut(ctx_ref)?.delegate = Some(delegate);
                self.suspend_generator(value, at_pc)
            }
            None => Ok(()),
        }
    }
}
