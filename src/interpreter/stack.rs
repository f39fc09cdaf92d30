//! Operand stack and call frames

use serde::{Deserialize, Serialize};

use super::Vm;
use crate::error::JsError;
use crate::gc::Traceable;
use crate::value::{HeapRef, JsString, Value};

/// One active call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFrame {
    /// Program counter to continue at after `Ret`
    pub ret: usize,
    /// Operand stack height at entry; the callee owns everything above it
    pub entry: usize,
    /// Index of the frame's `Lexer` scope on the environment stack
    pub env_base: usize,
    pub this: Value,
    /// Generator context, when this frame runs a resumed generator
    pub generator: Option<HeapRef>,
    /// Setter calls drop their return value
    pub discard_result: bool,
}

impl Traceable for StackFrame {
    fn trace<F: FnMut(HeapRef)>(&self, visitor: &mut F) {
        self.this.trace(visitor);
        if let Some(ctx) = self.generator {
            visitor(ctx);
        }
    }

    fn relocate<F: Fn(HeapRef) -> HeapRef>(&mut self, map: &F) {
        self.this.relocate(map);
        if let Some(ctx) = &mut self.generator {
            *ctx = map(*ctx);
        }
    }
}

/// Host-call boundary recorded by `Vm::invoke`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Boundary {
    pub frames: usize,
    pub envs: usize,
    pub stack: usize,
}

impl Vm {
    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Result<Value, JsError> {
        self.stack.pop().ok_or(JsError::StackUnderflow)
    }

    pub(crate) fn peek(&self) -> Result<&Value, JsError> {
        self.stack.last().ok_or(JsError::StackUnderflow)
    }

    /// Pop `count` values, returned in push order
    pub(crate) fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, JsError> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(JsError::StackUnderflow)?;
        Ok(self.stack.split_off(start))
    }

    pub(crate) fn pop_string(&mut self) -> Result<JsString, JsError> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            other => Err(JsError::invalid_cast("string", other.kind_name())),
        }
    }

    pub(crate) fn pop_index(&mut self) -> Result<usize, JsError> {
        self.pop()?.as_index()
    }

    /// `this` of the innermost frame; `undefined` at top level
    pub(crate) fn current_this(&self) -> Value {
        self.frames
            .last()
            .map(|frame| frame.this.clone())
            .unwrap_or_default()
    }

    pub(crate) fn current_frame(&self) -> Result<&StackFrame, JsError> {
        self.frames
            .last()
            .ok_or_else(|| JsError::malformed("instruction requires a call frame"))
    }
}
