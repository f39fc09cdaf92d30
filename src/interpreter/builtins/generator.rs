//! `next` and `return` of generator iterator objects
//!
//! Both are bridge functions: resuming pushes a frame that produces the
//! `{ value, done }` record itself when it yields or returns.

use super::arg;
use crate::error::JsError;
use crate::interpreter::Vm;
use crate::value::{HeapRef, Value};

fn context(captures: &[Value]) -> Result<HeapRef, JsError> {
    captures
        .first()
        .and_then(Value::as_reference)
        .ok_or_else(|| JsError::internal_error("generator method without a context"))
}

/// `gen.next(value)`
pub fn generator_next(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<(), JsError> {
    let ctx = context(captures)?;
    vm.resume_generator(ctx, arg(args, 0))
}

/// `gen.return(value)`
pub fn generator_return(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<(), JsError> {
    let ctx = context(captures)?;
    vm.return_generator(ctx, arg(args, 0))
}
