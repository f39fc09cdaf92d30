//! `Function` constructor and `Function.prototype` methods

use super::{arg, link_constructor};
use crate::error::JsError;
use crate::interpreter::{HostFn, Vm};
use crate::value::{HeapRef, JsString, Value};

/// Set up methods on the function prototype created by `Vm::new`
pub fn init_function_prototype(vm: &mut Vm) -> Result<(), JsError> {
    let proto = vm.realm().function_prototype;
    vm.define_method(proto, "call", 1, HostFn::Bridge(function_call))?;
    vm.define_method(proto, "apply", 2, HostFn::Bridge(function_apply))?;
    vm.define_method(proto, "bind", 1, HostFn::Native(function_bind))?;
    vm.define_method(proto, "toString", 0, HostFn::Native(function_to_string))?;
    Ok(())
}

pub fn create_function_constructor(vm: &mut Vm) -> Result<HeapRef, JsError> {
    let constructor =
        vm.create_native_function("Function", 0, HostFn::Native(function_constructor_fn))?;
    let prototype = vm.realm().function_prototype;
    link_constructor(vm, constructor, prototype)?;
    Ok(constructor)
}

/// `Function.prototype` is itself callable and returns `undefined`
pub fn function_prototype_call(
    _vm: &mut Vm,
    _this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    Ok(Value::Undefined)
}

/// Source compilation is not available at run time
pub fn function_constructor_fn(
    _vm: &mut Vm,
    _this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    Err(JsError::type_error(
        "Function constructor cannot compile source text",
    ))
}

fn ensure_callable(vm: &Vm, target: &Value, method: &str) -> Result<(), JsError> {
    if vm.heap.is_callable(target) {
        Ok(())
    } else {
        Err(JsError::type_error(format!(
            "Function.prototype.{} called on {}",
            method,
            vm.inspect(target)
        )))
    }
}

/// `f.call(thisArg, ...args)`
pub fn function_call(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<(), JsError> {
    ensure_callable(vm, &this, "call")?;
    let this_arg = arg(args, 0);
    let rest = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
    vm.call_value(this, rest, this_arg, false)
}

/// `f.apply(thisArg, argsArray)`
pub fn function_apply(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<(), JsError> {
    ensure_callable(vm, &this, "apply")?;
    let this_arg = arg(args, 0);
    let call_args = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => vm.array_items(&list)?,
    };
    vm.call_value(this, call_args, this_arg, false)
}

/// `f.bind(thisArg, ...args)`: a bridge that calls `f` with the bound
/// receiver and the bound arguments prepended
pub fn function_bind(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    ensure_callable(vm, &this, "bind")?;
    let (name, param_count) = match vm.heap.function_of(&this) {
        Some(func) => (
            JsString::from("bound ") + func.name.as_str(),
            func.param_count.saturating_sub(args.len().saturating_sub(1)),
        ),
        None => (JsString::from("bound "), 0),
    };
    let mut captures = vec![this, arg(args, 0)];
    captures.extend(args.iter().skip(1).cloned());
    let id = vm.intrinsics.bound_function;
    let bound = vm.create_host_function(name.as_str(), param_count, id, captures)?;
    Ok(Value::Reference(bound))
}

/// Body of every bound function. Captures are `[target, this, ...args]`.
pub fn bound_function_call(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<(), JsError> {
    let target = arg(captures, 0);
    let bound_this = arg(captures, 1);
    let mut call_args: Vec<Value> = captures.iter().skip(2).cloned().collect();
    call_args.extend(args.iter().cloned());
    vm.call_value(target, call_args, bound_this, false)
}

pub fn function_to_string(
    vm: &mut Vm,
    this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    ensure_callable(vm, &this, "toString")?;
    Ok(Value::String(vm.to_js_string(&this)))
}
