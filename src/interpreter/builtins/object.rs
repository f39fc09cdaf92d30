//! `Object` constructor

use super::{arg, link_constructor};
use crate::error::JsError;
use crate::interpreter::{HostFn, Vm};
use crate::value::{HeapRef, Value};

pub fn create_object_constructor(vm: &mut Vm) -> Result<HeapRef, JsError> {
    let constructor =
        vm.create_native_function("Object", 0, HostFn::Native(object_constructor_fn))?;
    vm.define_method(constructor, "keys", 1, HostFn::Native(object_keys))?;
    let prototype = vm.realm().object_prototype;
    link_constructor(vm, constructor, prototype)?;
    Ok(constructor)
}

/// `Object(value)`: objects pass through, anything else yields a new object
pub fn object_constructor_fn(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    match arg(args, 0) {
        value @ Value::Reference(_) => Ok(value),
        _ => Ok(Value::Reference(vm.create_object())),
    }
}

/// `Object.keys(o)`: own enumerable keys as strings
pub fn object_keys(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let keys = match arg(args, 0) {
        Value::Reference(r) => vm
            .heap
            .object(r)?
            .own_keys(true)
            .iter()
            .map(|key| Value::String(key.to_js_string()))
            .collect(),
        _ => Vec::new(),
    };
    Ok(Value::Reference(vm.create_array(keys)))
}
