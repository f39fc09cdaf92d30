//! `String` constructor and `String.prototype` methods
//!
//! Strings are immediate values; methods receive the string itself as
//! `this`.

use super::{arg, link_constructor};
use crate::error::JsError;
use crate::interpreter::{HostFn, Vm};
use crate::value::{HeapRef, JsString, Value};

pub fn init_string_prototype(vm: &mut Vm) -> Result<(), JsError> {
    let proto = vm.realm().string_prototype;
    vm.define_method(proto, "split", 1, HostFn::Native(string_split))?;
    vm.define_method(proto, "indexOf", 1, HostFn::Native(string_index_of))?;
    vm.define_getter(proto, "length", string_length)?;
    Ok(())
}

pub fn create_string_constructor(vm: &mut Vm) -> Result<HeapRef, JsError> {
    let constructor =
        vm.create_native_function("String", 1, HostFn::Native(string_constructor_fn))?;
    let prototype = vm.realm().string_prototype;
    link_constructor(vm, constructor, prototype)?;
    Ok(constructor)
}

fn this_string(vm: &Vm, this: &Value, method: &str) -> Result<JsString, JsError> {
    match this {
        Value::String(s) => Ok(s.clone()),
        other => Err(JsError::type_error(format!(
            "String.prototype.{} called on {}",
            method,
            vm.inspect(other)
        ))),
    }
}

/// `String(x)`; no argument gives the empty string
pub fn string_constructor_fn(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    match args.first() {
        Some(value) => Ok(Value::String(vm.to_js_string(value))),
        None => Ok(Value::from("")),
    }
}

pub fn string_split(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let s = this_string(vm, &this, "split")?;
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::String(s)],
        Value::String(sep) if sep.is_empty() => {
            s.as_str().chars().map(|c| Value::from(c.to_string())).collect()
        }
        sep => {
            let sep = vm.to_js_string(&sep);
            s.as_str().split(sep.as_str()).map(Value::from).collect()
        }
    };
    Ok(Value::Reference(vm.create_array(parts)))
}

/// Character index of the first occurrence; -1 when absent
pub fn string_index_of(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let s = this_string(vm, &this, "indexOf")?;
    let needle = vm.to_js_string(&arg(args, 0));
    let index = s
        .as_str()
        .find(needle.as_str())
        .map(|byte| s.as_str().char_indices().take_while(|(i, _)| *i < byte).count());
    Ok(Value::Number(index.map_or(-1.0, |i| i as f64)))
}

pub fn string_length(
    _vm: &mut Vm,
    this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let len = match &this {
        Value::String(s) => s.char_count(),
        _ => 0,
    };
    Ok(Value::Number(len as f64))
}
