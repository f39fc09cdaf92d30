//! `Array` constructor and `Array.prototype` methods

use super::{arg, link_constructor};
use crate::error::JsError;
use crate::interpreter::{HostFn, Vm};
use crate::value::{HeapRef, PropertyKey, Value};

/// Initialize `Array.prototype`. The prototype object already exists in the
/// realm.
pub fn init_array_prototype(vm: &mut Vm) -> Result<(), JsError> {
    let proto = vm.realm().array_prototype;
    vm.define_method(proto, "join", 1, HostFn::Native(array_join))?;
    vm.define_method(proto, "indexOf", 1, HostFn::Native(array_index_of))?;
    vm.define_method(proto, "push", 1, HostFn::Native(array_push))?;
    vm.define_getter(proto, "length", array_length)?;
    Ok(())
}

pub fn create_array_constructor(vm: &mut Vm) -> Result<HeapRef, JsError> {
    let constructor =
        vm.create_native_function("Array", 0, HostFn::Native(array_constructor_fn))?;
    let prototype = vm.realm().array_prototype;
    link_constructor(vm, constructor, prototype)?;
    Ok(constructor)
}

fn this_array(vm: &Vm, this: &Value, method: &str) -> Result<HeapRef, JsError> {
    if let Value::Reference(r) = this {
        if vm.heap.object(*r)?.array_items().is_some() {
            return Ok(*r);
        }
    }
    Err(JsError::type_error(format!(
        "Array.prototype.{} called on {}",
        method,
        vm.inspect(this)
    )))
}

/// `Array(...items)`
pub fn array_constructor_fn(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    Ok(Value::Reference(vm.create_array(args.to_vec())))
}

pub fn array_join(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let arr = this_array(vm, &this, "join")?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        sep => vm.to_js_string(&sep).to_string(),
    };
    let items = vm
        .heap
        .object(arr)?
        .padded_elements()
        .ok_or_else(|| JsError::type_error("Invalid string length"))?;
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            other => vm.to_js_string(other).to_string(),
        })
        .collect();
    Ok(Value::from(parts.join(&separator)))
}

/// Strict-equality search; -1 when absent
pub fn array_index_of(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let arr = this_array(vm, &this, "indexOf")?;
    let needle = arg(args, 0);
    let obj = vm.heap.object(arr)?;
    let dense = obj
        .array_items()
        .and_then(|items| items.iter().position(|item| item.strict_equals(&needle)))
        .map(|i| i as f64);
    let index = dense.or_else(|| {
        obj.sparse_elements()
            .into_iter()
            .find(|(_, item)| item.strict_equals(&needle))
            .map(|(i, _)| f64::from(i))
    });
    Ok(Value::Number(index.unwrap_or(-1.0)))
}

/// Append and return the new length
pub fn array_push(
    vm: &mut Vm,
    this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let arr = this_array(vm, &this, "push")?;
    let obj = vm.heap.object_mut(arr)?;
    for value in args {
        let index = obj
            .array_length()
            .and_then(|len| u32::try_from(len).ok())
            .filter(|len| *len < u32::MAX)
            .ok_or_else(|| JsError::type_error("Invalid array length"))?;
        obj.set_own(PropertyKey::Index(index), value.clone());
    }
    let len = obj.array_length().unwrap_or(0);
    Ok(Value::Number(len as f64))
}

pub fn array_length(
    vm: &mut Vm,
    this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let len = match &this {
        Value::Reference(r) => vm.heap.object(*r)?.array_length().unwrap_or(0),
        _ => 0,
    };
    Ok(Value::Number(len as f64))
}
