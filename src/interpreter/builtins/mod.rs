//! Built-in globals installed by the default initializer

pub mod array;
pub mod function;
pub mod generator;
pub mod global;
pub mod object;
pub mod string;

pub use array::*;
pub use function::*;
pub use generator::*;
pub use global::*;
pub use object::*;
pub use string::*;

use crate::error::JsError;
use crate::interpreter::Vm;
use crate::value::{HeapRef, PropertyDescriptor, PropertyKey, Value};

/// Register the standard globals: `print`, `gc`, `tsBcUtils`, `Object`,
/// `Function`, `Array` and `String`.
pub fn install(vm: &mut Vm) -> Result<(), JsError> {
    init_globals(vm)?;

    init_function_prototype(vm)?;
    init_array_prototype(vm)?;
    init_string_prototype(vm)?;

    let object = create_object_constructor(vm)?;
    let function = create_function_constructor(vm)?;
    let array = create_array_constructor(vm)?;
    let string = create_string_constructor(vm)?;

    vm.define_global("Object", Value::Reference(object));
    vm.define_global("Function", Value::Reference(function));
    vm.define_global("Array", Value::Reference(array));
    vm.define_global("String", Value::Reference(string));
    Ok(())
}

/// Point `constructor.prototype` at `prototype` and back again
pub(crate) fn link_constructor(
    vm: &mut Vm,
    constructor: HeapRef,
    prototype: HeapRef,
) -> Result<(), JsError> {
    vm.heap.define_property(
        constructor,
        PropertyKey::from("prototype"),
        PropertyDescriptor::hidden(Value::Reference(prototype)),
    )?;
    vm.heap.define_property(
        prototype,
        PropertyKey::from("constructor"),
        PropertyDescriptor::hidden(Value::Reference(constructor)),
    )
}

/// First argument, or `undefined`
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}
