//! Global functions: `print`, `gc` and the `tsBcUtils` test helpers

use super::arg;
use crate::error::JsError;
use crate::interpreter::{Callable, HostFn, Vm};
use crate::platform::ConsoleLevel;
use crate::prelude::FxHashSet;
use crate::value::{HeapRef, ObjectKind, Value};

/// Structural comparison gives up past this nesting depth
const MAX_COMPARE_DEPTH: usize = 64;

pub fn init_globals(vm: &mut Vm) -> Result<(), JsError> {
    let print = vm.create_native_function("print", 0, HostFn::Native(global_print))?;
    vm.define_global("print", Value::Reference(print));

    let gc = vm.create_native_function("gc", 0, HostFn::Native(global_gc))?;
    vm.define_global("gc", Value::Reference(gc));

    let utils = vm.create_object();
    vm.define_method(utils, "assertEquals", 3, HostFn::Native(utils_assert_equals))?;
    vm.define_global("tsBcUtils", Value::Reference(utils));
    Ok(())
}

pub fn global_print(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let line = args
        .iter()
        .map(|v| vm.display(v))
        .collect::<Vec<_>>()
        .join(" ");
    vm.console_write(ConsoleLevel::Log, &line);
    Ok(Value::Undefined)
}

pub fn global_gc(
    vm: &mut Vm,
    _this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    Ok(Value::Number(vm.gc() as f64))
}

/// `tsBcUtils.assertEquals(message, expected, actual)`
pub fn utils_assert_equals(
    vm: &mut Vm,
    _this: Value,
    args: &[Value],
    _captures: &[Value],
) -> Result<Value, JsError> {
    let message = arg(args, 0);
    let expected = arg(args, 1);
    let actual = arg(args, 2);
    let mut visiting = FxHashSet::default();
    if deep_equals(vm, &expected, &actual, 0, &mut visiting) {
        return Ok(Value::Undefined);
    }
    Err(JsError::AssertionFailed {
        message: vm.display(&message),
        expected: vm.inspect(&expected),
        actual: vm.inspect(&actual),
    })
}

/// Strict equality for primitives; arrays element-wise; objects by own
/// enumerable keys, in order. Functions compare by identity.
pub fn deep_equals(
    vm: &Vm,
    a: &Value,
    b: &Value,
    depth: usize,
    visiting: &mut FxHashSet<(HeapRef, HeapRef)>,
) -> bool {
    if a.strict_equals(b) {
        return true;
    }
    let (Value::Reference(ra), Value::Reference(rb)) = (a, b) else {
        return false;
    };
    if depth > MAX_COMPARE_DEPTH {
        return false;
    }
    // A pair already under comparison is assumed equal
    if !visiting.insert((*ra, *rb)) {
        return true;
    }
    let (Ok(oa), Ok(ob)) = (vm.heap.object(*ra), vm.heap.object(*rb)) else {
        return false;
    };
    let equal = match (&oa.kind, &ob.kind) {
        (ObjectKind::Array(xs), ObjectKind::Array(ys)) => {
            let (sparse_x, sparse_y) = (oa.sparse_elements(), ob.sparse_elements());
            xs.len() == ys.len()
                && sparse_x.len() == sparse_y.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| deep_equals(vm, x, y, depth + 1, visiting))
                && sparse_x.iter().zip(&sparse_y).all(|((i, x), (j, y))| {
                    i == j && deep_equals(vm, x, y, depth + 1, visiting)
                })
        }
        (ObjectKind::Ordinary, ObjectKind::Ordinary) => {
            let keys_a = oa.own_keys(true);
            let keys_b = ob.own_keys(true);
            keys_a == keys_b
                && keys_a.iter().all(|key| {
                    let x = oa.own_descriptor(key).and_then(|d| d.value);
                    let y = ob.own_descriptor(key).and_then(|d| d.value);
                    match (x, y) {
                        (Some(x), Some(y)) => deep_equals(vm, &x, &y, depth + 1, visiting),
                        (None, None) => true,
                        _ => false,
                    }
                })
        }
        _ => false,
    };
    visiting.remove(&(*ra, *rb));
    equal
}
