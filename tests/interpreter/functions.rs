//! Calls, parameters, `this` binding and Function.prototype

use super::{create_test_vm, eval, eval_inspect, eval_result, run_to_completion, throws_error};
use tsbc::{JsError, Value};

/// function add(a, b) { return this.base + a + b }; var o = { base: 100 }
const ADD: &str = r#"
        Jump @after_add
    add:
        Const "a"
        Def
        Const "b"
        Def
        This
        Const "base"
        PropAccess
        Const "a"
        Load
        Add
        Const "b"
        Load
        Add
        Ret
    after_add:
        Push 0
        Push @add
        Push 2
        Const "add"
        Const "function add(a, b) { return this.base + a + b }"
        CreateFunction
        Drop
        Const 100
        Const "base"
        Push 0
        CreateObject 1
        Const "o"
        Def
"#;

#[test]
fn test_parameters_bind_in_order() {
    // function sub(a, b) { return a - b } sub(10, 3)
    let source = r#"
        Jump @after
    sub:
        Const "a"
        Def
        Const "b"
        Def
        Const "a"
        Load
        Const "b"
        Load
        Sub
        Ret
    after:
        Push 0
        Push @sub
        Push 2
        Const "sub"
        Const "function sub(a, b) { return a - b }"
        CreateFunction
        Drop
        Const 10
        Const 3
        Push 2
        Const "sub"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(7.0));
}

#[test]
fn test_missing_arguments_are_undefined_and_extras_ignored() {
    let source = r#"
        Jump @after
    f:
        Const "a"
        Def
        Const "b"
        Def
        Const "a"
        Load
        Const "b"
        Load
        CreateArray 2
        Ret
    after:
        Push 0
        Push @f
        Push 2
        Const "f"
        Const "function f(a, b) { return [a, b] }"
        CreateFunction
        Drop
        One
        Push 1
        Const "f"
        Load
        Call
        One
        Const 2
        Const 3
        Push 3
        Const "f"
        Load
        Call
        CreateArray 2
    "#;
    assert_eq!(eval_inspect(source), "[[1, undefined], [1, 2]]");
}

#[test]
fn test_function_without_return_value_yields_undefined() {
    let source = r#"
        Jump @after
    f:
        Ret
    after:
        Push 0
        Push @f
        Push 0
        Const "f"
        Const "function f() {}"
        CreateFunction
        Drop
        Push 0
        Const "f"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Undefined);
}

#[test]
fn test_recursion() {
    // function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) } fact(10)
    let source = r#"
        Jump @after
    fact:
        Const "n"
        Def
        Const "n"
        Load
        One
        LTE
        JumpIfFalse @recurse
        One
        Ret
    recurse:
        Const "n"
        Load
        Const "n"
        Load
        One
        Sub
        Push 1
        Const "fact"
        Load
        Call
        Mul
        Ret
    after:
        Push 0
        Push @fact
        Push 1
        Const "fact"
        Const "function fact(n) {}"
        CreateFunction
        Drop
        Const 10
        Push 1
        Const "fact"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(3628800.0));
}

#[test]
fn test_call_apply_and_bind() {
    let call = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        One
        Const 2
        Push 3
        Const "add"
        Load
        Const "call"
        CallMethod
    "#
    );
    assert_eq!(eval(&call), Value::Number(103.0));

    let apply = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        One
        Const 2
        CreateArray 2
        Push 2
        Const "add"
        Load
        Const "apply"
        CallMethod
    "#
    );
    assert_eq!(eval(&apply), Value::Number(103.0));

    let bind = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        One
        Push 2
        Const "add"
        Load
        Const "bind"
        CallMethod
        Const "bound"
        Def
        Const 2
        Push 1
        Const "bound"
        Load
        Call
    "#
    );
    assert_eq!(eval(&bind), Value::Number(103.0));
}

#[test]
fn test_bound_function_ignores_call_receiver() {
    // add.bind(o, 1).call({ base: 0 }, 2)
    let source = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        One
        Push 2
        Const "add"
        Load
        Const "bind"
        CallMethod
        Const "bound"
        Def
        CreateObject 0
        Const 2
        Push 2
        Const "bound"
        Load
        Const "call"
        CallMethod
    "#
    );
    assert_eq!(eval(&source), Value::Number(103.0));
}

#[test]
fn test_bound_function_name() {
    let source = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        Push 1
        Const "add"
        Load
        Const "bind"
        CallMethod
    "#
    );
    assert_eq!(eval_inspect(&source), "[Function: bound add]");
}

#[test]
fn test_apply_with_non_array_is_fatal() {
    let source = format!(
        "{}{}",
        ADD,
        r#"
        Const "o"
        Load
        Const 5
        Push 2
        Const "add"
        Load
        Const "apply"
        CallMethod
    "#
    );
    let err = eval_result(&source).unwrap_err();
    assert!(matches!(err.root_cause(), JsError::InvalidCast { .. }));
}

#[test]
fn test_arguments_array() {
    // function f() { return [arguments, arguments.length] } f(1, "a")
    let source = r#"
        Jump @after
    f:
        Const "arguments"
        Load
        Const "arguments"
        Load
        Const "length"
        PropAccess
        CreateArray 2
        Ret
    after:
        Push 0
        Push @f
        Push 0
        Const "f"
        Const "function f() { return [arguments, arguments.length] }"
        CreateFunction
        Drop
        One
        Const "a"
        Push 2
        Const "f"
        Load
        Call
    "#;
    assert_eq!(eval_inspect(source), r#"[[1, "a"], 2]"#);
}

#[test]
fn test_lambdas_have_no_arguments() {
    let source = r#"
        Jump @after
    f:
        Const "arguments"
        Load
        Ret
    after:
        Push 0
        Push @f
        Push 0
        Const "() => arguments"
        CreateLambda
        Const "f"
        Def
        Push 0
        Const "f"
        Load
        Call
    "#;
    assert!(throws_error(source, "cannot find name arguments"));
}

#[test]
fn test_to_string_returns_source_text() {
    let source = format!(
        "{}{}",
        ADD,
        r#"
        Push 0
        Const "add"
        Load
        Const "toString"
        CallMethod
    "#
    );
    assert_eq!(
        eval(&source),
        Value::from("function add(a, b) { return this.base + a + b }")
    );

    // string conversion of a function is its source text as well
    let source = format!("{}\nConst \"\"\nConst \"add\"\nLoad\nAdd\n", ADD);
    assert_eq!(
        eval(&source),
        Value::from("function add(a, b) { return this.base + a + b }")
    );
}

#[test]
fn test_call_depth_limit() {
    // function r() { return r() } r()
    let source = r#"
        Jump @after
    r:
        Push 0
        Const "r"
        Load
        Call
        Ret
    after:
        Push 0
        Push @r
        Push 0
        Const "r"
        Const "function r() { return r() }"
        CreateFunction
        Drop
        Push 0
        Const "r"
        Load
        Call
    "#;
    let mut vm = create_test_vm(source);
    vm.set_max_call_depth(50);
    let err = run_to_completion(&mut vm).unwrap_err();
    match err.root_cause() {
        JsError::CallStackOverflow { depth } => assert_eq!(*depth, 50),
        other => panic!("expected a stack overflow, got {:?}", other),
    }
}

#[test]
fn test_method_call_binds_this() {
    // var o = { v: 7, get: function () { return this.v } }; o.get()
    let source = r#"
        Jump @after
    m:
        This
        Const "v"
        PropAccess
        Ret
    after:
        Const 7
        Const "v"
        Push 0
        Push 0
        Push @m
        Push 0
        Const ""
        Const "function () { return this.v }"
        CreateFunction
        Const "get"
        Push 0
        CreateObject 2
        Const "o"
        Def
        Push 0
        Const "o"
        Load
        Const "get"
        CallMethod
    "#;
    assert_eq!(eval(source), Value::Number(7.0));
}

#[test]
fn test_plain_call_has_undefined_this() {
    let source = r#"
        Jump @after
    f:
        This
        Ret
    after:
        Push 0
        Push @f
        Push 0
        Const "f"
        Const "function f() { return this }"
        CreateFunction
        Drop
        Push 0
        Const "f"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Undefined);
}

#[test]
fn test_lambda_captures_this() {
    // var o = { v: 7, m: function () { return () => this.v } }; o.m()()
    let source = r#"
        Jump @after
    m:
        Push 0
        Push @lambda
        Push 0
        Const "() => this.v"
        CreateLambda
        Ret
    lambda:
        This
        Const "v"
        PropAccess
        Ret
    after:
        Const 7
        Const "v"
        Push 0
        Push 0
        Push @m
        Push 0
        Const ""
        Const "function () { return () => this.v }"
        CreateFunction
        Const "m"
        Push 0
        CreateObject 2
        Const "o"
        Def
        Push 0
        Push 0
        Const "o"
        Load
        Const "m"
        CallMethod
        Call
    "#;
    assert_eq!(eval(source), Value::Number(7.0));
}

#[test]
fn test_calling_non_functions_is_a_type_error() {
    assert!(throws_error("Push 0\nOne\nCall", "1 is not a function"));
    assert!(throws_error(
        "Push 0\nCreateObject 0\nConst \"nope\"\nCallMethod",
        "{}.nope is not a function"
    ));
}

#[test]
fn test_function_prototype_is_callable() {
    let source = r#"
        Push 0
        Const "Function"
        Load
        Const "prototype"
        PropAccess
        Call
    "#;
    assert_eq!(eval(source), Value::Undefined);
}

#[test]
fn test_function_constructor_is_unsupported() {
    let err = eval_result("Const \"return 1\"\nPush 1\nConst \"Function\"\nLoad\nCall").unwrap_err();
    assert!(matches!(err.root_cause(), JsError::TypeError { .. }));
}

#[test]
fn test_inspect_functions() {
    let source = r#"
        Jump @after
    f:
        Ret
    after:
        Push 0
        Push @f
        Push 0
        Const "named"
        Const "function named() {}"
        CreateFunction
        Push 0
        Push @f
        Push 0
        Const "() => {}"
        CreateLambda
        CreateArray 2
    "#;
    assert_eq!(
        eval_inspect(source),
        "[[Function: named], [Function (anonymous)]]"
    );
}
