//! Upvalue capture through shared cells

use super::{eval, eval_inspect};
use tsbc::Value;

/// function foo() { var a = 0; function bar() { a += 1; return a } return bar }
const COUNTER_FACTORY: &str = r#"
        Jump @after_foo
    foo:
        Const 0
        Const "a"
        Def
        Jump @after_bar
    bar:
        Const "a"
        Load
        One
        Add
        Const "a"
        Set
        Const "a"
        Load
        Ret
    after_bar:
        Const "a"
        Push 1
        Push @bar
        Push 0
        Const "bar"
        Const "function bar() { a += 1; return a }"
        CreateFunction
        Drop
        Const "bar"
        Load
        Ret
    after_foo:
        Push 0
        Push @foo
        Push 0
        Const "foo"
        Const "function foo() { var a = 0; function bar() { a += 1; return a } return bar }"
        CreateFunction
        Drop
"#;

#[test]
fn test_closure_state_survives_calls() {
    // var b = foo(); b(); b()
    let source = format!(
        "{}{}",
        COUNTER_FACTORY,
        r#"
        Push 0
        Const "foo"
        Load
        Call
        Const "b"
        Def
        Push 0
        Const "b"
        Load
        Call
        Drop
        Push 0
        Const "b"
        Load
        Call
    "#
    );
    assert_eq!(eval(&source), Value::Number(2.0));
}

#[test]
fn test_separate_factories_have_separate_state() {
    // var b = foo(), c = foo(); b(); b(); [b(), c()]
    let source = format!(
        "{}{}",
        COUNTER_FACTORY,
        r#"
        Push 0
        Const "foo"
        Load
        Call
        Const "b"
        Def
        Push 0
        Const "foo"
        Load
        Call
        Const "c"
        Def
        Push 0
        Const "b"
        Load
        Call
        Drop
        Push 0
        Const "b"
        Load
        Call
        Drop
        Push 0
        Const "b"
        Load
        Call
        Push 0
        Const "c"
        Load
        Call
        CreateArray 2
    "#
    );
    assert_eq!(eval_inspect(&source), "[3, 1]");
}

#[test]
fn test_sibling_closures_share_a_cell() {
    // function pair() { var n = 0; return [() => ++n, () => n] }
    // var p = pair(); p[0](); p[0](); p[1]()
    let source = r#"
        Jump @after_pair
    pair:
        Const 0
        Const "n"
        Def
        Jump @after_inc
    inc:
        Const "n"
        Load
        One
        Add
        Const "n"
        Set
        Const "n"
        Load
        Ret
    get:
        Const "n"
        Load
        Ret
    after_inc:
        Const "n"
        Push 1
        Push @inc
        Push 0
        Const "() => ++n"
        CreateLambda
        Const "n"
        Push 1
        Push @get
        Push 0
        Const "() => n"
        CreateLambda
        CreateArray 2
        Ret
    after_pair:
        Push 0
        Push @pair
        Push 0
        Const "pair"
        Const "function pair() {}"
        CreateFunction
        Drop
        Push 0
        Const "pair"
        Load
        Call
        Const "p"
        Def
        Push 0
        Const "p"
        Load
        Const 0
        PropAccess
        Call
        Drop
        Push 0
        Const "p"
        Load
        Const 0
        PropAccess
        Call
        Drop
        Push 0
        Const "p"
        Load
        One
        PropAccess
        Call
    "#;
    assert_eq!(eval(source), Value::Number(2.0));
}

#[test]
fn test_closure_sees_later_outer_assignment() {
    // function outer() { var v = 1; var f = () => v; v = 2; return f() }
    let source = r#"
        Jump @after
    outer:
        One
        Const "v"
        Def
        Jump @after_f
    f:
        Const "v"
        Load
        Ret
    after_f:
        Const "v"
        Push 1
        Push @f
        Push 0
        Const "() => v"
        CreateLambda
        Const "f"
        Def
        Const 2
        Const "v"
        Set
        Push 0
        Const "f"
        Load
        Call
        Ret
    after:
        Push 0
        Push @outer
        Push 0
        Const "outer"
        Const "function outer() {}"
        CreateFunction
        Drop
        Push 0
        Const "outer"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(2.0));
}

#[test]
fn test_capture_before_definition() {
    // function outer() { var f = () => later; var later = "ok"; return f() }
    let source = r#"
        Jump @after
    outer:
        Jump @after_f
    f:
        Const "later"
        Load
        Ret
    after_f:
        Const "later"
        Push 1
        Push @f
        Push 0
        Const "() => later"
        CreateLambda
        Const "f"
        Def
        Const "ok"
        Const "later"
        Def
        Push 0
        Const "f"
        Load
        Call
        Ret
    after:
        Push 0
        Push @outer
        Push 0
        Const "outer"
        Const "function outer() {}"
        CreateFunction
        Drop
        Push 0
        Const "outer"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::from("ok"));
}

#[test]
fn test_globals_resolve_at_call_time() {
    // var g = 1; var f = () => g; g = 5; f()
    let source = r#"
        Jump @after
    f:
        Const "g"
        Load
        Ret
    after:
        One
        Const "g"
        Def
        Const "g"
        Push 1
        Push @f
        Push 0
        Const "() => g"
        CreateLambda
        Const "f"
        Def
        Const 5
        Const "g"
        Set
        Push 0
        Const "f"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(5.0));
}

#[test]
fn test_loop_closures_capture_per_iteration_bindings() {
    // var fs = []; for (var i = 0; i < 3; i++) { let j = i; fs.push(() => j) } fs[0]() + fs[2]()
    let source = r#"
        Jump @after_f
    f:
        Const "j"
        Load
        Ret
    after_f:
        CreateArray 0
        Const "fs"
        Def
        Const 0
        Const "i"
        Def
        EnterIterableBlockScope @exit
    top:
        Const "i"
        Load
        Const 3
        LT
        JumpIfFalse @done
        EnterBlockScope
        Const "i"
        Load
        Const "j"
        DefBlock
        Const "j"
        Push 1
        Push @f
        Push 0
        Const "() => j"
        CreateLambda
        Push 1
        Const "fs"
        Load
        Const "push"
        CallMethod
        Drop
        ExitBlockScope
        Const "i"
        Load
        One
        Add
        Const "i"
        Set
        Jump @top
    done:
        ExitBlockScope
    exit:
        Push 0
        Const "fs"
        Load
        Const 0
        PropAccess
        Call
        Push 0
        Const "fs"
        Load
        Const 2
        PropAccess
        Call
        Add
    "#;
    assert_eq!(eval(source), Value::Number(2.0));
}

#[test]
fn test_nested_function_calls_itself_without_upvalues() {
    // function outer() { function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) } return fact(5) }
    // `fact` is created with no upvalues and finds its own name in `outer`'s scope
    let source = r#"
        Jump @after
    outer:
        Jump @after_fact
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
    after_fact:
        Push 0
        Push @fact
        Push 1
        Const "fact"
        Const "function fact(n) {}"
        CreateFunction
        Drop
        Const 5
        Push 1
        Const "fact"
        Load
        Call
        Ret
    after:
        Push 0
        Push @outer
        Push 0
        Const "outer"
        Const "function outer() {}"
        CreateFunction
        Drop
        Push 0
        Const "outer"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(120.0));
}

#[test]
fn test_lambda_reads_var_declared_after_it() {
    // function outer() { var f = () => x; var x = 1; return f() }
    // the lambda carries no cell for `x`
    let source = r#"
        Jump @after
    outer:
        Jump @after_f
    f:
        Const "x"
        Load
        Ret
    after_f:
        Push 0
        Push @f
        Push 0
        Const "() => x"
        CreateLambda
        Const "f"
        Def
        One
        Const "x"
        Def
        Push 0
        Const "f"
        Load
        Call
        Ret
    after:
        Push 0
        Push @outer
        Push 0
        Const "outer"
        Const "function outer() {}"
        CreateFunction
        Drop
        Push 0
        Const "outer"
        Load
        Call
    "#;
    assert_eq!(eval(source), Value::Number(1.0));
}
