//! Generator functions: yield, yield*, next(value) and return()

use super::{eval, eval_inspect, throws_error};
use tsbc::Value;

/// function* g(a) { const x = yield a; const y = yield x + 1; return y * 10 }
const ECHO: &str = r#"
        Jump @after_g
    g_params:
        Const "a"
        Def
        Jump @g_make
    g_body:
        Const "a"
        Load
        Yield
        Const "x"
        Def
        Const "x"
        Load
        One
        Add
        Yield
        Const "y"
        Def
        Const "y"
        Load
        Const 10
        Mul
        GeneratorReturn
    g_make:
        CreateGeneratorContext @g_body
        Ret
    after_g:
        Push 0
        Push @g_params
        Push 1
        Const "g"
        Const "function* g(a) { const x = yield a; const y = yield x + 1; return y * 10 }"
        CreateGenerator
        Drop
        Const 5
        Push 1
        Const "g"
        Load
        Call
        Const "it"
        Def
"#;

/// `it.next(<arg>)` with the argument instructions spliced in
fn next_with(arg: &str) -> String {
    format!("{}\nPush 1\nConst \"it\"\nLoad\nConst \"next\"\nCallMethod\n", arg)
}

const NEXT: &str = "Push 0\nConst \"it\"\nLoad\nConst \"next\"\nCallMethod\n";

#[test]
fn test_yield_and_resume_values() {
    let mut source = ECHO.to_string();
    source.push_str(NEXT);
    source.push_str("Const \"value\"\nPropAccess\n");
    source.push_str(&next_with("Const 6"));
    source.push_str("Const \"value\"\nPropAccess\n");
    source.push_str(&next_with("One"));
    source.push_str("Const \"r3\"\nDef\n");
    source.push_str(NEXT);
    source.push_str("Const \"r4\"\nDef\n");
    source.push_str(
        r#"
        Const "r3"
        Load
        Const "value"
        PropAccess
        Const "r3"
        Load
        Const "done"
        PropAccess
        Const "r4"
        Load
        Const "value"
        PropAccess
        Const "r4"
        Load
        Const "done"
        PropAccess
        CreateArray 6
    "#,
    );
    assert_eq!(eval_inspect(&source), "[5, 7, 10, true, undefined, true]");
}

#[test]
fn test_first_next_reports_not_done() {
    let source = format!("{}{}", ECHO, NEXT);
    assert_eq!(eval_inspect(&source), "{ value: 5, done: false }");
}

#[test]
fn test_generator_object_rendering() {
    let source = format!("{}Const \"it\"\nLoad\n", ECHO);
    assert_eq!(eval_inspect(&source), "Object [Generator] {}");
    let source = format!("{}Const \"g\"\nLoad\n", ECHO);
    assert_eq!(eval_inspect(&source), "[GeneratorFunction: g]");
    let source = format!("{}Const \"g\"\nLoad\nTypeOf\n", ECHO);
    assert_eq!(eval(&source), Value::from("function"));
}

#[test]
fn test_return_finishes_generator() {
    let ret = next_with("Const 99").replace("\"next\"", "\"return\"");

    // var r = it.return(99); it.next(); r
    let source = format!("{}{}Const \"r\"\nDef\n{}Drop\nConst \"r\"\nLoad\n", ECHO, ret, NEXT);
    assert_eq!(eval_inspect(&source), "{ value: 99, done: true }");

    // it.return(99); it.next()
    let source = format!("{}{}Drop\n{}", ECHO, ret, NEXT);
    assert_eq!(eval_inspect(&source), "{ value: undefined, done: true }");
}

#[test]
fn test_locals_survive_suspension() {
    // function* count() { let i = 0; while (true) { yield i; i = i + 1 } }
    let source = r#"
        Jump @after
    params:
        Jump @make
    body:
        Const 0
        Const "i"
        Def
        EnterIterableBlockScope @exit
    top:
        EnterBlockScope
        Const "i"
        Load
        Yield
        Drop
        Const "i"
        Load
        One
        Add
        Const "i"
        Set
        ExitBlockScope
        Jump @top
        ExitBlockScope
    exit:
        GeneratorReturn
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Push 0
        Push @params
        Push 0
        Const "count"
        Const "function* count() {}"
        CreateGenerator
        Drop
        Push 0
        Const "count"
        Load
        Call
        Const "it"
        Def
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        Drop
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        Drop
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        Const "value"
        PropAccess
    "#;
    assert_eq!(eval(source), Value::Number(2.0));
}

#[test]
fn test_yield_star_over_array_and_generator() {
    // function* inner() { yield "b"; return "r" }
    // function* outer() { yield "a"; const r = yield* inner(); yield* [r, "c"] }
    // [...outer()]
    let source = r#"
        Jump @after
    inner_params:
        Jump @inner_make
    inner_body:
        Const "b"
        Yield
        Drop
        Const "r"
        GeneratorReturn
    inner_make:
        CreateGeneratorContext @inner_body
        Ret
    outer_params:
        Jump @outer_make
    outer_body:
        Const "a"
        Yield
        Drop
        Push 0
        Const "inner"
        Load
        Call
        YieldStar
        Const "r"
        Def
        Const "r"
        Load
        Const "c"
        CreateArray 2
        YieldStar
        Drop
        GeneratorReturn
    outer_make:
        CreateGeneratorContext @outer_body
        Ret
    after:
        Push 0
        Push @inner_params
        Push 0
        Const "inner"
        Const "function* inner() {}"
        CreateGenerator
        Drop
        Push 0
        Push @outer_params
        Push 0
        Const "outer"
        Const "function* outer() {}"
        CreateGenerator
        Drop
        CreateArray 0
        Const "out"
        Def
        Push 0
        Const "outer"
        Load
        Call
        ForOfStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForOfNext
        JumpIfTrue @l2
        Const "v"
        DefBlock
        EnterBlockScope
        Const "v"
        Load
        Push 1
        Const "out"
        Load
        Const "push"
        CallMethod
        Drop
        ExitBlockScope
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
        Const "out"
        Load
    "#;
    assert_eq!(eval_inspect(source), r#"["a", "b", "r", "c"]"#);
}

#[test]
fn test_yield_star_forwards_next_arguments() {
    // function* inner() { const got = yield 1; return got }
    // function* outer() { return yield* inner() }
    let source = r#"
        Jump @after
    inner_params:
        Jump @inner_make
    inner_body:
        One
        Yield
        GeneratorReturn
    inner_make:
        CreateGeneratorContext @inner_body
        Ret
    outer_params:
        Jump @outer_make
    outer_body:
        Push 0
        Const "inner"
        Load
        Call
        YieldStar
        GeneratorReturn
    outer_make:
        CreateGeneratorContext @outer_body
        Ret
    after:
        Push 0
        Push @inner_params
        Push 0
        Const "inner"
        Const "function* inner() {}"
        CreateGenerator
        Drop
        Push 0
        Push @outer_params
        Push 0
        Const "outer"
        Const "function* outer() {}"
        CreateGenerator
        Drop
        Push 0
        Const "outer"
        Load
        Call
        Const "it"
        Def
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        Drop
        Const "sent"
        Push 1
        Const "it"
        Load
        Const "next"
        CallMethod
    "#;
    assert_eq!(eval_inspect(source), r#"{ value: "sent", done: true }"#);
}

#[test]
fn test_next_while_running_is_a_type_error() {
    // function* g() { it.next() } var it = g(); it.next()
    let source = r#"
        Jump @after
    params:
        Jump @make
    body:
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        GeneratorReturn
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Push 0
        Push @params
        Push 0
        Const "g"
        Const "function* g() { it.next() }"
        CreateGenerator
        Drop
        Push 0
        Const "g"
        Load
        Call
        Const "it"
        Def
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
    "#;
    assert!(throws_error(source, "generator is already running"));
}

#[test]
fn test_generator_this_comes_from_call() {
    // var o = { v: 3, g: function* () { yield this.v } }; o.g().next().value
    let source = r#"
        Jump @after
    params:
        Jump @make
    body:
        This
        Const "v"
        PropAccess
        Yield
        Drop
        GeneratorReturn
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Const 3
        Const "v"
        Push 0
        Push 0
        Push @params
        Push 0
        Const ""
        Const "function* () { yield this.v }"
        CreateGenerator
        Const "g"
        Push 0
        CreateObject 2
        Const "o"
        Def
        Push 0
        Push 0
        Const "o"
        Load
        Const "g"
        CallMethod
        Const "next"
        CallMethod
        Const "value"
        PropAccess
    "#;
    assert_eq!(eval(source), Value::Number(3.0));
}

#[test]
fn test_new_on_generator_is_a_type_error() {
    let source = format!("{}Push 0\nConst \"g\"\nLoad\nNew\n", ECHO);
    assert!(throws_error(&source, "is not a constructor"));
}
