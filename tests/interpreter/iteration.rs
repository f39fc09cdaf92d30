//! for-in and for-of loops

use super::{eval, eval_inspect, eval_with_output, throws_error};
use tsbc::Value;

/// Wrap a loop around `target`, appending each visited item to `out`
fn collect_loop(target: &str, start: &str, next: &str) -> String {
    format!(
        r#"
        CreateArray 0
        Const "out"
        Def
        {target}
        {start}
        EnterIterableBlockScope @l3
    l1:
        Dup
        {next}
        JumpIfTrue @l2
        Const "item"
        DefBlock
        EnterBlockScope
        Const "item"
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
    "#
    )
}

fn for_in(target: &str) -> String {
    collect_loop(target, "ForInStart", "ForInNext")
}

fn for_of(target: &str) -> String {
    collect_loop(target, "ForOfStart", "ForOfNext")
}

#[test]
fn test_for_in_visits_own_enumerable_keys() {
    let target = r#"
        One
        Const "a"
        Push 0
        Const 2
        Const "b"
        Push 0
        CreateObject 2
    "#;
    assert_eq!(eval_inspect(&for_in(target)), r#"["a", "b"]"#);
}

#[test]
fn test_for_in_over_array_yields_index_strings() {
    let target = "Const \"x\"\nConst \"y\"\nCreateArray 2";
    assert_eq!(eval_inspect(&for_in(target)), r#"["0", "1"]"#);
}

#[test]
fn test_for_in_over_string() {
    assert_eq!(eval_inspect(&for_in("Const \"hi\"")), r#"["0", "1"]"#);
}

#[test]
fn test_for_in_skips_inherited_and_hidden_keys() {
    // functions carry a hidden `prototype`; Object.prototype has hidden methods
    let target = r#"
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
    "#;
    assert_eq!(eval_inspect(&for_in(target)), "[]");
}

#[test]
fn test_for_in_works_on_a_key_snapshot() {
    // var o = { a: 1 }; for (k in o) { o.b = 2; s = s + k } s
    let source = r#"
        One
        Const "a"
        Push 0
        CreateObject 1
        Const "o"
        Def
        Const ""
        Const "s"
        Def
        Const "o"
        Load
        ForInStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForInNext
        JumpIfTrue @l2
        Const "k"
        DefBlock
        EnterBlockScope
        Const "o"
        Load
        Const "b"
        Const 2
        PropAssignment
        Drop
        Const "s"
        Load
        Const "k"
        Load
        Add
        Const "s"
        Set
        ExitBlockScope
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
        Const "s"
        Load
    "#;
    assert_eq!(eval(source), Value::from("a"));
}

#[test]
fn test_for_in_over_primitives_is_empty() {
    assert_eq!(eval_inspect(&for_in("Const 42")), "[]");
    assert_eq!(eval_inspect(&for_in("Undefined")), "[]");
}

#[test]
fn test_for_of_over_array() {
    let target = "One\nConst \"two\"\nCreateObject 0\nCreateArray 3";
    assert_eq!(eval_inspect(&for_of(target)), r#"[1, "two", {}]"#);
}

#[test]
fn test_for_of_over_string_yields_characters() {
    assert_eq!(eval_inspect(&for_of("Const \"añb\"")), r#"["a", "ñ", "b"]"#);
}

#[test]
fn test_for_of_over_object_values() {
    let target = r#"
        One
        Const "a"
        Push 0
        Const 2
        Const "b"
        Push 0
        CreateObject 2
    "#;
    assert_eq!(eval_inspect(&for_of(target)), "[1, 2]");
}

#[test]
fn test_for_of_over_generator() {
    // function* g() { yield 1; yield 2 } for (x of g()) ...
    let target = r#"
        Jump @after
    params:
        Jump @make
    body:
        One
        Yield
        Drop
        Const 2
        Yield
        Drop
        GeneratorReturn
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Push 0
        Push @params
        Push 0
        Const "g"
        Const "function* g() { yield 1; yield 2 }"
        CreateGenerator
        Drop
        Push 0
        Const "g"
        Load
        Call
    "#;
    assert_eq!(eval_inspect(&for_of(target)), "[1, 2]");
}

#[test]
fn test_for_of_over_number_is_a_type_error() {
    assert!(throws_error(&for_of("Const 3"), "3 is not iterable"));
}

#[test]
fn test_break_out_of_for_of() {
    // for (x of [1, 2, 3]) { if (x === 2) break; last = x } last
    let source = r#"
        Undefined
        Const "last"
        Def
        One
        Const 2
        Const 3
        CreateArray 3
        ForOfStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForOfNext
        JumpIfTrue @l2
        Const "x"
        DefBlock
        EnterBlockScope
        Const "x"
        Load
        Const 2
        StrictEQ
        JumpIfFalse @keep
        Break
    keep:
        Const "x"
        Load
        Const "last"
        Set
        ExitBlockScope
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
        Const "last"
        Load
    "#;
    assert_eq!(eval(source), Value::Number(1.0));
}

#[test]
fn test_for_of_resumes_generator_once_per_iteration() {
    // function* g() { print("y1"); yield 1; print("y2"); yield 2 }
    // for (x of g()) print(x)
    let source = r#"
        Jump @after
    params:
        Jump @make
    body:
        Const "y1"
        Push 1
        Const "print"
        Load
        Call
        Drop
        One
        Yield
        Drop
        Const "y2"
        Push 1
        Const "print"
        Load
        Call
        Drop
        Const 2
        Yield
        Drop
        GeneratorReturn
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Push 0
        Push @params
        Push 0
        Const "g"
        Const "function* g() {}"
        CreateGenerator
        Drop
        Push 0
        Const "g"
        Load
        Call
        ForOfStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForOfNext
        JumpIfTrue @l2
        Const "x"
        DefBlock
        EnterBlockScope
        Const "x"
        Load
        Push 1
        Const "print"
        Load
        Call
        Drop
        ExitBlockScope
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
    "#;
    let (result, output) = eval_with_output(source);
    result.unwrap();
    assert_eq!(output, vec!["y1", "1", "y2", "2"]);
}

/// function* nat() { var i = 0; while (true) { yield i; i = i + 1 } }
const NATURALS: &str = r#"
        Jump @after_nat
    nat_params:
        Jump @nat_make
    nat_body:
        Const 0
        Const "i"
        Def
    nat_top:
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
        Jump @nat_top
    nat_make:
        CreateGeneratorContext @nat_body
        Ret
    after_nat:
        Push 0
        Push @nat_params
        Push 0
        Const "nat"
        Const "function* nat() {}"
        CreateGenerator
        Drop
"#;

#[test]
fn test_break_out_of_infinite_generator() {
    // for (x of nat()) { if (x === 3) break; last = x } last
    let source = format!(
        "{}{}",
        NATURALS,
        r#"
        Undefined
        Const "last"
        Def
        Push 0
        Const "nat"
        Load
        Call
        ForOfStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForOfNext
        JumpIfTrue @l2
        Const "x"
        DefBlock
        EnterBlockScope
        Const "x"
        Load
        Const 3
        StrictEQ
        JumpIfFalse @keep
        Break
    keep:
        Const "x"
        Load
        Const "last"
        Set
        ExitBlockScope
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
        Const "last"
        Load
    "#
    );
    assert_eq!(eval(&source), Value::Number(2.0));
}

#[test]
fn test_throw_from_generator_reaches_loop_handler() {
    // function* bad() { yield 1; throw "boom" }
    // try { for (x of bad()) seen = x } catch (e) { caught = e } [seen, caught]
    let source = r#"
        Jump @after
    params:
        Jump @make
    body:
        One
        Yield
        Drop
        Const "boom"
        Throw
    make:
        CreateGeneratorContext @body
        Ret
    after:
        Push 0
        Push @params
        Push 0
        Const "bad"
        Const "function* bad() {}"
        CreateGenerator
        Drop
        Undefined
        Const "seen"
        Def
        Undefined
        Const "caught"
        Def
        EnterTryBlockScope @catch
        Push 0
        Const "bad"
        Load
        Call
        ForOfStart
        EnterIterableBlockScope @l3
    l1:
        Dup
        ForOfNext
        JumpIfTrue @l2
        Const "seen"
        Set
        Jump @l1
    l2:
        ExitBlockScope
    l3:
        Drop
        ExitBlockScope
        Jump @end
    catch:
        Const "caught"
        Set
    end:
        Const "seen"
        Load
        Const "caught"
        Load
        CreateArray 2
    "#;
    assert_eq!(eval_inspect(source), r#"[1, "boom"]"#);
}
