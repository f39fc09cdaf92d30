//! Garbage collection: reclamation, relocation and reachability

use super::{create_test_vm, eval, eval_inspect, run_to_completion};
use tsbc::Value;

const GC: &str = "Push 0\nConst \"gc\"\nLoad\nCall\n";

/// Run with automatic collection disabled so `gc()` counts are exact
fn eval_manual_gc(source: &str) -> Value {
    let mut vm = create_test_vm(source);
    vm.set_gc_interval(0);
    run_to_completion(&mut vm).unwrap()
}

#[test]
fn test_gc_reports_reclaimed_slots() {
    // clear whatever initialization left behind, then drop two objects
    let source = format!(
        "{GC}Drop\nCreateObject 0\nDrop\nOne\nConst 2\nCreateArray 2\nDrop\n{GC}"
    );
    assert_eq!(eval_manual_gc(&source), Value::Number(2.0));
}

#[test]
fn test_second_collection_reclaims_nothing() {
    let source = format!("CreateObject 0\nDrop\n{GC}Drop\n{GC}");
    assert_eq!(eval_manual_gc(&source), Value::Number(0.0));

    let mut vm = create_test_vm(GC);
    vm.set_gc_interval(0);
    run_to_completion(&mut vm).unwrap();
    let before = vm.heap().len();
    assert_eq!(vm.collect_garbage(), 0);
    assert_eq!(vm.heap().len(), before);
}

#[test]
fn test_reachable_objects_keep_identity() {
    // var a = { x: 1 }; var b = a; gc(); [a === b, a.x]
    let source = format!(
        r#"
        One
        Const "x"
        Push 0
        CreateObject 1
        Const "a"
        Def
        Const "a"
        Load
        Const "b"
        Def
        CreateObject 0
        Drop
        {GC}
        Drop
        Const "a"
        Load
        Const "b"
        Load
        StrictEQ
        Const "a"
        Load
        Const "x"
        PropAccess
        CreateArray 2
    "#
    );
    assert_eq!(eval_inspect(&source), "[true, 1]");
}

#[test]
fn test_cycles_are_reclaimed() {
    // var o = {}; var p = { o }; o.p = p; o = undefined; p = undefined; gc()
    let source = format!(
        r#"
        {GC}
        Drop
        CreateObject 0
        Const "o"
        Def
        Const "o"
        Load
        Const "o"
        Push 0
        CreateObject 1
        Const "p"
        Def
        Const "o"
        Load
        Const "p"
        Const "p"
        Load
        PropAssignment
        Drop
        Undefined
        Const "o"
        Set
        Undefined
        Const "p"
        Set
        {GC}
    "#
    );
    assert_eq!(eval_manual_gc(&source), Value::Number(2.0));
}

#[test]
fn test_captured_cells_survive_collection() {
    // function mk() { var n = 0; return () => { n = n + 1; return n } }
    // var f = mk(); f(); gc(); f()
    let source = format!(
        r#"
        Jump @after
    mk:
        Const 0
        Const "n"
        Def
        Const "n"
        Push 1
        Push @inc
        Push 0
        Const "() => {{ n = n + 1; return n }}"
        CreateLambda
        Ret
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
    after:
        Push 0
        Push @mk
        Push 0
        Const "mk"
        Const "function mk() {{}}"
        CreateFunction
        Drop
        Push 0
        Const "mk"
        Load
        Call
        Const "f"
        Def
        Push 0
        Const "f"
        Load
        Call
        Drop
        {GC}
        Drop
        Push 0
        Const "f"
        Load
        Call
    "#
    );
    assert_eq!(eval_manual_gc(&source), Value::Number(2.0));
    assert_eq!(eval(&source), Value::Number(2.0));
}

#[test]
fn test_suspended_generator_survives_collection() {
    // function* g() { let s = "a"; yield s; yield s + "b" } var it = g(); it.next(); gc(); it.next().value
    let source = format!(
        r#"
        Jump @after
    params:
        Jump @make
    body:
        Const "a"
        Const "s"
        Def
        Const "s"
        Load
        Yield
        Drop
        Const "s"
        Load
        Const "b"
        Add
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
        Const "function* g() {{}}"
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
        Drop
        {GC}
        Drop
        Push 0
        Const "it"
        Load
        Const "next"
        CallMethod
        Const "value"
        PropAccess
    "#
    );
    assert_eq!(eval_manual_gc(&source), Value::from("ab"));
}

#[test]
fn test_stats_track_collections() {
    let mut vm = create_test_vm("CreateObject 0\nDrop\nCreateObject 0\n");
    vm.set_gc_interval(0);
    run_to_completion(&mut vm).unwrap();
    let stats = vm.gc_stats();
    assert_eq!(stats.collections, 0);
    assert!(stats.allocations_since_collect >= 2);

    let reclaimed = vm.collect_garbage();
    assert!(reclaimed >= 1);
    let stats = vm.gc_stats();
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.last_reclaimed, reclaimed);
    assert_eq!(stats.allocations_since_collect, 0);
    assert_eq!(stats.heap_size, vm.heap().len());
}

#[test]
fn test_aggressive_interval_preserves_results() {
    // build a nested structure while collecting at every instruction
    let source = r#"
        One
        Const "a"
        Push 0
        CreateObject 1
        Const "list"
        Push 0
        Const "c"
        CreateArray 1
        Const "b"
        Push 0
        CreateObject 2
    "#;
    let mut vm = create_test_vm(source);
    vm.set_gc_interval(1);
    let value = run_to_completion(&mut vm).unwrap();
    assert_eq!(vm.inspect(&value), r#"{ list: { a: 1 }, b: ["c"] }"#);
}
