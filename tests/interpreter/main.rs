//! Integration tests for the virtual machine, organized by feature
//!
//! Programs are written in the assembly syntax and follow the instruction
//! layouts a compiler front-end emits.
//!
//! ## Aggressive Test Defaults
//!
//! Tests use aggressive defaults to catch bugs early:
//! - `GC_INTERVAL=1` - collect at every instruction boundary after an
//!   allocation, so every heap reference is relocated constantly
//!
//! Override via environment variables:
//!
//! ```bash
//! cargo test                           # Default: aggressive settings
//! GC_INTERVAL=100 cargo test           # Less aggressive GC for faster runs
//! GC_INTERVAL=0 cargo test             # Collect only when a program calls gc()
//! ```

mod closures;
mod functions;
mod gc;
mod generator;
mod iteration;

use tsbc::{BufferConsoleProvider, JsError, StepResult, Value, Vm, assemble};

/// Assemble `source` and create a VM with the default builtins and
/// aggressive GC settings
#[allow(clippy::expect_used)]
pub fn create_test_vm(source: &str) -> Vm {
    let file = assemble(source).expect("assembly failed");
    let mut vm = Vm::with_builtins(file).expect("vm initialization failed");

    // Default to GC_INTERVAL=1 (most aggressive) to catch GC bugs early
    let gc_interval = std::env::var("GC_INTERVAL")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);
    vm.set_gc_interval(gc_interval);

    vm
}

/// Step a VM until the program finishes
pub fn run_to_completion(vm: &mut Vm) -> Result<Value, JsError> {
    loop {
        match vm.step()? {
            StepResult::Continue => continue,
            StepResult::Complete(value) => return Ok(value),
        }
    }
}

/// Evaluate a program and return its result
#[allow(clippy::expect_used)]
pub fn eval(source: &str) -> Value {
    eval_result(source).expect("eval failed")
}

/// Evaluate a program, returning the error if it fails
pub fn eval_result(source: &str) -> Result<Value, JsError> {
    let mut vm = create_test_vm(source);
    run_to_completion(&mut vm)
}

/// Evaluate a program and keep the VM, so heap results can be inspected
#[allow(clippy::expect_used)]
pub fn eval_vm(source: &str) -> (Vm, Value) {
    let mut vm = create_test_vm(source);
    let value = run_to_completion(&mut vm).expect("eval failed");
    (vm, value)
}

/// Evaluate a program and render its result with `Vm::inspect`
pub fn eval_inspect(source: &str) -> String {
    let (vm, value) = eval_vm(source);
    vm.inspect(&value)
}

/// Evaluate a program with a capturing console
pub fn eval_with_output(source: &str) -> (Result<Value, JsError>, Vec<String>) {
    let mut vm = create_test_vm(source);
    let console = BufferConsoleProvider::new();
    vm.set_console(Box::new(console.clone()));
    let result = run_to_completion(&mut vm);
    (result, console.messages())
}

/// Check that evaluation fails with an error whose message contains
/// `error_contains`
pub fn throws_error(source: &str, error_contains: &str) -> bool {
    match eval_result(source) {
        Err(e) => e.to_string().contains(error_contains),
        Ok(_) => false,
    }
}
