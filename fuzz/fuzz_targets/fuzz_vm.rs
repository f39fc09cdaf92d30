#![no_main]

use libfuzzer_sys::fuzz_target;
use tsbc::{NoOpConsoleProvider, ObjectFile, StepResult, Vm};

const MAX_STEPS: usize = 100_000;

fuzz_target!(|data: &[u8]| {
    // Arbitrary object files, including ones no compiler would emit
    let Ok(file) = serde_json::from_slice::<ObjectFile>(data) else {
        return;
    };

    let Ok(mut vm) = Vm::with_builtins(file) else {
        return;
    };
    vm.set_console(Box::new(NoOpConsoleProvider));
    vm.set_gc_interval(1);
    vm.set_max_call_depth(256);

    // Step loop with timeout protection
    for _ in 0..MAX_STEPS {
        match vm.step() {
            Ok(StepResult::Continue) => {}
            Ok(StepResult::Complete(_)) => break,
            Err(_) => break, // Errors are expected
        }
    }
});
