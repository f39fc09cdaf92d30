#![no_main]

use libfuzzer_sys::fuzz_target;
use tsbc::{NoOpConsoleProvider, ObjectFile, StepResult, Vm};

const MAX_STEPS: usize = 10_000;

fuzz_target!(|data: &[u8]| {
    // Hostile snapshots must be rejected or run without panicking
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(mut vm) = Vm::with_builtins(ObjectFile::default()) else {
        return;
    };
    vm.set_console(Box::new(NoOpConsoleProvider));
    if vm.load_json(json).is_err() {
        return;
    }

    for _ in 0..MAX_STEPS {
        match vm.step() {
            Ok(StepResult::Continue) => {}
            Ok(StepResult::Complete(_)) | Err(_) => break,
        }
    }
});
