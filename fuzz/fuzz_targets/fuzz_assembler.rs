#![no_main]

use libfuzzer_sys::fuzz_target;
use tsbc::{assemble, disassemble};

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    // Anything that assembles must survive a disassembly round trip
    if let Ok(file) = assemble(source) {
        let text = disassemble(&file);
        let again = assemble(&text).expect("disassembly must reassemble");
        assert_eq!(again, file);
    }
});
