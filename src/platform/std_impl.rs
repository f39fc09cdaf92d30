//! Standard library implementations of the console trait.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ConsoleLevel, ConsoleProvider};

/// Console provider that writes `Log` to stdout and `Error` to stderr.
#[derive(Debug, Default)]
pub struct StdConsoleProvider;

impl StdConsoleProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ConsoleProvider for StdConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        match level {
            ConsoleLevel::Log => println!("{}", message),
            ConsoleLevel::Error => eprintln!("{}", message),
        }
    }
}

/// Console provider that records every message in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give
/// the other to the VM.
#[derive(Debug, Clone, Default)]
pub struct BufferConsoleProvider {
    lines: Rc<RefCell<Vec<(ConsoleLevel, String)>>>,
}

impl BufferConsoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages written so far, without their levels
    pub fn messages(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(ConsoleLevel, String)> {
        self.lines.borrow().clone()
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl ConsoleProvider for BufferConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        self.lines.borrow_mut().push((level, message.to_string()));
    }
}
