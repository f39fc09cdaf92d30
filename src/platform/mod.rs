//! Host output abstraction.
//!
//! `print` never writes to stdout directly; it goes through a
//! [`ConsoleProvider`] so embedders and tests can capture program output.

mod std_impl;

pub use std_impl::{BufferConsoleProvider, StdConsoleProvider};

/// Output channel for a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// Regular program output (`print`)
    Log,
    /// Diagnostics, such as an exception that escaped to the host
    Error,
}

/// Trait for handling console output.
pub trait ConsoleProvider {
    /// Write a message at the specified level.
    fn write(&self, level: ConsoleLevel, message: &str);
}

/// A console provider that discards all output.
pub struct NoOpConsoleProvider;

impl ConsoleProvider for NoOpConsoleProvider {
    fn write(&self, _level: ConsoleLevel, _message: &str) {}
}
