//! Error types for the virtual machine
//!
//! Errors come in two tiers. [`JsError::Uncaught`] is a language-level value
//! thrown by `Throw` that no `try` scope handled. Every other variant is an
//! engine fault (malformed bytecode, a bad call target, a missing binding)
//! and is never visible to interpreted `try/catch`.

use crate::value::Value;
use thiserror::Error;

/// Main error type for the VM
#[derive(Debug, Error)]
pub enum JsError {
    /// A thrown value escaped every `try` scope
    #[error("Uncaught {message}")]
    Uncaught { message: String, value: Value },

    #[error("cannot find name {name}")]
    UnboundName { name: String },

    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("invalid cast: expected {expected}, found {found}")]
    InvalidCast {
        expected: &'static str,
        found: String,
    },

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("malformed bytecode: {message}")]
    MalformedBytecode { message: String },

    #[error("illegal break{}", format_label(.label))]
    IllegalBreak { label: Option<String> },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("dangling heap reference #{index}")]
    DanglingReference { index: usize },

    #[error("maximum call stack size exceeded ({depth} frames)")]
    CallStackOverflow { depth: usize },

    #[error("assertion failed: {message}: expected {expected}, got {actual}")]
    AssertionFailed {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("snapshot mismatch: {message}")]
    SnapshotMismatch { message: String },

    /// An engine error annotated with the instruction that raised it
    #[error("{source}\n    at pc {pc} ({opcode})\n    stack: [{}]", format_stack(.stack))]
    Fault {
        pc: usize,
        opcode: String,
        stack: Vec<String>,
        source: Box<JsError>,
    },
}

fn format_stack(stack: &[String]) -> String {
    stack.join(", ")
}

fn format_label(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" to label '{}'", label),
        None => String::new(),
    }
}

impl JsError {
    pub fn type_error(message: impl Into<String>) -> Self {
        JsError::TypeError {
            message: message.into(),
        }
    }

    pub fn unbound_name(name: impl Into<String>) -> Self {
        JsError::UnboundName { name: name.into() }
    }

    /// Create an error for an instruction stream the VM cannot decode
    pub fn malformed(message: impl Into<String>) -> Self {
        JsError::MalformedBytecode {
            message: message.into(),
        }
    }

    pub fn invalid_cast(expected: &'static str, found: impl Into<String>) -> Self {
        JsError::InvalidCast {
            expected,
            found: found.into(),
        }
    }

    /// Create an internal error for unexpected VM states.
    /// These indicate a bug in the VM rather than in the program.
    pub fn internal_error(message: impl Into<String>) -> Self {
        JsError::MalformedBytecode {
            message: format!("internal error: {}", message.into()),
        }
    }

    /// Whether this is a language-level exception rather than an engine fault
    pub fn is_uncaught(&self) -> bool {
        matches!(self.root_cause(), JsError::Uncaught { .. })
    }

    /// The error underneath any `Fault` annotation
    pub fn root_cause(&self) -> &JsError {
        match self {
            JsError::Fault { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The thrown value, for uncaught exceptions
    pub fn thrown_value(&self) -> Option<&Value> {
        match self.root_cause() {
            JsError::Uncaught { value, .. } => Some(value),
            _ => None,
        }
    }
}
