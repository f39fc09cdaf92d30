//! Stack-based bytecode virtual machine for a JavaScript-like object model
//!
//! Programs arrive as linked [`ObjectFile`]s, either produced by a compiler
//! front-end or written in the assembly syntax accepted by [`assemble`].
//!
//! # Example
//!
//! ```
//! use tsbc::{Value, Vm, assemble};
//!
//! let file = assemble("Const 1\nConst 2\nAdd\n").unwrap();
//! let mut vm = Vm::with_builtins(file).unwrap();
//! assert_eq!(vm.exec().unwrap(), Value::Number(3.0));
//! ```

pub mod compiler;
pub mod error;
pub mod gc;
pub mod interpreter;
pub mod platform;
pub mod prelude;
pub mod value;

pub use compiler::{
    AsmError, Constant, Instruction, ObjectFile, ObjectFileBuilder, OpCode, assemble,
    disassemble, link,
};
pub use error::JsError;
pub use gc::{GcStats, Heap, HeapValue};
pub use interpreter::{BridgeFn, Callable, HostFn, NativeFn, Realm, StepResult, Vm, VmConfig, VmSnapshot};
pub use platform::{
    BufferConsoleProvider, ConsoleLevel, ConsoleProvider, NoOpConsoleProvider, StdConsoleProvider,
};
pub use value::{HeapRef, JsString, NativeId, PropertyDescriptor, PropertyKey, Value};
