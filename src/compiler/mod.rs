//! Object file format, builder, linker and text assembler
//!
//! Source compilation happens outside this crate; a front-end only needs to
//! produce an [`ObjectFile`]. Programs can also be written by hand in the
//! assembly syntax understood by [`assemble`].

mod asm;
mod builder;
mod bytecode;

pub use asm::{AsmError, assemble, disassemble};
pub use builder::{JumpPlaceholder, ObjectFileBuilder};
pub use bytecode::{Constant, Instruction, ObjectFile, OpCode, Operand, OperandKind, link};
