//! ObjectFileBuilder - helper for emitting object files
//!
//! Provides a convenient API for building instruction streams with
//! constant deduplication and forward-jump patching.

use super::bytecode::{Constant, Instruction, ObjectFile, OpCode, Operand};
use crate::value::{CheapClone, JsString};
use rustc_hash::FxHashMap;

/// Placeholder for a label operand that needs to be patched later
#[derive(Debug, Clone, Copy)]
pub struct JumpPlaceholder {
    /// Index of the operand slot in the stream
    pub operand_index: usize,
}

/// Builder for constructing object files
#[derive(Debug, Default)]
pub struct ObjectFileBuilder {
    /// Instruction stream
    code: Vec<Instruction>,

    /// Constant pool
    constants: Vec<Constant>,

    /// String constant deduplication map
    string_map: FxHashMap<JsString, usize>,

    /// Number constant deduplication map (keyed by bit pattern)
    number_map: FxHashMap<u64, usize>,

    /// Boolean constant slots
    boolean_slots: [Option<usize>; 2],
}

impl ObjectFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode and return its index
    pub fn emit(&mut self, op: OpCode) -> usize {
        let index = self.code.len();
        self.code.push(Instruction::Op(op));
        index
    }

    /// Emit a raw operand slot and return its index
    pub fn emit_operand(&mut self, operand: Operand) -> usize {
        let index = self.code.len();
        self.code.push(Instruction::Operand(operand));
        index
    }

    /// Emit `Const` for a string
    pub fn emit_string(&mut self, s: impl Into<JsString>) {
        let idx = self.add_string(s.into());
        self.emit(OpCode::Const);
        self.emit_operand(Operand::Constant(idx));
    }

    /// Emit `Const` for a number
    pub fn emit_number(&mut self, n: f64) {
        let idx = self.add_number(n);
        self.emit(OpCode::Const);
        self.emit_operand(Operand::Constant(idx));
    }

    /// Emit `Const` for a boolean
    pub fn emit_boolean(&mut self, b: bool) {
        let idx = self.add_boolean(b);
        self.emit(OpCode::Const);
        self.emit_operand(Operand::Constant(idx));
    }

    /// Emit `Push` with an integer literal
    pub fn emit_push(&mut self, n: i64) {
        self.emit(OpCode::Push);
        self.emit_operand(Operand::Literal(n));
    }

    /// Emit an opcode with a literal count (`CreateObject`, `CreateArray`)
    pub fn emit_with_count(&mut self, op: OpCode, count: usize) {
        self.emit(op);
        self.emit_operand(Operand::Literal(count as i64));
    }

    /// Emit an opcode followed by a label operand to be patched later
    pub fn emit_jump(&mut self, op: OpCode) -> JumpPlaceholder {
        self.emit(op);
        let operand_index = self.emit_operand(Operand::Label(0));
        JumpPlaceholder { operand_index }
    }

    /// Emit an opcode followed by a known label
    pub fn emit_jump_to(&mut self, op: OpCode, target: usize) {
        self.emit(op);
        self.emit_operand(Operand::Label(target));
    }

    /// Patch a placeholder to point at the current position
    pub fn patch_jump(&mut self, placeholder: JumpPlaceholder) {
        let target = self.code.len();
        self.patch_jump_to(placeholder, target);
    }

    /// Patch a placeholder to point at a specific target
    pub fn patch_jump_to(&mut self, placeholder: JumpPlaceholder, target: usize) {
        if let Some(Instruction::Operand(Operand::Label(t))) =
            self.code.get_mut(placeholder.operand_index)
        {
            *t = target;
        }
    }

    /// Get the current instruction offset (for jump targets)
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Add a string constant to the pool (with deduplication)
    pub fn add_string(&mut self, s: JsString) -> usize {
        if let Some(&idx) = self.string_map.get(&s) {
            return idx;
        }

        let idx = self.add_constant(Constant::String(s.cheap_clone()));
        self.string_map.insert(s, idx);
        idx
    }

    /// Add a number constant to the pool (with deduplication)
    pub fn add_number(&mut self, n: f64) -> usize {
        let bits = n.to_bits();
        if let Some(&idx) = self.number_map.get(&bits) {
            return idx;
        }

        let idx = self.add_constant(Constant::Number(n));
        self.number_map.insert(bits, idx);
        idx
    }

    pub fn add_boolean(&mut self, b: bool) -> usize {
        let slot = usize::from(b);
        if let Some(Some(idx)) = self.boolean_slots.get(slot) {
            return *idx;
        }
        let idx = self.add_constant(Constant::Boolean(b));
        if let Some(entry) = self.boolean_slots.get_mut(slot) {
            *entry = Some(idx);
        }
        idx
    }

    /// Add a constant to the pool without deduplication
    pub fn add_constant(&mut self, constant: Constant) -> usize {
        let idx = self.constants.len();
        self.constants.push(constant);
        idx
    }

    /// Add a constant, reusing an existing slot for equal literals
    pub fn intern(&mut self, constant: Constant) -> usize {
        match constant {
            Constant::String(s) => self.add_string(s),
            Constant::Number(n) => self.add_number(n),
            Constant::Boolean(b) => self.add_boolean(b),
        }
    }

    /// Finish building and return the object file
    pub fn finish(self) -> ObjectFile {
        ObjectFile::new(self.code, self.constants)
    }
}
