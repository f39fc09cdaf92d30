//! Instruction set and object file format
//!
//! The instruction stream interleaves opcodes with their inline operands:
//! an opcode that takes an operand is immediately followed by one
//! `Instruction::Operand` slot. Label operands are absolute indices into the
//! stream and constant operands index the constant pool, so both are
//! relocated when object files are linked together.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{JsString, Value, number_repr, number_to_string};

macro_rules! define_opcodes {
    ($($(#[$doc:meta])* $name:ident,)*) => {
        /// VM opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum OpCode {
            $($(#[$doc])* $name,)*
        }

        impl OpCode {
            /// Every opcode, in declaration order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }
        }
    };
}

define_opcodes! {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Literals & stack
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Push constants[operand]
    Const,
    /// Push an integer literal or a label offset
    Push,
    Undefined,
    Null,
    True,
    False,
    /// Push the number 1
    One,
    Dup,
    Drop,
    /// Push the current frame's `this`
    This,
    Nop,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════════════════════
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    LT,
    GT,
    LTE,
    GTE,
    StrictEQ,
    StrictNEQ,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNot,
    LeftArithmeticShift,
    RightArithmeticShift,
    RightLogicalShift,
    PrefixPlus,
    PrefixMinus,
    TypeOf,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Scopes & bindings
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Pop name, pop value; define at function level
    Def,
    /// Pop name, pop value; define in the innermost scope
    DefBlock,
    /// Pop name; push its value
    Load,
    /// Pop name, pop value; assign to an existing binding
    Set,
    /// Turn a name or an (object, key) pair into an assignment target
    LoadLeftValue,
    /// Pop target, pop value; assign
    SetLeftValue,
    EnterBlockScope,
    EnterLabeledBlockScope,
    EnterIterableBlockScope,
    EnterTryBlockScope,
    ExitBlockScope,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Control flow
    // ═══════════════════════════════════════════════════════════════════════════════
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    Break,
    BreakLabel,
    Throw,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Calls & functions
    // ═══════════════════════════════════════════════════════════════════════════════
    Call,
    CallMethod,
    New,
    Ret,
    CreateFunction,
    CreateLambda,
    CreateGenerator,
    CreateGeneratorContext,
    Yield,
    YieldStar,
    GeneratorReturn,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Objects & iteration
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Pop `count` (value, key, member type) triples; push a new object
    CreateObject,
    /// Pop `count` values; push a new array in source order
    CreateArray,
    /// Pop key, pop object; push the property value
    PropAccess,
    /// Pop value, pop key, pop object; assign and push the value
    PropAssignment,
    ForInStart,
    ForInNext,
    ForOfStart,
    ForOfNext,
}

/// Shape of the inline operand an opcode expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Constant,
    Label,
    Literal,
    /// `Push` accepts either a literal or a label
    LiteralOrLabel,
}

impl OpCode {
    /// Case-insensitive mnemonic lookup
    pub fn from_name(name: &str) -> Option<OpCode> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// The inline operand this opcode reads, if any
    pub fn operand_kind(self) -> Option<OperandKind> {
        match self {
            OpCode::Const => Some(OperandKind::Constant),
            OpCode::Push => Some(OperandKind::LiteralOrLabel),
            OpCode::Jump
            | OpCode::JumpIfTrue
            | OpCode::JumpIfFalse
            | OpCode::EnterLabeledBlockScope
            | OpCode::EnterIterableBlockScope
            | OpCode::EnterTryBlockScope
            | OpCode::CreateGeneratorContext => Some(OperandKind::Label),
            OpCode::CreateObject | OpCode::CreateArray => Some(OperandKind::Literal),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operands & instructions
// ═══════════════════════════════════════════════════════════════════════════════

/// Inline operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Absolute instruction index
    Label(usize),
    /// Constant pool index
    Constant(usize),
    Literal(i64),
}

impl Operand {
    fn relocated(self, code_base: usize, const_base: usize) -> Operand {
        match self {
            Operand::Label(target) => Operand::Label(target + code_base),
            Operand::Constant(idx) => Operand::Constant(idx + const_base),
            Operand::Literal(n) => Operand::Literal(n),
        }
    }
}

/// One slot of the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Op(OpCode),
    Operand(Operand),
}

impl From<OpCode> for Instruction {
    fn from(op: OpCode) -> Self {
        Instruction::Op(op)
    }
}

impl From<Operand> for Instruction {
    fn from(operand: Operand) -> Self {
        Instruction::Operand(operand)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Op(op) => write!(f, "{}", op),
            Instruction::Operand(Operand::Label(target)) => write!(f, "@{}", target),
            Instruction::Operand(Operand::Constant(idx)) => write!(f, "const[{}]", idx),
            Instruction::Operand(Operand::Literal(n)) => write!(f, "{}", n),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Constant pool entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    String(JsString),
    Number(#[serde(with = "number_repr")] f64),
    Boolean(bool),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::String(a), Constant::String(b)) => a == b,
            // Bitwise, so NaN constants compare equal to themselves
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::Boolean(a), Constant::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::String(s) => Value::String(s.clone()),
            Constant::Number(n) => Value::Number(*n),
            Constant::Boolean(b) => Value::Boolean(*b),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::String(s) => {
                f.write_str("\"")?;
                for c in s.as_str().chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            // keep the sign so the text assembles back to the same bits
            Constant::Number(n) if *n == 0.0 && n.is_sign_negative() => f.write_str("-0"),
            Constant::Number(n) => f.write_str(&number_to_string(*n)),
            Constant::Boolean(b) => write!(f, "{}", b),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Object file & linker
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiler output consumed by the VM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectFile {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
}

impl ObjectFile {
    pub fn new(instructions: Vec<Instruction>, constants: Vec<Constant>) -> Self {
        Self {
            instructions,
            constants,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Concatenate object files, relocating label operands by the running
/// instruction count and constant operands by the running pool size.
pub fn link(files: &[ObjectFile]) -> ObjectFile {
    let mut out = ObjectFile::default();
    for file in files {
        let code_base = out.instructions.len();
        let const_base = out.constants.len();
        out.instructions
            .extend(file.instructions.iter().map(|instruction| match instruction {
                Instruction::Operand(operand) => {
                    Instruction::Operand(operand.relocated(code_base, const_base))
                }
                op => *op,
            }));
        out.constants.extend(file.constants.iter().cloned());
    }
    out
}
