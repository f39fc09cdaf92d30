//! Text assembly for object files.
//!
//! One instruction per line, `;` comments, `name:` label definitions and
//! `@name` label references. The disassembler prints canonical text that
//! assembles back to the same object file.
//!
//! ```text
//!   Const 1
//!   Const 2
//!   Add
//!   JumpIfTrue @done
//! done:
//! ```

use thiserror::Error;

use super::builder::{JumpPlaceholder, ObjectFileBuilder};
use super::bytecode::{Constant, Instruction, ObjectFile, OpCode, Operand, OperandKind};
use crate::prelude::{FxHashMap, FxHashSet};
use crate::value::JsString;

/// Errors produced while assembling text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: unknown opcode '{token}'")]
    UnknownOpcode { line: usize, token: String },

    #[error("line {line}: {opcode} expects {expected} argument(s)")]
    MissingArgument {
        line: usize,
        opcode: &'static str,
        expected: usize,
    },

    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("line {line}: unknown escape '\\{escape}'")]
    InvalidEscape { line: usize, escape: char },

    #[error("line {line}: label '{label}' is defined twice")]
    DuplicateLabel { line: usize, label: String },

    #[error("line {line}: label '{label}' is never defined")]
    UndefinedLabel { line: usize, label: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Str(s) => format!("{:?}", s),
        }
    }
}

fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, AsmError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ';' {
            break;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    None => return Err(AsmError::UnterminatedString { line: line_num }),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some(other) => {
                            return Err(AsmError::InvalidEscape {
                                line: line_num,
                                escape: other,
                            });
                        }
                        None => return Err(AsmError::UnterminatedString { line: line_num }),
                    },
                    Some(other) => s.push(other),
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }
        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == ';' || c == '"' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Assembler
// ═══════════════════════════════════════════════════════════════════════════════

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}

fn parse_number(token: &str, line: usize) -> Result<f64, AsmError> {
    match token {
        "NaN" => return Ok(f64::NAN),
        "Infinity" | "+Infinity" => return Ok(f64::INFINITY),
        "-Infinity" => return Ok(f64::NEG_INFINITY),
        _ => {}
    }
    let valid = token
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
    token
        .parse::<f64>()
        .ok()
        .filter(|_| valid)
        .ok_or_else(|| AsmError::InvalidNumber {
            line,
            token: token.to_string(),
        })
}

fn parse_literal(token: &str, line: usize) -> Result<i64, AsmError> {
    token.parse::<i64>().map_err(|_| AsmError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}

struct Assembler {
    builder: ObjectFileBuilder,
    labels: FxHashMap<String, usize>,
    fixups: Vec<(JumpPlaceholder, String, usize)>,
}

impl Assembler {
    fn label_reference(&mut self, token: &Token, line: usize) -> Result<Option<()>, AsmError> {
        let Token::Word(word) = token else {
            return Ok(None);
        };
        let Some(name) = word.strip_prefix('@') else {
            return Ok(None);
        };
        if !is_label_name(name) {
            return Err(AsmError::UnexpectedToken {
                line,
                token: word.clone(),
            });
        }
        let placeholder = JumpPlaceholder {
            operand_index: self.builder.emit_operand(Operand::Label(0)),
        };
        self.fixups.push((placeholder, name.to_string(), line));
        Ok(Some(()))
    }

    fn constant(&mut self, token: &Token, line: usize) -> Result<(), AsmError> {
        let constant = match token {
            Token::Str(s) => Constant::String(JsString::from(s.as_str())),
            Token::Word(w) if w == "true" => Constant::Boolean(true),
            Token::Word(w) if w == "false" => Constant::Boolean(false),
            Token::Word(w) => Constant::Number(parse_number(w, line)?),
        };
        let idx = self.builder.intern(constant);
        self.builder.emit_operand(Operand::Constant(idx));
        Ok(())
    }

    fn line(&mut self, tokens: &[Token], line: usize) -> Result<(), AsmError> {
        let mut rest = tokens;

        // Label definitions
        while let Some((Token::Word(word), tail)) = rest.split_first() {
            let Some(name) = word.strip_suffix(':') else {
                break;
            };
            if !is_label_name(name) {
                return Err(AsmError::UnexpectedToken {
                    line,
                    token: word.clone(),
                });
            }
            if self
                .labels
                .insert(name.to_string(), self.builder.current_offset())
                .is_some()
            {
                return Err(AsmError::DuplicateLabel {
                    line,
                    label: name.to_string(),
                });
            }
            rest = tail;
        }

        let Some((mnemonic, args)) = rest.split_first() else {
            return Ok(());
        };
        let op = match mnemonic {
            Token::Word(word) => OpCode::from_name(word),
            Token::Str(_) => None,
        }
        .ok_or_else(|| AsmError::UnknownOpcode {
            line,
            token: mnemonic.text(),
        })?;
        self.builder.emit(op);

        let Some(kind) = op.operand_kind() else {
            if let Some(extra) = args.first() {
                return Err(AsmError::UnexpectedToken {
                    line,
                    token: extra.text(),
                });
            }
            return Ok(());
        };

        let (arg, extra) = match args {
            [] => {
                return Err(AsmError::MissingArgument {
                    line,
                    opcode: op.name(),
                    expected: 1,
                });
            }
            [arg, extra @ ..] => (arg, extra),
        };
        if let Some(extra) = extra.first() {
            return Err(AsmError::UnexpectedToken {
                line,
                token: extra.text(),
            });
        }

        match kind {
            OperandKind::Constant => self.constant(arg, line)?,
            OperandKind::Label => {
                if self.label_reference(arg, line)?.is_none() {
                    return Err(AsmError::UnexpectedToken {
                        line,
                        token: arg.text(),
                    });
                }
            }
            OperandKind::Literal | OperandKind::LiteralOrLabel => {
                if kind == OperandKind::Literal || self.label_reference(arg, line)?.is_none() {
                    let Token::Word(word) = arg else {
                        return Err(AsmError::UnexpectedToken {
                            line,
                            token: arg.text(),
                        });
                    };
                    let n = parse_literal(word, line)?;
                    self.builder.emit_operand(Operand::Literal(n));
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ObjectFile, AsmError> {
        for (placeholder, name, line) in std::mem::take(&mut self.fixups) {
            let target = *self
                .labels
                .get(&name)
                .ok_or(AsmError::UndefinedLabel { line, label: name })?;
            self.builder.patch_jump_to(placeholder, target);
        }
        Ok(self.builder.finish())
    }
}

/// Assemble text into an object file.
///
/// Returns the first error encountered.
pub fn assemble(text: &str) -> Result<ObjectFile, AsmError> {
    let mut assembler = Assembler {
        builder: ObjectFileBuilder::new(),
        labels: FxHashMap::default(),
        fixups: Vec::new(),
    };

    for (idx, line) in text.lines().enumerate() {
        let line_num = idx + 1;
        let tokens = tokenize_line(line, line_num)?;
        assembler.line(&tokens, line_num)?;
    }

    assembler.finish()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Disassembler
// ═══════════════════════════════════════════════════════════════════════════════

fn render_operand(file: &ObjectFile, operand: Operand) -> String {
    match operand {
        Operand::Label(target) => format!("@L{}", target),
        Operand::Literal(n) => n.to_string(),
        Operand::Constant(idx) => match file.constants.get(idx) {
            Some(constant) => constant.to_string(),
            None => format!("<missing constant {}>", idx),
        },
    }
}

/// Disassemble an object file into canonical assembly text.
pub fn disassemble(file: &ObjectFile) -> String {
    let targets: FxHashSet<usize> = file
        .instructions
        .iter()
        .filter_map(|instruction| match instruction {
            Instruction::Operand(Operand::Label(target)) => Some(*target),
            _ => None,
        })
        .collect();

    let mut out = String::new();
    let mut pc = 0;
    while let Some(instruction) = file.instructions.get(pc) {
        if targets.contains(&pc) {
            out.push_str(&format!("L{}:\n", pc));
        }
        match instruction {
            Instruction::Op(op) => {
                let operand = match (op.operand_kind(), file.instructions.get(pc + 1)) {
                    (Some(_), Some(Instruction::Operand(operand)))
                        if !targets.contains(&(pc + 1)) =>
                    {
                        Some(*operand)
                    }
                    _ => None,
                };
                match operand {
                    Some(operand) => {
                        out.push_str(&format!("  {} {}\n", op, render_operand(file, operand)));
                        pc += 2;
                    }
                    None => {
                        out.push_str(&format!("  {}\n", op));
                        pc += 1;
                    }
                }
            }
            Instruction::Operand(operand) => {
                out.push_str(&format!(
                    "  ; stray operand {}\n",
                    render_operand(file, *operand)
                ));
                pc += 1;
            }
        }
    }
    if targets.contains(&file.instructions.len()) {
        out.push_str(&format!("L{}:\n", file.instructions.len()));
    }
    out
}
