//! Simple assembler for byte programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! START:              ; Define a label
//!     LDA #$02        ; Immediate operand
//!     STA $0010       ; Absolute operand (window offset)
//!     LDX COUNT       ; Label used as an address
//!     SYS
//!     BRK
//! COUNT:
//!     DB $05          ; Raw bytes
//!     DB "Hi", 0      ; Strings and numbers mixed
//! ```
//!
//! Numbers are `$hex`, `0xhex` or decimal. Absolute operands are encoded
//! so that the CPU's `low + high * 0xFF` address rule yields the written
//! offset.

use crate::cpu::decode::{split_address, Opcode, Operand, OPCODE_TABLE};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to program bytes.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> offset).
    symbols: HashMap<String, usize>,
    /// Unresolved absolute operands: (output index, label, source line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim();
            if is_identifier(label) {
                let label = label.to_uppercase();
                if self.symbols.insert(label.clone(), self.output.len()).is_some() {
                    return Err(AssemblerError::DuplicateLabel { line: line_num, label });
                }
                let rest = line[colon_idx + 1..].trim();
                if rest.is_empty() {
                    return Ok(());
                }
                return self.process_instruction(rest, line_num);
            }
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, operand) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), Some(rest.trim())),
            None => (line.to_uppercase(), None),
        };
        let operand = operand.filter(|o| !o.is_empty());

        if mnemonic == "DB" {
            let args = operand.ok_or_else(|| AssemblerError::SyntaxError {
                line: line_num,
                message: "DB requires at least one value".into(),
            })?;
            return self.emit_data(args, line_num);
        }

        let opcode = select_opcode(&mnemonic, operand, line_num)?;
        self.output.push(opcode.byte());

        match (opcode.operand(), operand) {
            (Operand::None, _) => {}
            (Operand::Immediate, Some(op)) => {
                let value = parse_number(&op[1..], line_num)?;
                self.output.push(to_byte(value, line_num)?);
            }
            (Operand::Absolute, Some(op)) => self.emit_address(op, line_num)?,
            (_, None) => {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("{} requires an operand", mnemonic),
                })
            }
        }

        Ok(())
    }

    fn emit_address(&mut self, operand: &str, line_num: usize) -> Result<(), AssemblerError> {
        if is_identifier(operand) && !looks_numeric(operand) {
            // Must be a label reference - store for pass 2
            self.pending.push((self.output.len(), operand.to_uppercase(), line_num));
            self.output.extend_from_slice(&[0, 0]);
            return Ok(());
        }

        let value = parse_number(operand, line_num)?;
        let (low, high) = usize::try_from(value)
            .ok()
            .and_then(split_address)
            .ok_or(AssemblerError::ValueOutOfRange { line: line_num, value })?;
        self.output.extend_from_slice(&[low, high]);
        Ok(())
    }

    fn emit_data(&mut self, args: &str, line_num: usize) -> Result<(), AssemblerError> {
        for arg in split_args(args) {
            let arg = arg.trim();
            if let Some(text) = arg.strip_prefix('"') {
                let text = text.strip_suffix('"').ok_or_else(|| AssemblerError::SyntaxError {
                    line: line_num,
                    message: "unterminated string".into(),
                })?;
                self.output.extend(text.bytes());
            } else {
                let value = parse_number(arg, line_num)?;
                self.output.push(to_byte(value, line_num)?);
            }
        }
        Ok(())
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let offset = *self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;
            let (low, high) = split_address(offset).ok_or(AssemblerError::ValueOutOfRange {
                line: *line_num,
                value: offset as i64,
            })?;
            self.output[*out_idx] = low;
            self.output[*out_idx + 1] = high;
        }
        Ok(())
    }
}

/// Pick the opcode for a mnemonic and operand form.
fn select_opcode(
    mnemonic: &str,
    operand: Option<&str>,
    line_num: usize,
) -> Result<Opcode, AssemblerError> {
    let form = match operand {
        None => Operand::None,
        Some(op) if op.starts_with('#') => Operand::Immediate,
        Some(_) => Operand::Absolute,
    };

    let mut known = false;
    for info in OPCODE_TABLE.iter().filter(|i| i.mnemonic == mnemonic) {
        known = true;
        if info.operand == form {
            return Ok(info.opcode);
        }
    }

    if known {
        Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid operand for {}", mnemonic),
        })
    } else {
        Err(AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: mnemonic.to_string(),
        })
    }
}

fn parse_number(text: &str, line_num: usize) -> Result<i64, AssemblerError> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        text.parse::<i64>()
    };
    parsed.map_err(|_| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("invalid number '{}'", text),
    })
}

fn to_byte(value: i64, line_num: usize) -> Result<u8, AssemblerError> {
    u8::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value })
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn looks_numeric(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit())
}

/// Drop a `;` comment, ignoring semicolons inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split on commas outside string literals.
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ',' if !in_string => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}
