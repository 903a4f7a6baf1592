//! Hex program format.
//!
//! A program is a sequence of two-digit hex bytes. Whitespace between
//! (or inside) byte pairs is ignored:
//!
//! ```text
//! A9 02 8D 10 00
//! AD 10 00 00
//! ```
//!
//! Any other character rejects the whole program with its position. A
//! single leftover digit at the end is reported but not loaded.

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// A successfully parsed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProgram {
    pub bytes: Vec<u8>,
    /// Trailing hex digit that did not complete a byte.
    pub dangling: Option<char>,
}

impl ParsedProgram {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parse hex program text.
pub fn parse_program(text: &str) -> Result<ParsedProgram, ProgramError> {
    if text.trim().is_empty() {
        return Err(ProgramError::Empty);
    }

    let mut bytes = Vec::new();
    let mut pending: Option<(char, u32)> = None;

    for (position, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            continue;
        }
        let digit = c
            .to_digit(16)
            .ok_or(ProgramError::UnrecognizedSymbol { symbol: c, position })?;

        pending = match pending {
            None => Some((c, digit)),
            Some((_, high)) => {
                bytes.push((high * 16 + digit) as u8);
                None
            }
        };
    }

    let dangling = pending.map(|(c, _)| c);
    if let Some(c) = dangling {
        warn!(dangling = %c, "dangling hex digit ignored");
    }

    Ok(ParsedProgram { bytes, dangling })
}

/// Format bytes as upper-case hex, 16 per line.
pub fn format_program(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Load a program file from disk.
pub fn load_program<P: AsRef<Path>>(path: P) -> Result<ParsedProgram, ProgramError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ProgramError::IoError(e.to_string()))?;
    parse_program(&text)
}

/// Save a program file to disk.
pub fn save_program<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ProgramError> {
    let mut text = format_program(bytes);
    text.push('\n');
    std::fs::write(path.as_ref(), text).map_err(|e| ProgramError::IoError(e.to_string()))
}

/// Errors that can occur while reading a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("program input is empty")]
    Empty,

    #[error("unrecognized symbol '{symbol}' at position {position}")]
    UnrecognizedSymbol { symbol: char, position: usize },
}
