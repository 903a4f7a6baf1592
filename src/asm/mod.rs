//! Program tooling.
//!
//! This module provides:
//! - The hex program format the loader consumes
//! - A simple two-pass assembler (text → program bytes)
//! - A disassembler (program bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod program;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use program::{load_program, parse_program, save_program, ParsedProgram, ProgramError};
