//! CPU register file.
//!
//! - PC: program counter, an offset into the bound memory window
//! - IR: instruction register, the last fetched opcode byte
//! - Acc: 8-bit accumulator
//! - X, Y: 8-bit index registers
//! - Z: zero flag, set by CPX

use serde::{Deserialize, Serialize};

/// The register file. Also used as the saved snapshot in a PCB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub pc: usize,
    pub ir: u8,
    pub acc: u8,
    pub x: u8,
    pub y: u8,
    pub z: bool,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Increment the program counter by 1.
    /// Returns the new value.
    pub fn advance_pc(&mut self) -> usize {
        self.pc += 1;
        self.pc
    }

    /// Add a branch offset to the program counter.
    pub fn branch(&mut self, offset: u8) {
        self.pc += offset as usize;
    }
}
