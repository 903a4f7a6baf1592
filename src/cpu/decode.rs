//! Instruction decoder.
//!
//! Opcodes are single bytes followed by zero, one or two operand bytes.
//! Decoding is a lookup in [`OPCODE_TABLE`]; the table also carries the
//! mnemonic and operand form used by the assembler and disassembler.

use thiserror::Error;

/// Operand bytes that follow an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No operand bytes.
    None,
    /// One byte, used as a value.
    Immediate,
    /// Two bytes, little-endian, naming a window offset.
    Absolute,
}

impl Operand {
    /// Number of operand bytes.
    pub fn len(self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Immediate => 1,
            Operand::Absolute => 2,
        }
    }
}

/// Decoded opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Acc := #imm
    LdaImm,
    /// Acc := [addr]
    LdaAbs,
    /// [addr] := Acc
    Sta,
    /// Acc := Acc + [addr], no carry
    Adc,
    /// X := #imm
    LdxImm,
    /// X := [addr]
    LdxAbs,
    /// Y := #imm
    LdyImm,
    /// Y := [addr]
    LdyAbs,
    Nop,
    /// Stop executing the current process.
    Brk,
    /// Z := (X == [addr])
    Cpx,
    /// If Z is clear, PC := PC + [addr]
    Bne,
    /// [addr] := [addr] + 1
    Inc,
    /// System call selected by X.
    Sys,
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub byte: u8,
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub operand: Operand,
    pub description: &'static str,
}

/// Every instruction the CPU understands.
#[rustfmt::skip]
pub const OPCODE_TABLE: [OpcodeInfo; 14] = [
    OpcodeInfo { byte: 0xA9, opcode: Opcode::LdaImm, mnemonic: "LDA", operand: Operand::Immediate, description: "Load the accumulator with a constant." },
    OpcodeInfo { byte: 0xAD, opcode: Opcode::LdaAbs, mnemonic: "LDA", operand: Operand::Absolute, description: "Load the accumulator from memory." },
    OpcodeInfo { byte: 0x8D, opcode: Opcode::Sta, mnemonic: "STA", operand: Operand::Absolute, description: "Store the accumulator in memory." },
    OpcodeInfo { byte: 0x6D, opcode: Opcode::Adc, mnemonic: "ADC", operand: Operand::Absolute, description: "Add the contents of an address to the accumulator." },
    OpcodeInfo { byte: 0xA2, opcode: Opcode::LdxImm, mnemonic: "LDX", operand: Operand::Immediate, description: "Load the X register with a constant." },
    OpcodeInfo { byte: 0xAE, opcode: Opcode::LdxAbs, mnemonic: "LDX", operand: Operand::Absolute, description: "Load the X register from memory." },
    OpcodeInfo { byte: 0xA0, opcode: Opcode::LdyImm, mnemonic: "LDY", operand: Operand::Immediate, description: "Load the Y register with a constant." },
    OpcodeInfo { byte: 0xAC, opcode: Opcode::LdyAbs, mnemonic: "LDY", operand: Operand::Absolute, description: "Load the Y register from memory." },
    OpcodeInfo { byte: 0xEA, opcode: Opcode::Nop, mnemonic: "NOP", operand: Operand::None, description: "No operation." },
    OpcodeInfo { byte: 0x00, opcode: Opcode::Brk, mnemonic: "BRK", operand: Operand::None, description: "Break: end the running process." },
    OpcodeInfo { byte: 0xEC, opcode: Opcode::Cpx, mnemonic: "CPX", operand: Operand::Absolute, description: "Compare a byte in memory to X. Sets Z if equal." },
    OpcodeInfo { byte: 0xD0, opcode: Opcode::Bne, mnemonic: "BNE", operand: Operand::Absolute, description: "Branch by the byte at an address if Z is clear." },
    OpcodeInfo { byte: 0xEE, opcode: Opcode::Inc, mnemonic: "INC", operand: Operand::Absolute, description: "Increment the value of a byte." },
    OpcodeInfo { byte: 0xFF, opcode: Opcode::Sys, mnemonic: "SYS", operand: Operand::None, description: "System call. Print integer (X = 1) or string (X = 2)." },
];

/// Look up the table row for an opcode byte.
pub fn lookup(byte: u8) -> Option<&'static OpcodeInfo> {
    OPCODE_TABLE.iter().find(|info| info.byte == byte)
}

/// Decode an opcode byte.
pub fn decode(byte: u8) -> Result<Opcode, DecodeError> {
    lookup(byte)
        .map(|info| info.opcode)
        .ok_or(DecodeError::UnknownOpcode(byte))
}

impl Opcode {
    /// Table rows are in variant declaration order.
    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_TABLE[self as usize]
    }

    /// The opcode byte.
    pub fn byte(self) -> u8 {
        self.info().byte
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn operand(self) -> Operand {
        self.info().operand
    }
}

/// Multiplier applied to the high address byte.
///
/// Two-byte addresses are `low + high * 0xFF`, not `* 0x100`.
pub const ADDRESS_HIGH_WEIGHT: usize = 0xFF;

/// Combine little-endian operand bytes into a window offset.
pub fn assemble_address(low: u8, high: u8) -> usize {
    low as usize + high as usize * ADDRESS_HIGH_WEIGHT
}

/// Split a window offset into `(low, high)` operand bytes that
/// [`assemble_address`] maps back to the same offset.
pub fn split_address(offset: usize) -> Option<(u8, u8)> {
    let high = offset / ADDRESS_HIGH_WEIGHT;
    let low = offset % ADDRESS_HIGH_WEIGHT;
    Some((u8::try_from(low).ok()?, u8::try_from(high).ok()?))
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown instruction: {0:02x}")]
    UnknownOpcode(u8),
}
