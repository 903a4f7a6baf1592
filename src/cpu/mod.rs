//! CPU emulation for the 8-bit accumulator machine.
//!
//! - Flat byte memory, accessed through a per-process window
//! - Registers: PC, IR, Acc, X, Y and the Z flag
//! - 14-instruction set with immediate and two-byte absolute operands

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryAccessor, MemoryError, Segment, MEMORY_SIZE, MEM_SEGMENT_SIZE};
pub use registers::Registers;
pub use decode::{DecodeError, Opcode, Operand, OPCODE_TABLE};
pub use execute::{Cpu, CpuError};
