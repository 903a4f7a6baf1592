//! # acc8
//!
//! An 8-bit accumulator machine and a minimal multiprogramming kernel.
//!
//! The CPU runs one fetch-decode-execute step per clock tick against a
//! flat byte memory that each process sees through its own window. The
//! dispatcher moves register state between process control blocks and the
//! single CPU, and the kernel schedules resident programs round robin.

pub mod cpu;
pub mod process;
pub mod kernel;
pub mod asm;
pub mod io;
pub mod config;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, Memory, MemoryAccessor, Opcode, Registers, Segment};
pub use process::{Dispatcher, Pcb, Pid, ProcessState, ProcessTable, ProcessTableRow, SimContext};
pub use kernel::{Kernel, KernelError, MachineSnapshot};
pub use asm::{assemble, disassemble, parse_program, AssemblerError, ProgramError};
pub use config::MachineConfig;
