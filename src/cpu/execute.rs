//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Every memory access goes through the [`MemoryAccessor`] bound to the
//! current process, so all addresses here are window offsets.

use crate::cpu::decode::{self, assemble_address, DecodeError, Opcode};
use crate::cpu::memory::MemoryAccessor;
use crate::cpu::Registers;
use crate::io::OutputSink;
use crate::process::Pid;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// The CPU.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Process owning the register set, if any.
    pid: Option<Pid>,
    /// Running (true) or halted (false).
    executing: bool,
    /// Instructions executed since the last init.
    pub cycles: u64,
}

impl Cpu {
    /// Create a halted CPU with zeroed registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every register, the owning PID and the executing flag.
    pub fn init(&mut self) {
        self.regs.reset();
        self.pid = None;
        self.executing = false;
        self.cycles = 0;
    }

    /// Snapshot of the live registers.
    pub fn registers(&self) -> Registers {
        self.regs
    }

    /// Overwrite the live registers.
    pub fn load_registers(&mut self, regs: &Registers) {
        self.regs = *regs;
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn set_pid(&mut self, pid: Pid) {
        self.pid = Some(pid);
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn set_executing(&mut self, executing: bool) {
        self.executing = executing;
    }

    /// Stop executing the current process.
    pub fn halt(&mut self) {
        self.executing = false;
    }

    /// Execute a single instruction.
    ///
    /// Returns the opcode that ran, or `None` if the fetched byte was not an
    /// instruction. In that case the notice has already been written to
    /// `out` and the CPU has halted.
    pub fn cycle(
        &mut self,
        mem: &mut MemoryAccessor,
        out: &mut dyn OutputSink,
    ) -> Result<Option<Opcode>, CpuError> {
        if !self.executing {
            return Err(CpuError::NotExecuting);
        }
        trace!(pid = ?self.pid, pc = self.regs.pc, "CPU cycle");

        // Fetch
        let fetched = mem.get_value(self.regs.pc, out);
        if let Some(byte) = fetched {
            self.regs.ir = byte;
        }

        // Decode
        let executed = match fetched.map(decode::decode) {
            Some(Ok(opcode)) => {
                trace!(op = opcode.mnemonic(), "execute");
                self.execute(opcode, mem, out);
                Some(opcode)
            }
            Some(Err(DecodeError::UnknownOpcode(byte))) => {
                out.put_line(&format!("ERROR - Unknown instruction: {:02x}", byte));
                self.halt();
                None
            }
            None => {
                out.put_line(&format!(
                    "ERROR - Unknown instruction: no value at {:02x}",
                    self.regs.pc
                ));
                self.halt();
                None
            }
        };

        self.regs.advance_pc();
        self.cycles += 1;

        Ok(executed)
    }

    /// Execute a decoded instruction. PC ends on the last operand byte.
    fn execute(&mut self, opcode: Opcode, mem: &mut MemoryAccessor, out: &mut dyn OutputSink) {
        match opcode {
            Opcode::LdaImm => {
                if let Some(value) = self.next_byte(mem, out) {
                    self.regs.acc = value;
                }
            }

            Opcode::LdaAbs => {
                if let Some(value) = self.next_memory(mem, out) {
                    self.regs.acc = value;
                }
            }

            Opcode::Sta => {
                if let Some(addr) = self.next_address(mem, out) {
                    mem.set_value(addr, self.regs.acc, out);
                }
            }

            Opcode::Adc => {
                if let Some(value) = self.next_memory(mem, out) {
                    self.regs.acc = self.regs.acc.wrapping_add(value);
                }
            }

            Opcode::LdxImm => {
                if let Some(value) = self.next_byte(mem, out) {
                    self.regs.x = value;
                }
            }

            Opcode::LdxAbs => {
                if let Some(value) = self.next_memory(mem, out) {
                    self.regs.x = value;
                }
            }

            Opcode::LdyImm => {
                if let Some(value) = self.next_byte(mem, out) {
                    self.regs.y = value;
                }
            }

            Opcode::LdyAbs => {
                if let Some(value) = self.next_memory(mem, out) {
                    self.regs.y = value;
                }
            }

            Opcode::Nop => {}

            Opcode::Brk => {
                self.halt();
            }

            Opcode::Cpx => {
                let value = self.next_memory(mem, out);
                self.regs.z = value == Some(self.regs.x);
            }

            Opcode::Bne => {
                // the operand names the cell holding the offset, which is
                // relative to the opcode; operands are only read when taken
                if !self.regs.z {
                    let origin = self.regs.pc;
                    let offset = self.next_memory(mem, out);
                    self.regs.pc = origin;
                    if let Some(offset) = offset {
                        self.regs.branch(offset);
                    }
                }
            }

            Opcode::Inc => {
                if let Some(addr) = self.next_address(mem, out) {
                    if let Some(value) = mem.get_value(addr, out) {
                        mem.set_value(addr, value.wrapping_add(1), out);
                    }
                }
            }

            Opcode::Sys => self.system_call(mem, out),
        }
    }

    fn system_call(&mut self, mem: &mut MemoryAccessor, out: &mut dyn OutputSink) {
        match self.regs.x {
            0x01 => out.put_line(&format!("{:02x}", self.regs.y)),
            0x02 => {
                // the string is taken from the instruction stream; Y only
                // seeds the length bound
                let bound = mem.memory().len();
                let mut char_addr = self.regs.y as usize;
                let mut text = String::new();
                loop {
                    let byte = self.next_byte(mem, out);
                    char_addr += 1;
                    match byte {
                        Some(0) | None => break,
                        Some(c) => text.push(char::from(c)),
                    }
                    if char_addr >= bound {
                        break;
                    }
                }
                out.put_line(&text);
            }
            _ => {}
        }
    }

    /// Pre-increment PC and read the byte there.
    fn next_byte(&mut self, mem: &MemoryAccessor, out: &mut dyn OutputSink) -> Option<u8> {
        let pc = self.regs.advance_pc();
        mem.get_value(pc, out)
    }

    /// Consume a two-byte little-endian address.
    fn next_address(&mut self, mem: &MemoryAccessor, out: &mut dyn OutputSink) -> Option<usize> {
        let low = self.next_byte(mem, out);
        let high = self.next_byte(mem, out);
        Some(assemble_address(low?, high?))
    }

    /// Consume an address and read the byte it names.
    fn next_memory(&mut self, mem: &MemoryAccessor, out: &mut dyn OutputSink) -> Option<u8> {
        let addr = self.next_address(mem, out)?;
        mem.get_value(addr, out)
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("pid", &self.pid)
            .field("executing", &self.executing)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU is not executing")]
    NotExecuting,
}
