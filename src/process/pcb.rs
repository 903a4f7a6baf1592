//! Process control blocks.

use crate::cpu::Registers;
use serde::{Deserialize, Serialize};

/// Process identifier.
pub type Pid = u32;

/// Lifecycle of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessState {
    /// Loaded into memory, not yet scheduled.
    Resident,
    Ready,
    Running,
    /// Killed or stopped before completion.
    Stopped,
    /// Finished normally.
    Done,
}

impl ProcessState {
    /// Stopped and Done processes are never scheduled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Resident => "RESIDENT",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Stopped => "STOPPED",
            ProcessState::Done => "DONE",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Saved registers and scheduling metadata for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcb {
    pub pid: Pid,
    /// Register snapshot from the last sync.
    pub regs: Registers,
    pub priority: u8,
    /// Base address of the process's memory window.
    pub location: usize,
    pub state: ProcessState,
}

impl Pcb {
    /// A freshly loaded process with zeroed registers.
    pub fn new(pid: Pid, location: usize, priority: u8) -> Self {
        Self {
            pid,
            regs: Registers::new(),
            priority,
            location,
            state: ProcessState::Resident,
        }
    }

    /// Display projection of this PCB.
    pub fn row(&self) -> ProcessTableRow {
        ProcessTableRow::from(self)
    }
}

/// One row of the process table as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTableRow {
    pub pid: Pid,
    pub pc: usize,
    pub ir: u8,
    pub acc: u8,
    pub x: u8,
    pub y: u8,
    pub z: bool,
    pub priority: u8,
    pub state: ProcessState,
}

impl From<&Pcb> for ProcessTableRow {
    fn from(pcb: &Pcb) -> Self {
        Self {
            pid: pcb.pid,
            pc: pcb.regs.pc,
            ir: pcb.regs.ir,
            acc: pcb.regs.acc,
            x: pcb.regs.x,
            y: pcb.regs.y,
            z: pcb.regs.z,
            priority: pcb.priority,
            state: pcb.state,
        }
    }
}

impl ProcessTableRow {
    pub const HEADER: &'static str = "PID PC IR AC X  Y  Z  PR STATE";
}

impl std::fmt::Display for ProcessTableRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}  {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {}",
            self.pid,
            self.pc,
            self.ir,
            self.acc,
            self.x,
            self.y,
            self.z as u8,
            self.priority,
            self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pcb_is_resident() {
        let pcb = Pcb::new(4, 0x200, 1);
        assert_eq!(pcb.state, ProcessState::Resident);
        assert_eq!(pcb.regs, Registers::new());
        assert_eq!(pcb.location, 0x200);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessState::Done.is_terminal());
        assert!(ProcessState::Stopped.is_terminal());
        assert!(!ProcessState::Ready.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
    }

    #[test]
    fn test_row_formatting() {
        let mut pcb = Pcb::new(1, 0x100, 0);
        pcb.regs.pc = 0x0B;
        pcb.regs.acc = 0xFE;
        pcb.regs.z = true;
        pcb.state = ProcessState::Done;

        assert_eq!(pcb.row().to_string(), "01  0b 00 fe 00 00 01 00 DONE");
    }
}
