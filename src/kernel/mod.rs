//! A small multiprogramming kernel.
//!
//! The kernel owns the whole simulation: memory, the CPU, the process list
//! and the ready queue. Each [`Kernel::tick`] is one clock pulse. It makes
//! the scheduling decision for that pulse, then runs at most one CPU cycle
//! and reconciles the running PCB with the CPU.

pub mod memory_manager;

pub use memory_manager::SegmentAllocator;

use crate::config::{ConfigError, MachineConfig};
use crate::cpu::{Cpu, CpuError, Memory, MemoryAccessor, MemoryError};
use crate::io::{OutputSink, ProcessTableObserver, TrapSink};
use crate::process::{
    DispatchError, Dispatcher, Pcb, Pid, ProcessState, ProcessTable, ProcessTableRow, SimContext,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info};

pub struct Kernel<O: OutputSink> {
    cpu: Cpu,
    memory: MemoryAccessor,
    processes: ProcessTable,
    allocator: SegmentAllocator,
    dispatcher: Dispatcher,
    ready: VecDeque<Pid>,
    output: O,
    next_pid: Pid,
    quantum: u32,
    /// Cycles the current process has used of its quantum.
    slice: u32,
    ticks: u64,
}

impl<O: OutputSink> Kernel<O> {
    /// Boot a kernel with fresh memory.
    pub fn new(
        config: &MachineConfig,
        output: O,
        observer: Box<dyn ProcessTableObserver>,
        trap: &mut dyn TrapSink,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let memory = MemoryAccessor::new(Memory::with_size(config.memory_size), trap)?;
        info!(
            memory = config.memory_size,
            segments = config.segments(),
            quantum = config.quantum,
            "kernel booted"
        );
        Ok(Self {
            cpu: Cpu::new(),
            memory,
            processes: ProcessTable::new(),
            allocator: SegmentAllocator::new(config.memory_size, config.segment_size),
            dispatcher: Dispatcher::new(observer),
            ready: VecDeque::new(),
            output,
            next_pid: 0,
            quantum: config.quantum,
            slice: 0,
            ticks: 0,
        })
    }

    /// Place a program in a free segment and create its PCB.
    pub fn load(&mut self, program: &[u8], priority: u8) -> Result<Pid, KernelError> {
        let available = self.allocator.segment_size();
        if program.len() > available {
            return Err(KernelError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }

        let pid = self.next_pid;
        let segment = self.allocator.allocate(pid).ok_or(KernelError::OutOfMemory)?;
        self.next_pid += 1;

        // write through the new window, then put the running process's back
        let previous = self.memory.segment();
        self.memory.memory_mut().clear_range(segment.base, available);
        self.memory.use_segment(segment.base, segment.limit);
        self.memory.set_array(0, program, &mut self.output);
        self.memory.use_segment(previous.base, previous.limit);

        self.processes.insert(Pcb::new(pid, segment.base, priority));
        info!(pid, base = segment.base, size = program.len(), "program loaded");
        Ok(pid)
    }

    /// Make a resident process ready to run.
    pub fn run(&mut self, pid: Pid) -> Result<(), KernelError> {
        let pcb = self
            .processes
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        if pcb.state != ProcessState::Resident {
            return Err(KernelError::NotResident(pid));
        }
        pcb.state = ProcessState::Ready;
        self.ready.push_back(pid);
        info!(pid, "process ready");
        Ok(())
    }

    /// Make every resident process ready, in load order.
    pub fn run_all(&mut self) -> Vec<Pid> {
        let resident = self.processes.with_state(ProcessState::Resident);
        for &pid in &resident {
            // resident by construction
            let _ = self.run(pid);
        }
        resident
    }

    /// Stop a process and release its memory.
    pub fn kill(&mut self, pid: Pid) -> Result<(), KernelError> {
        let state = self
            .processes
            .get(pid)
            .map(|p| p.state)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        if state.is_terminal() {
            return Err(KernelError::AlreadyTerminated(pid));
        }

        let was_current = self.cpu.pid() == Some(pid) && self.cpu.is_executing();
        self.with_dispatcher(|d, ctx| d.stop_process(ctx, pid))?;
        self.ready.retain(|&p| p != pid);
        self.allocator.free(pid);
        if was_current {
            self.slice = 0;
        }
        info!(pid, "process killed");
        Ok(())
    }

    /// One clock pulse.
    pub fn tick(&mut self) -> Result<(), KernelError> {
        self.ticks += 1;
        self.schedule()?;

        if !self.cpu.is_executing() {
            return Ok(());
        }

        self.cpu.cycle(&mut self.memory, &mut self.output)?;
        self.slice += 1;
        self.with_dispatcher(|d, ctx| d.sync_processes(ctx));

        if !self.cpu.is_executing() {
            if let Some(pid) = self.cpu.pid() {
                self.allocator.free(pid);
                info!(pid, cycles = self.cpu.cycles, "process done");
            }
        }
        Ok(())
    }

    /// Round robin: switch when the CPU is idle or the quantum is used up.
    fn schedule(&mut self) -> Result<(), KernelError> {
        let idle = !self.cpu.is_executing();
        if !idle && self.slice < self.quantum {
            return Ok(());
        }

        let next = loop {
            match self.ready.pop_front() {
                Some(pid) if self.state_of(pid) == Some(ProcessState::Ready) => break pid,
                Some(_) => continue,
                None => {
                    if !idle {
                        // nobody waiting, keep going with a fresh quantum
                        self.slice = 0;
                    }
                    return Ok(());
                }
            }
        };

        let outgoing = self.cpu.pid();
        debug!(?outgoing, incoming = next, tick = self.ticks, "scheduling");
        self.with_dispatcher(|d, ctx| d.switch_process(ctx, outgoing, next))?;
        self.slice = 0;

        if let Some(pid) = outgoing {
            if self.state_of(pid) == Some(ProcessState::Ready) {
                self.ready.push_back(pid);
            }
        }
        Ok(())
    }

    /// Tick until nothing is running or ready, or `max_ticks` have passed.
    /// Returns the number of ticks taken.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> Result<u64, KernelError> {
        let start = self.ticks;
        while !self.is_idle() && self.ticks - start < max_ticks {
            self.tick()?;
        }
        Ok(self.ticks - start)
    }

    /// True if no process is running or waiting to run.
    pub fn is_idle(&self) -> bool {
        !self.cpu.is_executing()
            && !self
                .ready
                .iter()
                .any(|&p| self.state_of(p) == Some(ProcessState::Ready))
    }

    /// Zero all of memory. Refused while any process holds a segment.
    pub fn clear_memory(&mut self) -> Result<(), KernelError> {
        if !self.allocator.is_empty() {
            return Err(KernelError::MemoryInUse);
        }
        self.memory.memory_mut().clear();
        info!("memory cleared");
        Ok(())
    }

    pub fn set_quantum(&mut self, quantum: u32) -> Result<(), KernelError> {
        if quantum == 0 {
            return Err(ConfigError::Invalid("quantum must be at least 1".into()).into());
        }
        self.quantum = quantum;
        Ok(())
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    /// Process table rows, in load order.
    pub fn ps(&self) -> Vec<ProcessTableRow> {
        self.processes.rows()
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.processes.get(pid)
    }

    /// Serializable picture of the CPU and every PCB.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            ticks: self.ticks,
            quantum: self.quantum,
            cpu: self.cpu.clone(),
            processes: self.processes.as_slice().to_vec(),
        }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory(&self) -> &MemoryAccessor {
        &self.memory
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Full reset: fresh CPU, empty process list, zeroed memory.
    pub fn reset(&mut self) {
        self.cpu.init();
        self.memory.memory_mut().clear();
        self.processes = ProcessTable::new();
        self.allocator =
            SegmentAllocator::new(self.memory.memory().len(), self.allocator.segment_size());
        self.ready.clear();
        self.next_pid = 0;
        self.slice = 0;
        self.ticks = 0;
        info!("kernel reset");
    }

    fn state_of(&self, pid: Pid) -> Option<ProcessState> {
        self.processes.get(pid).map(|p| p.state)
    }

    fn with_dispatcher<R>(
        &mut self,
        f: impl FnOnce(&mut Dispatcher, &mut SimContext<'_>) -> R,
    ) -> R {
        let mut ctx = SimContext {
            cpu: &mut self.cpu,
            memory: &mut self.memory,
            processes: &mut self.processes,
            windows: &self.allocator,
        };
        f(&mut self.dispatcher, &mut ctx)
    }
}

/// Machine state as emitted by `acc8-emu run --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub ticks: u64,
    pub quantum: u32,
    pub cpu: Cpu,
    pub processes: Vec<Pcb>,
}

/// Errors raised by kernel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("program size {size} exceeds segment size {available}")]
    ProgramTooLarge { size: usize, available: usize },

    #[error("no free memory segment")]
    OutOfMemory,

    #[error("no process with PID {0}")]
    NoSuchProcess(Pid),

    #[error("process {0} is not resident")]
    NotResident(Pid),

    #[error("process {0} has already terminated")]
    AlreadyTerminated(Pid),

    #[error("memory is in use by resident processes")]
    MemoryInUse,

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("CPU error: {0}")]
    Cpu(#[from] CpuError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferedOutput, NullObserver, TrapLog};

    fn kernel(quantum: u32) -> Kernel<BufferedOutput> {
        let config = MachineConfig {
            quantum,
            ..MachineConfig::default()
        };
        Kernel::new(&config, BufferedOutput::new(), Box::new(NullObserver), &mut TrapLog::default())
            .unwrap()
    }

    // LDA #$02 / STA $0010 / LDA $0010 / BRK
    const STORE_LOAD: [u8; 9] = [0xA9, 0x02, 0x8D, 0x10, 0x00, 0xAD, 0x10, 0x00, 0x00];

    #[test]
    fn test_load_places_bytes_in_segment() {
        let mut k = kernel(6);
        let a = k.load(&[0xEA], 0).unwrap();
        let b = k.load(&[0xA9, 0x07], 3).unwrap();

        assert_eq!((a, b), (0, 1));
        assert_eq!(k.memory().memory().read(0x100), Some(0xA9));
        assert_eq!(k.memory().memory().read(0x101), Some(0x07));
        let pcb = k.process(b).unwrap();
        assert_eq!(pcb.state, ProcessState::Resident);
        assert_eq!((pcb.location, pcb.priority), (0x100, 3));
    }

    #[test]
    fn test_load_rejects_oversized_program() {
        let mut k = kernel(6);
        let err = k.load(&[0xEA; 0x101], 0).unwrap_err();
        assert_eq!(err, KernelError::ProgramTooLarge { size: 0x101, available: 0x100 });
    }

    #[test]
    fn test_load_out_of_memory() {
        let mut k = kernel(6);
        for _ in 0..3 {
            k.load(&[0x00], 0).unwrap();
        }
        assert_eq!(k.load(&[0x00], 0), Err(KernelError::OutOfMemory));
    }

    #[test]
    fn test_run_to_completion() {
        let mut k = kernel(6);
        let pid = k.load(&STORE_LOAD, 0).unwrap();
        k.run(pid).unwrap();

        k.run_until_idle(100).unwrap();

        let pcb = k.process(pid).unwrap();
        assert_eq!(pcb.state, ProcessState::Done);
        assert_eq!(pcb.regs.acc, 0x02);
        assert_eq!(k.memory().memory().read(0x10), Some(0x02));
        // segment released
        assert_eq!(k.load(&[0x00], 0).map(|p| k.process(p).unwrap().location), Ok(0));
    }

    #[test]
    fn test_run_requires_resident() {
        let mut k = kernel(6);
        let pid = k.load(&[0x00], 0).unwrap();
        k.run(pid).unwrap();
        assert_eq!(k.run(pid), Err(KernelError::NotResident(pid)));
        assert_eq!(k.run(42), Err(KernelError::NoSuchProcess(42)));
    }

    #[test]
    fn test_round_robin_interleaves() {
        let mut k = kernel(2);
        // each prints its own number three times
        let prog = |n: u8| {
            vec![
                0xA2, 0x01, 0xA0, n, 0xFF, 0xFF, 0xFF, 0x00,
            ]
        };
        let a = k.load(&prog(0xA), 0).unwrap();
        let b = k.load(&prog(0xB), 0).unwrap();
        k.run_all();

        k.run_until_idle(200).unwrap();

        assert_eq!(k.process(a).unwrap().state, ProcessState::Done);
        assert_eq!(k.process(b).unwrap().state, ProcessState::Done);
        let lines = k.output().lines().to_vec();
        assert_eq!(lines.len(), 6);
        // with a quantum of two the second process prints before the first finishes
        let first_b = lines.iter().position(|l| l == "0b").unwrap();
        let last_a = lines.iter().rposition(|l| l == "0a").unwrap();
        assert!(first_b < last_a);
    }

    #[test]
    fn test_context_switch_preserves_registers() {
        let mut k = kernel(1);
        // LDX #$05 / NOP / NOP / BRK
        let a = k.load(&[0xA2, 0x05, 0xEA, 0xEA, 0x00], 0).unwrap();
        // LDX #$09 / BRK
        let b = k.load(&[0xA2, 0x09, 0x00], 0).unwrap();
        k.run_all();

        k.run_until_idle(100).unwrap();

        assert_eq!(k.process(a).unwrap().regs.x, 0x05);
        assert_eq!(k.process(b).unwrap().regs.x, 0x09);
    }

    #[test]
    fn test_only_one_running() {
        let mut k = kernel(1);
        for _ in 0..3 {
            k.load(&[0xEA, 0xEA, 0xEA, 0x00], 0).unwrap();
        }
        k.run_all();
        for _ in 0..20 {
            k.tick().unwrap();
            let snapshot = k.snapshot();
            let running: Vec<_> = snapshot
                .processes
                .iter()
                .filter(|p| p.state == ProcessState::Running)
                .collect();
            assert!(running.len() <= 1);
            if let Some(pcb) = running.first() {
                assert_eq!(k.cpu().pid(), Some(pcb.pid));
            }
        }
    }

    #[test]
    fn test_kill_running_process() {
        let mut k = kernel(6);
        let pid = k.load(&[0xEA, 0xEA, 0xEA, 0xEA, 0x00], 0).unwrap();
        k.run(pid).unwrap();
        k.tick().unwrap();

        k.kill(pid).unwrap();

        assert!(!k.cpu().is_executing());
        assert_eq!(k.process(pid).unwrap().state, ProcessState::Stopped);
        assert!(k.is_idle());
        assert_eq!(k.kill(pid), Err(KernelError::AlreadyTerminated(pid)));
        // a halted CPU does not resurrect the stopped PCB
        k.tick().unwrap();
        assert_eq!(k.process(pid).unwrap().state, ProcessState::Stopped);
    }

    #[test]
    fn test_kill_waiting_process() {
        let mut k = kernel(6);
        let a = k.load(&[0xEA, 0x00], 0).unwrap();
        let b = k.load(&[0xA9, 0x01, 0x00], 0).unwrap();
        k.run_all();
        k.kill(b).unwrap();

        k.run_until_idle(50).unwrap();
        assert_eq!(k.process(a).unwrap().state, ProcessState::Done);
        assert_eq!(k.process(b).unwrap().state, ProcessState::Stopped);
        assert_eq!(k.process(b).unwrap().regs.acc, 0);
    }

    #[test]
    fn test_unknown_opcode_ends_process_only() {
        let mut k = kernel(6);
        let bad = k.load(&[0x02], 0).unwrap();
        let good = k.load(&[0xA9, 0x03, 0x00], 0).unwrap();
        k.run_all();

        k.run_until_idle(50).unwrap();

        assert_eq!(k.process(bad).unwrap().state, ProcessState::Done);
        assert_eq!(k.process(good).unwrap().state, ProcessState::Done);
        assert_eq!(k.process(good).unwrap().regs.acc, 3);
        assert!(k.output().contains("Unknown instruction"));
    }

    #[test]
    fn test_clear_memory_refused_while_resident() {
        let mut k = kernel(6);
        let pid = k.load(&[0xEA, 0x00], 0).unwrap();
        assert_eq!(k.clear_memory(), Err(KernelError::MemoryInUse));

        k.run(pid).unwrap();
        k.run_until_idle(10).unwrap();
        k.clear_memory().unwrap();
        assert_eq!(k.memory().memory().read(0), Some(0));
    }

    #[test]
    fn test_set_quantum() {
        let mut k = kernel(6);
        assert!(k.set_quantum(0).is_err());
        k.set_quantum(3).unwrap();
        assert_eq!(k.quantum(), 3);
    }

    #[test]
    fn test_missing_memory_is_fatal() {
        let config = MachineConfig {
            memory_size: 0,
            ..MachineConfig::default()
        };
        let mut trap = TrapLog::default();
        let result = Kernel::new(&config, BufferedOutput::new(), Box::new(NullObserver), &mut trap);
        assert!(matches!(result, Err(KernelError::Memory(MemoryError::Uninitialized))));
        assert!(trap.last.is_some());
    }

    #[test]
    fn test_reset() {
        let mut k = kernel(6);
        let pid = k.load(&[0xEA, 0x00], 0).unwrap();
        k.run(pid).unwrap();
        k.run_until_idle(10).unwrap();
        assert_eq!(k.ticks(), 2);

        k.reset();
        assert!(k.ps().is_empty());
        assert_eq!(k.ticks(), 0);
        assert_eq!(k.load(&[0x00], 0), Ok(0));
        k.run_all();
        k.run_until_idle(10).unwrap();
        assert_eq!(k.ticks(), 1);
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut k = kernel(6);
        let pid = k.load(&[0xA2, 0x03, 0x00], 7).unwrap();
        k.run(pid).unwrap();
        k.run_until_idle(10).unwrap();

        let snapshot = k.snapshot();
        assert_eq!(snapshot.cpu.cycles, 2);
        assert_eq!(snapshot.processes[0].regs.x, 0x03);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MachineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
