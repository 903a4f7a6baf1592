//! Context switching between PCBs and the one physical CPU.
//!
//! The dispatcher is the only place where PCB register snapshots and the
//! live CPU registers are copied into each other. It borrows the machine
//! state for the duration of each call through a [`SimContext`].

use crate::cpu::{Cpu, MemoryAccessor};
use crate::io::{NullObserver, ProcessTableObserver, WindowProvider};
use crate::process::{Pid, ProcessState, ProcessTable};
use thiserror::Error;
use tracing::debug;

/// Mutable machine state borrowed by a dispatcher call.
pub struct SimContext<'a> {
    pub cpu: &'a mut Cpu,
    pub memory: &'a mut MemoryAccessor,
    pub processes: &'a mut ProcessTable,
    pub windows: &'a dyn WindowProvider,
}

/// Moves register state between PCBs and the CPU and drives process state
/// transitions.
pub struct Dispatcher {
    observer: Box<dyn ProcessTableObserver>,
}

impl Dispatcher {
    pub fn new(observer: Box<dyn ProcessTableObserver>) -> Self {
        Self { observer }
    }

    /// Bind `pid`'s window, load its registers and mark it running.
    pub fn start_process(
        &mut self,
        ctx: &mut SimContext<'_>,
        pid: Pid,
    ) -> Result<(), DispatchError> {
        debug_assert!(
            ctx.processes.running().iter().all(|&p| p == pid),
            "starting process {} while another is still running",
            pid
        );

        let pcb = ctx
            .processes
            .get_mut(pid)
            .ok_or(DispatchError::NoSuchProcess(pid))?;

        let window = ctx.windows.bind_window(pcb);
        ctx.memory.use_segment(window.base, window.limit);

        ctx.cpu.load_registers(&pcb.regs);
        pcb.state = ProcessState::Running;
        ctx.cpu.set_pid(pid);
        ctx.cpu.set_executing(true);

        debug!(pid, base = window.base, limit = window.limit, pc = pcb.regs.pc, "process started");
        self.notify(ctx);
        Ok(())
    }

    /// Copy the live registers back into the PCB that owns the CPU.
    ///
    /// That PCB becomes Running if the CPU is still executing, Done
    /// otherwise. Every other PCB keeps its last snapshot.
    pub fn sync_processes(&mut self, ctx: &mut SimContext<'_>) {
        let current = ctx.cpu.pid();
        let executing = ctx.cpu.is_executing();
        let regs = ctx.cpu.registers();

        for pcb in ctx.processes.iter_mut() {
            if Some(pcb.pid) != current {
                continue;
            }
            pcb.regs = regs;
            pcb.state = if executing {
                ProcessState::Running
            } else {
                ProcessState::Done
            };
            if !executing {
                debug!(pid = pcb.pid, "process finished");
            }
        }

        self.notify(ctx);
    }

    /// Stop `pid`. Halts the CPU if `pid` owns it.
    ///
    /// The state becomes Stopped even when the process never ran, which
    /// also takes it out of scheduling.
    pub fn stop_process(
        &mut self,
        ctx: &mut SimContext<'_>,
        pid: Pid,
    ) -> Result<(), DispatchError> {
        self.terminate(ctx, pid, ProcessState::Stopped)
    }

    /// Like [`stop_process`](Self::stop_process) but marks normal completion.
    pub fn end_process(&mut self, ctx: &mut SimContext<'_>, pid: Pid) -> Result<(), DispatchError> {
        self.terminate(ctx, pid, ProcessState::Done)
    }

    fn terminate(
        &mut self,
        ctx: &mut SimContext<'_>,
        pid: Pid,
        state: ProcessState,
    ) -> Result<(), DispatchError> {
        let pcb = ctx
            .processes
            .get_mut(pid)
            .ok_or(DispatchError::NoSuchProcess(pid))?;

        if ctx.cpu.pid() == Some(pid) {
            ctx.cpu.halt();
        }
        pcb.state = state;

        debug!(pid, state = %state, "process terminated");
        self.notify(ctx);
        Ok(())
    }

    /// Save `outgoing` and start `incoming`.
    ///
    /// If `outgoing` owns the CPU its live registers are written back to its
    /// PCB first. A running `outgoing` is demoted to Ready.
    pub fn switch_process(
        &mut self,
        ctx: &mut SimContext<'_>,
        outgoing: Option<Pid>,
        incoming: Pid,
    ) -> Result<(), DispatchError> {
        if !ctx.processes.contains(incoming) {
            return Err(DispatchError::NoSuchProcess(incoming));
        }

        if let Some(pcb) = outgoing.and_then(|pid| ctx.processes.get_mut(pid)) {
            if ctx.cpu.pid() == Some(pcb.pid) {
                pcb.regs = ctx.cpu.registers();
            }
            if pcb.state == ProcessState::Running {
                pcb.state = ProcessState::Ready;
            }
            debug!(from = pcb.pid, to = incoming, "context switch");
        }

        self.start_process(ctx, incoming)
    }

    fn notify(&mut self, ctx: &SimContext<'_>) {
        self.observer.on_process_table_changed(ctx.processes.as_slice());
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Box::new(NullObserver))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Errors that can occur while dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no process with PID {0}")]
    NoSuchProcess(Pid),
}
