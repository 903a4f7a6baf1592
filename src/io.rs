//! Collaborator interfaces of the machine core.
//!
//! The CPU, the memory accessor and the dispatcher never print or render
//! anything themselves. Console text, OS-fatal traps, process table refreshes
//! and window assignment are all handed to the implementations below.

use crate::cpu::memory::Segment;
use crate::process::Pcb;

/// Console output: SYS call text and non-fatal machine notices.
pub trait OutputSink {
    fn put_line(&mut self, text: &str);
}

/// Receiver for conditions that halt the whole simulated machine.
pub trait TrapSink {
    fn trap_error(&mut self, message: &str);
}

/// Notified after every dispatcher state transition.
///
/// Purely observational. The hook returns nothing, so it has no way to
/// influence scheduling.
pub trait ProcessTableObserver {
    fn on_process_table_changed(&mut self, processes: &[Pcb]);
}

/// Supplies the memory window a process runs in.
pub trait WindowProvider {
    fn bind_window(&self, pcb: &Pcb) -> Segment;
}

/// Collects output lines in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferedOutput {
    lines: Vec<String>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for BufferedOutput {
    fn put_line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

/// Writes each line to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn put_line(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Trap sink that logs through `tracing` and remembers the last message.
#[derive(Debug, Default, Clone)]
pub struct TrapLog {
    pub last: Option<String>,
}

impl TrapSink for TrapLog {
    fn trap_error(&mut self, message: &str) {
        tracing::error!(trap = message, "OS trap");
        self.last = Some(message.to_string());
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProcessTableObserver for NullObserver {
    fn on_process_table_changed(&mut self, _processes: &[Pcb]) {}
}
