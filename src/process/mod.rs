//! Processes: control blocks, the process list and the dispatcher.

pub mod pcb;
pub mod table;
pub mod dispatcher;

pub use pcb::{Pcb, Pid, ProcessState, ProcessTableRow};
pub use table::ProcessTable;
pub use dispatcher::{DispatchError, Dispatcher, SimContext};
