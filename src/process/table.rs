//! The process list: PCBs in load order, looked up by PID.

use crate::process::{Pcb, Pid, ProcessState, ProcessTableRow};

#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    pcbs: Vec<Pcb>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a PCB. A PCB with the same PID is replaced in place.
    pub fn insert(&mut self, pcb: Pcb) {
        match self.pcbs.iter_mut().find(|p| p.pid == pcb.pid) {
            Some(slot) => *slot = pcb,
            None => self.pcbs.push(pcb),
        }
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.pcbs.iter().find(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.pcbs.iter_mut().find(|p| p.pid == pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.get(pid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.pcbs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.pcbs.iter_mut()
    }

    pub fn as_slice(&self) -> &[Pcb] {
        &self.pcbs
    }

    pub fn len(&self) -> usize {
        self.pcbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcbs.is_empty()
    }

    /// PIDs currently marked running.
    pub fn running(&self) -> Vec<Pid> {
        self.with_state(ProcessState::Running)
    }

    pub fn with_state(&self, state: ProcessState) -> Vec<Pid> {
        self.pcbs
            .iter()
            .filter(|p| p.state == state)
            .map(|p| p.pid)
            .collect()
    }

    /// Display rows for every process.
    pub fn rows(&self) -> Vec<ProcessTableRow> {
        self.pcbs.iter().map(ProcessTableRow::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut table = ProcessTable::new();
        table.insert(Pcb::new(0, 0x000, 0));
        table.insert(Pcb::new(1, 0x100, 0));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).map(|p| p.location), Some(0x100));
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_keeps_load_order() {
        let mut table = ProcessTable::new();
        for pid in [3, 1, 2] {
            table.insert(Pcb::new(pid, 0, 0));
        }
        let pids: Vec<Pid> = table.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![3, 1, 2]);
    }

    #[test]
    fn test_filter_by_state() {
        let mut table = ProcessTable::new();
        table.insert(Pcb::new(0, 0, 0));
        table.insert(Pcb::new(1, 0x100, 0));
        table.get_mut(1).unwrap().state = ProcessState::Running;

        assert_eq!(table.running(), vec![1]);
        assert_eq!(table.with_state(ProcessState::Resident), vec![0]);
    }
}
