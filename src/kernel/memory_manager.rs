//! Fixed-partition memory manager.
//!
//! Main memory is split into equal segments. Each resident process owns
//! exactly one segment from load until it finishes or is killed.

use crate::cpu::Segment;
use crate::io::WindowProvider;
use crate::process::{Pcb, Pid};

#[derive(Debug, Clone)]
pub struct SegmentAllocator {
    segment_size: usize,
    owners: Vec<Option<Pid>>,
}

impl SegmentAllocator {
    pub fn new(memory_size: usize, segment_size: usize) -> Self {
        let count = if segment_size == 0 { 0 } else { memory_size / segment_size };
        Self {
            segment_size,
            owners: vec![None; count],
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Give `pid` the lowest free segment.
    pub fn allocate(&mut self, pid: Pid) -> Option<Segment> {
        let index = self.owners.iter().position(Option::is_none)?;
        self.owners[index] = Some(pid);
        Some(self.segment(index))
    }

    /// Release whatever segment `pid` holds. Returns it, if any.
    pub fn free(&mut self, pid: Pid) -> Option<Segment> {
        let index = self.owners.iter().position(|o| *o == Some(pid))?;
        self.owners[index] = None;
        Some(self.segment(index))
    }

    /// True if no segment is held.
    pub fn is_empty(&self) -> bool {
        self.owners.iter().all(Option::is_none)
    }

    fn segment(&self, index: usize) -> Segment {
        Segment::sized(index * self.segment_size, self.segment_size)
    }
}

impl WindowProvider for SegmentAllocator {
    fn bind_window(&self, pcb: &Pcb) -> Segment {
        Segment::sized(pcb.location, self.segment_size)
    }
}
