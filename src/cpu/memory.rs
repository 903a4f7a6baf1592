//! Main memory and the windowed accessor the CPU reads it through.
//!
//! Memory is a flat byte array split into fixed-size segments, one per
//! resident process. Every access from the CPU is relative to the segment
//! currently bound in the [`MemoryAccessor`].

use crate::io::{OutputSink, TrapSink};
use thiserror::Error;

/// Total bytes of main memory.
pub const MEMORY_SIZE: usize = 0x300;

/// Bytes in one process segment.
pub const MEM_SEGMENT_SIZE: usize = 0x100;

/// Flat byte-addressed main memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Memory of the default size, zeroed.
    pub fn new() -> Self {
        Self::with_size(MEMORY_SIZE)
    }

    /// Memory of `size` bytes, zeroed. A size of zero models a missing
    /// backing store.
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read an absolute address.
    #[inline]
    pub fn read(&self, addr: usize) -> Option<u8> {
        self.data.get(addr).copied()
    }

    /// Write an absolute address. Returns false if the address is past the end.
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) -> bool {
        match self.data.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Zero `len` bytes starting at absolute address `start`.
    pub fn clear_range(&mut self, start: usize, len: usize) {
        let end = start.saturating_add(len).min(self.data.len());
        if start < end {
            self.data[start..end].fill(0);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.data.iter().filter(|b| **b != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("total_bytes", &self.data.len())
            .finish()
    }
}

/// A memory window: `base` is the first absolute address, `limit` the
/// highest absolute address an access may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub base: usize,
    pub limit: usize,
}

impl Segment {
    pub fn new(base: usize, limit: usize) -> Self {
        Self { base, limit }
    }

    /// The window of `size` bytes starting at `base`.
    pub fn sized(base: usize, size: usize) -> Self {
        Self {
            base,
            limit: (base + size).saturating_sub(1),
        }
    }
}

/// Window-relative view over [`Memory`].
///
/// Bounds are only checked against the upper `limit`. There is no
/// protection against reaching below `base`, and an index that passes the
/// fence but lands outside the backing array also reads as absent.
#[derive(Debug, Clone)]
pub struct MemoryAccessor {
    memory: Memory,
    segment: Segment,
}

impl MemoryAccessor {
    /// Attach an accessor to its backing store, bound to the first segment.
    ///
    /// An empty store is OS-fatal: it is reported to `trap` and refused.
    pub fn new(memory: Memory, trap: &mut dyn TrapSink) -> Result<Self, MemoryError> {
        if memory.is_empty() {
            trap.trap_error("main memory is not initialized");
            return Err(MemoryError::Uninitialized);
        }
        let limit = MEM_SEGMENT_SIZE.min(memory.len()) - 1;
        Ok(Self {
            memory,
            segment: Segment::new(0, limit),
        })
    }

    /// Rebind the active window. The bounds are trusted as given.
    pub fn use_segment(&mut self, base: usize, limit: usize) {
        self.segment = Segment::new(base, limit);
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// True iff `base + index <= limit`.
    pub fn in_segment(&self, index: usize) -> bool {
        match self.segment.base.checked_add(index) {
            Some(addr) => addr <= self.segment.limit,
            None => false,
        }
    }

    fn check(&self, index: usize, out: &mut dyn OutputSink) -> bool {
        if self.in_segment(index) {
            true
        } else {
            out.put_line(&format!("Index {} out of range. Ignoring.", index));
            false
        }
    }

    /// Read a window-relative byte. `None` if the index fails the fence.
    pub fn get_value(&self, index: usize, out: &mut dyn OutputSink) -> Option<u8> {
        if !self.check(index, out) {
            return None;
        }
        self.memory.read(self.segment.base + index)
    }

    /// Write a window-relative byte. Dropped if the index fails the fence.
    pub fn set_value(&mut self, index: usize, value: u8, out: &mut dyn OutputSink) {
        if self.check(index, out) {
            self.memory.write(self.segment.base + index, value);
        }
    }

    /// Copy the window-relative range `start..end`.
    pub fn get_array(&self, start: usize, end: usize, out: &mut dyn OutputSink) -> Option<Vec<u8>> {
        if !(self.check(start, out) && self.check(end, out)) {
            return None;
        }
        let base = self.segment.base;
        let mut bytes = Vec::with_capacity(end.saturating_sub(start));
        for addr in (base + start)..(base + end) {
            bytes.push(self.memory.read(addr)?);
        }
        Some(bytes)
    }

    /// Write `data` starting at window offset `start`, byte by byte.
    pub fn set_array(&mut self, start: usize, data: &[u8], out: &mut dyn OutputSink) {
        for (i, &byte) in data.iter().enumerate() {
            self.set_value(start + i, byte, out);
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("main memory is not initialized")]
    Uninitialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferedOutput, TrapLog};

    fn accessor() -> MemoryAccessor {
        MemoryAccessor::new(Memory::new(), &mut TrapLog::default()).unwrap()
    }

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new();
        assert!(mem.write(10, 42));
        assert_eq!(mem.read(10), Some(42));
        assert!(!mem.write(MEMORY_SIZE, 1));
        assert_eq!(mem.read(MEMORY_SIZE), None);
    }

    #[test]
    fn test_missing_backing_store_traps() {
        let mut trap = TrapLog::default();
        let result = MemoryAccessor::new(Memory::with_size(0), &mut trap);
        assert_eq!(result.unwrap_err(), MemoryError::Uninitialized);
        assert!(trap.last.is_some());
    }

    #[test]
    fn test_window_relative_access() {
        let mut acc = accessor();
        let mut out = BufferedOutput::new();
        acc.use_segment(0x100, 0x1FF);

        acc.set_value(5, 0xAB, &mut out);
        assert_eq!(acc.memory().read(0x105), Some(0xAB));
        assert_eq!(acc.get_value(5, &mut out), Some(0xAB));
        assert!(out.lines().is_empty());
    }

    #[test]
    fn test_out_of_range_read_is_absent() {
        let mut acc = accessor();
        let mut out = BufferedOutput::new();
        acc.use_segment(0x100, 0x1FF);

        assert_eq!(acc.get_value(0x100, &mut out), None);
        assert!(out.contains("out of range"));
    }

    #[test]
    fn test_out_of_range_write_is_dropped() {
        let mut acc = accessor();
        let mut out = BufferedOutput::new();
        acc.use_segment(0, 0xFF);
        let before = acc.memory().clone();

        acc.set_value(0x100, 0x77, &mut out);

        assert_eq!(acc.memory(), &before);
        assert_eq!(out.lines().len(), 1);
    }

    #[test]
    fn test_fence_is_upper_bound_only() {
        let mut acc = accessor();
        // limit below base: nothing passes, even index 0
        acc.use_segment(0x200, 0x100);
        assert!(!acc.in_segment(0));

        // a limit past the backing array passes the fence but still reads absent
        acc.use_segment(0x200, 0x400);
        let mut out = BufferedOutput::new();
        assert!(acc.in_segment(0x150));
        assert_eq!(acc.get_value(0x150, &mut out), None);
        assert!(out.lines().is_empty());
    }

    #[test]
    fn test_bulk_copy() {
        let mut acc = accessor();
        let mut out = BufferedOutput::new();
        acc.use_segment(0x100, 0x1FF);

        acc.set_array(0, &[1, 2, 3, 4], &mut out);
        assert_eq!(acc.get_array(1, 3, &mut out), Some(vec![2, 3]));
        assert_eq!(acc.get_array(0, 0x100, &mut out), None);
    }

    #[test]
    fn test_set_array_drops_tail_past_limit() {
        let mut acc = accessor();
        let mut out = BufferedOutput::new();
        acc.use_segment(0, 0xFF);

        acc.set_array(0xFE, &[9, 9, 9], &mut out);
        assert_eq!(acc.memory().read(0xFE), Some(9));
        assert_eq!(acc.memory().read(0xFF), Some(9));
        assert_eq!(acc.memory().read(0x100), Some(0));
        assert_eq!(out.lines().len(), 1);
    }
}
