//! Address space and allocator
//!
//! This module provides the VM's value store:
//! - A fixed-capacity array of [`Value`] cells indexed by [`Address`]
//! - A bump region that grows up to `memory_pointer`
//! - A free-block list of reclaimed ranges, searched first-fit
//! - A table of live extents (allocation start -> size) that lets the
//!   collector keep a whole block alive from any address inside it
//!
//! Address 0 and the rest of the reserved prefix are never handed out.

use super::value::{Address, Value};
use crate::vm::constants::RESERVED_MEMORY;
use crate::vm::errors::{Result, VmError};
use std::collections::{BTreeMap, BTreeSet};

/// A reclaimed, currently unallocated range of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub start: Address,
    pub size: usize,
}

impl FreeBlock {
    /// One past the last cell of the block
    pub fn end(&self) -> usize {
        self.start.index() + self.size
    }
}

/// Outcome of a sweep over the live extents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    pub kept_extents: usize,
    pub reclaimed_extents: usize,
    pub reclaimed_cells: usize,
}

/// The address space
#[derive(Debug, Clone)]
pub struct Heap {
    cells: Vec<Value>,
    free_blocks: Vec<FreeBlock>,
    live: BTreeMap<Address, usize>,
    memory_pointer: usize,
}

impl Heap {
    /// Create an address space of `capacity` cells (at least the reserved prefix)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(RESERVED_MEMORY, u32::MAX as usize);
        Heap {
            cells: vec![Value::None; capacity],
            free_blocks: Vec::new(),
            live: BTreeMap::new(),
            memory_pointer: RESERVED_MEMORY,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// High-water mark of the bump region
    pub fn memory_pointer(&self) -> usize {
        self.memory_pointer
    }

    pub fn free_blocks(&self) -> &[FreeBlock] {
        &self.free_blocks
    }

    /// Live allocations in address order
    pub fn live_extents(&self) -> impl Iterator<Item = (Address, usize)> + '_ {
        self.live.iter().map(|(&start, &size)| (start, size))
    }

    /// Cells below the high-water mark
    pub fn used_cells(&self) -> &[Value] {
        &self.cells[..self.memory_pointer]
    }

    /// Whether a request of `size` cells can be satisfied without collecting
    pub fn has_space(&self, size: usize) -> bool {
        self.free_blocks.iter().any(|block| block.size >= size)
            || self.capacity() - self.memory_pointer >= size
    }

    /// Allocate `size` contiguous cells: first-fit over the free list, then
    /// the bump region. Returns `None` when neither can satisfy the request.
    pub fn try_allocate(&mut self, size: usize) -> Option<Address> {
        if size == 0 {
            return Some(Address::NONE);
        }

        let start = if let Some(pos) = self.free_blocks.iter().position(|b| b.size >= size) {
            let block = &mut self.free_blocks[pos];
            let start = block.start;
            if block.size == size {
                self.free_blocks.remove(pos);
            } else {
                // Split: the remainder stays in place as a smaller block
                block.start = start.offset(size);
                block.size -= size;
            }
            start
        } else if self.capacity() - self.memory_pointer >= size {
            let start = Address::from_index(self.memory_pointer)?;
            self.memory_pointer += size;
            start
        } else {
            return None;
        };

        self.cells[start.index()..start.index() + size].fill(Value::None);
        self.live.insert(start, size);
        log::trace!("allocated {} cells at {}", size, start);
        Some(start)
    }

    /// Return a range to the allocator. The range must lie inside a single
    /// live allocation; releasing part of one trims or splits it, and a range
    /// that is no longer live (double release included) is rejected.
    pub fn release(&mut self, addr: Address, size: usize, line: u32) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let end = addr.index() + size;
        let extent = self
            .extent_containing(addr)
            .filter(|&(start, extent_size)| end <= start.index() + extent_size);
        let Some((start, extent_size)) = extent else {
            return Err(self.out_of_range(addr, line));
        };

        self.live.remove(&start);
        if addr > start {
            self.live.insert(start, addr.index() - start.index());
        }
        let extent_end = start.index() + extent_size;
        if end < extent_end {
            self.live.insert(addr.offset(size), extent_end - end);
        }
        self.cells[addr.index()..end].fill(Value::None);

        if end == self.memory_pointer {
            self.memory_pointer = addr.index();
            self.retract_bump_region();
        } else {
            self.free_blocks.push(FreeBlock { start: addr, size });
        }
        Ok(())
    }

    /// Absorb free blocks that now touch the top of the bump region
    fn retract_bump_region(&mut self) {
        while let Some(pos) = self
            .free_blocks
            .iter()
            .position(|b| b.end() == self.memory_pointer)
        {
            let block = self.free_blocks.swap_remove(pos);
            self.memory_pointer = block.start.index();
        }
    }

    fn out_of_range(&self, addr: Address, line: u32) -> VmError {
        VmError::AddressOutOfRange {
            address: addr,
            capacity: self.capacity(),
            line,
        }
    }

    /// Read a cell
    pub fn read(&self, addr: Address, line: u32) -> Result<&Value> {
        self.cells
            .get(addr.index())
            .ok_or_else(|| self.out_of_range(addr, line))
    }

    /// Write a cell. Address 0 is read-only.
    pub fn write(&mut self, addr: Address, value: Value, line: u32) -> Result<()> {
        if addr.is_none() {
            return Err(self.out_of_range(addr, line));
        }
        let capacity = self.capacity();
        match self.cells.get_mut(addr.index()) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(VmError::AddressOutOfRange {
                address: addr,
                capacity,
                line,
            }),
        }
    }

    /// The live extent containing `addr`, if any
    pub fn extent_containing(&self, addr: Address) -> Option<(Address, usize)> {
        self.live
            .range(..=addr)
            .next_back()
            .filter(|(start, size)| addr.index() < start.index() + **size)
            .map(|(&start, &size)| (start, size))
    }

    /// Forget every live extent not in `kept`, then rebuild the free list from
    /// the gaps between the survivors. The result is sorted and coalesced.
    pub(crate) fn sweep(&mut self, kept: &BTreeSet<Address>) -> SweepStats {
        let mut stats = SweepStats::default();
        let dead: Vec<(Address, usize)> = self
            .live
            .iter()
            .filter(|(start, _)| !kept.contains(start))
            .map(|(&start, &size)| (start, size))
            .collect();
        for (start, size) in dead {
            self.live.remove(&start);
            stats.reclaimed_extents += 1;
            stats.reclaimed_cells += size;
        }
        stats.kept_extents = self.live.len();

        self.free_blocks.clear();
        let mut cursor = RESERVED_MEMORY;
        for (&start, &size) in &self.live {
            if start.index() > cursor {
                self.cells[cursor..start.index()].fill(Value::None);
                self.free_blocks.push(FreeBlock {
                    start: Address::from_index(cursor).unwrap_or(Address::NONE),
                    size: start.index() - cursor,
                });
            }
            cursor = cursor.max(start.index() + size);
        }
        self.cells[cursor..self.memory_pointer.max(cursor)].fill(Value::None);
        self.memory_pointer = cursor;
        stats
    }

    /// Structural checks over the allocator state
    pub fn check(&self, line: u32) -> Result<()> {
        if !self.cells[0].is_none() {
            return Err(VmError::invariant("address 0 does not hold none", line));
        }
        if self.memory_pointer < RESERVED_MEMORY || self.memory_pointer > self.capacity() {
            return Err(VmError::invariant(
                format!(
                    "memory pointer {} outside [{}, {}]",
                    self.memory_pointer,
                    RESERVED_MEMORY,
                    self.capacity()
                ),
                line,
            ));
        }

        for (&start, &size) in &self.live {
            if start.index() < RESERVED_MEMORY || start.index() + size > self.memory_pointer {
                return Err(VmError::invariant(
                    format!("live extent {}+{} outside the used region", start, size),
                    line,
                ));
            }
        }

        let mut previous: Option<(Address, usize)> = None;
        for (&start, &size) in &self.live {
            if let Some((prev_start, prev_size)) = previous {
                if prev_start.index() + prev_size > start.index() {
                    return Err(VmError::invariant(
                        format!("live extent {} overlaps live extent {}", start, prev_start),
                        line,
                    ));
                }
            }
            previous = Some((start, size));
        }

        let mut blocks = self.free_blocks.clone();
        blocks.sort_by_key(|b| b.start);
        let mut previous_end = RESERVED_MEMORY;
        for block in &blocks {
            if block.size == 0 {
                return Err(VmError::invariant(
                    format!("empty free block at {}", block.start),
                    line,
                ));
            }
            if block.start.index() < previous_end {
                return Err(VmError::invariant(
                    format!("free block at {} overlaps its neighbour", block.start),
                    line,
                ));
            }
            if block.end() > self.memory_pointer {
                return Err(VmError::invariant(
                    format!("free block at {} extends past the memory pointer", block.start),
                    line,
                ));
            }
            let block_end = Address::from_index(block.end()).unwrap_or(Address::NONE);
            if let Some((&start, &size)) = self.live.range(..block_end).next_back() {
                if start.index() + size > block.start.index() {
                    return Err(VmError::invariant(
                        format!("free block at {} overlaps live extent {}", block.start, start),
                        line,
                    ));
                }
            }
            previous_end = block.end();
        }
        Ok(())
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(crate::vm::constants::MEMORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u32) -> Address {
        Address::new(i)
    }

    #[test]
    fn test_bump_allocation_skips_reserved() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(3).unwrap();
        let b = heap.try_allocate(2).unwrap();
        assert_eq!(a, addr(RESERVED_MEMORY as u32));
        assert_eq!(b, a.offset(3));
        assert_eq!(heap.memory_pointer(), RESERVED_MEMORY + 5);
    }

    #[test]
    fn test_first_fit_splits_block() {
        let mut heap = Heap::new(32);
        let a = heap.try_allocate(4).unwrap();
        let _b = heap.try_allocate(4).unwrap();
        heap.release(a, 4, 1).unwrap();

        let c = heap.try_allocate(3).unwrap();
        assert_eq!(c, a);
        assert_eq!(
            heap.free_blocks(),
            &[FreeBlock {
                start: a.offset(3),
                size: 1
            }]
        );
        heap.check(1).unwrap();
    }

    #[test]
    fn test_release_at_top_retracts_bump_region() {
        let mut heap = Heap::new(32);
        let a = heap.try_allocate(2).unwrap();
        let b = heap.try_allocate(2).unwrap();
        heap.release(a, 2, 1).unwrap();
        heap.release(b, 2, 1).unwrap();
        assert!(heap.free_blocks().is_empty());
        assert_eq!(heap.memory_pointer(), RESERVED_MEMORY);
    }

    #[test]
    fn test_exhaustion() {
        let mut heap = Heap::new(8);
        assert!(heap.has_space(7));
        assert!(!heap.has_space(8));
        assert!(heap.try_allocate(8).is_none());
        assert!(heap.try_allocate(7).is_some());
        assert!(heap.try_allocate(1).is_none());
    }

    #[test]
    fn test_out_of_range_access() {
        let mut heap = Heap::new(8);
        assert!(matches!(
            heap.read(addr(8), 3),
            Err(VmError::AddressOutOfRange { line: 3, .. })
        ));
        assert!(heap.write(addr(100), Value::Number(1.0), 3).is_err());
        assert!(heap.write(Address::NONE, Value::Number(1.0), 3).is_err());
        assert!(heap.release(Address::NONE, 1, 3).is_err());
    }

    #[test]
    fn test_extent_lookup() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(3).unwrap();
        assert_eq!(heap.extent_containing(a.offset(2)), Some((a, 3)));
        assert_eq!(heap.extent_containing(a.offset(3)), None);
    }

    #[test]
    fn test_sweep_coalesces_gaps() {
        let mut heap = Heap::new(32);
        let a = heap.try_allocate(2).unwrap();
        let b = heap.try_allocate(2).unwrap();
        let c = heap.try_allocate(2).unwrap();
        let d = heap.try_allocate(2).unwrap();
        heap.write(b, Value::Number(1.0), 1).unwrap();

        let kept: BTreeSet<Address> = [a, d].into_iter().collect();
        let stats = heap.sweep(&kept);
        assert_eq!(stats.reclaimed_extents, 2);
        assert_eq!(stats.reclaimed_cells, 4);
        assert_eq!(heap.free_blocks(), &[FreeBlock { start: b, size: 4 }]);
        assert!(heap.read(b, 1).unwrap().is_none());
        let _ = c;
        heap.check(1).unwrap();
    }

    #[test]
    fn test_release_tail_trims_extent() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(3).unwrap();
        heap.write(a, Value::Number(1.0), 1).unwrap();
        heap.release(a.offset(2), 1, 1).unwrap();

        assert_eq!(heap.extent_containing(a), Some((a, 2)));
        assert_eq!(heap.extent_containing(a.offset(2)), None);
        assert_eq!(heap.memory_pointer(), a.index() + 2);
        heap.check(1).unwrap();

        let kept: BTreeSet<Address> = [a].into_iter().collect();
        heap.sweep(&kept);
        assert_eq!(heap.read(a, 1).unwrap(), &Value::Number(1.0));
        assert_eq!(heap.memory_pointer(), a.index() + 2);
        heap.check(1).unwrap();
    }

    #[test]
    fn test_release_middle_splits_extent() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(4).unwrap();
        for i in 0..4 {
            heap.write(a.offset(i), Value::Number((i + 1) as f64 * 10.0), 1)
                .unwrap();
        }
        heap.release(a.offset(1), 1, 1).unwrap();

        let pieces: Vec<_> = heap.live_extents().collect();
        assert_eq!(pieces, vec![(a, 1), (a.offset(2), 2)]);
        heap.check(1).unwrap();

        // The hole is reused without overlapping either piece
        let b = heap.try_allocate(1).unwrap();
        assert_eq!(b, a.offset(1));
        heap.check(1).unwrap();

        let kept: BTreeSet<Address> = [a, a.offset(2)].into_iter().collect();
        heap.sweep(&kept);
        assert_eq!(heap.read(a, 1).unwrap(), &Value::Number(10.0));
        assert_eq!(heap.read(a.offset(2), 1).unwrap(), &Value::Number(30.0));
        assert_eq!(heap.read(a.offset(3), 1).unwrap(), &Value::Number(40.0));
        assert_eq!(heap.free_blocks(), &[FreeBlock { start: b, size: 1 }]);
        heap.check(1).unwrap();
    }

    #[test]
    fn test_release_outside_one_extent_is_rejected() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(2).unwrap();
        let _b = heap.try_allocate(2).unwrap();

        // Spans two allocations
        assert!(matches!(
            heap.release(a.offset(1), 2, 4),
            Err(VmError::AddressOutOfRange { line: 4, .. })
        ));
        heap.release(a, 2, 1).unwrap();
        // Already released
        assert!(heap.release(a, 2, 5).is_err());
        assert_eq!(heap.free_blocks(), &[FreeBlock { start: a, size: 2 }]);
        heap.check(1).unwrap();
    }

    #[test]
    fn test_check_reports_overlapping_extents() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(4).unwrap();
        heap.live.insert(a.offset(1), 1);
        assert!(matches!(
            heap.check(7),
            Err(VmError::InternalInvariantViolation { line: 7, .. })
        ));
    }

    #[test]
    fn test_sweep_never_moves_cursor_backwards() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(4).unwrap();
        heap.write(a.offset(3), Value::Number(40.0), 1).unwrap();
        heap.live.insert(a.offset(1), 1);

        let kept: BTreeSet<Address> = [a, a.offset(1)].into_iter().collect();
        heap.sweep(&kept);
        assert_eq!(heap.read(a.offset(3), 1).unwrap(), &Value::Number(40.0));
        assert!(heap.free_blocks().is_empty());
        assert_eq!(heap.memory_pointer(), a.index() + 4);
    }
}
