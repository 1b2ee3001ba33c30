//! Reachability collector
//!
//! Mark phase: starting from the root addresses, every reachable address keeps
//! the whole live extent that contains it, and every cell of a kept extent is
//! traced through `Reference`, `ListHeader` and `Closure` values. The work
//! list is explicit so deeply nested lists do not recurse on the native stack.
//!
//! Sweep phase: unkept extents are forgotten and the free list is rebuilt from
//! the gaps between survivors. Nothing moves, so addresses held by the operand
//! stacks and closures stay valid.

use super::closure::ClosureTable;
use super::heap::{Heap, SweepStats};
use super::value::{Address, Value};
use std::collections::BTreeSet;

/// Start addresses of every extent reachable from `roots`
pub fn mark(heap: &Heap, closures: &ClosureTable, roots: Vec<Address>) -> BTreeSet<Address> {
    let mut kept = BTreeSet::new();
    let mut worklist = roots;
    let cells = heap.used_cells();

    while let Some(addr) = worklist.pop() {
        let Some((start, size)) = heap.extent_containing(addr) else {
            continue;
        };
        if !kept.insert(start) {
            continue;
        }
        let extent = cells
            .get(start.index()..start.index() + size)
            .unwrap_or_default();
        for cell in extent {
            match cell {
                Value::Closure(index) => {
                    if let Some(closure) = closures.get(*index) {
                        worklist.extend(closure.bound_addresses());
                    }
                }
                other => worklist.extend(other.referenced_addresses()),
            }
        }
    }
    kept
}

/// Run a full mark and sweep cycle
pub fn collect(heap: &mut Heap, closures: &ClosureTable, roots: Vec<Address>) -> SweepStats {
    let kept = mark(heap, closures, roots);
    heap.sweep(&kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traces_nested_lists() {
        let mut heap = Heap::new(64);
        let inner = heap.try_allocate(3).unwrap();
        heap.write(
            inner,
            Value::ListHeader {
                len: 2,
                start: inner.offset(1),
            },
            1,
        )
        .unwrap();
        let outer = heap.try_allocate(2).unwrap();
        heap.write(
            outer,
            Value::ListHeader {
                len: 1,
                start: outer.offset(1),
            },
            1,
        )
        .unwrap();
        heap.write(outer.offset(1), Value::Reference(inner), 1).unwrap();
        let garbage = heap.try_allocate(4).unwrap();

        let stats = collect(&mut heap, &ClosureTable::new(), vec![outer]);
        assert_eq!(stats.kept_extents, 2);
        assert_eq!(stats.reclaimed_cells, 4);
        assert!(heap.extent_containing(inner).is_some());
        assert!(heap.extent_containing(garbage).is_none());
    }

    #[test]
    fn test_cycles_terminate() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(1).unwrap();
        let b = heap.try_allocate(1).unwrap();
        heap.write(a, Value::Reference(b), 1).unwrap();
        heap.write(b, Value::Reference(a), 1).unwrap();

        let kept = mark(&heap, &ClosureTable::new(), vec![a]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_roots_outside_extents_are_ignored() {
        let mut heap = Heap::new(16);
        let a = heap.try_allocate(1).unwrap();
        let stats = collect(
            &mut heap,
            &ClosureTable::new(),
            vec![Address::NONE, Address::new(12)],
        );
        assert_eq!(stats.kept_extents, 0);
        assert!(heap.extent_containing(a).is_none());
        assert_eq!(heap.memory_pointer(), crate::vm::constants::RESERVED_MEMORY);
    }
}
