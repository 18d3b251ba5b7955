//! The collector: stop-the-world, recursion-free mark-sweep over a
//! [`Heap`].
//!
//! Marking is driven by an explicit work-list rather than recursion, so
//! a deeply nested array (object → field → object → ...) cannot blow the
//! host's C stack — this is the "mark/sweep is recursion-free: arrays
//! enqueue child stubs onto a work list" requirement from spec 4.1.
//! Root enumeration is the caller's job: `glyph-runtime` knows about the
//! data stack, the level stack, and pinned embedding-API handles; this
//! module only knows how to walk from a set of root ids to everything
//! reachable from them.

use crate::heap::{Heap, StubId};

/// Outcome of one collection cycle, surfaced for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcReport {
    pub reachable: u64,
    pub reclaimed: u64,
}

/// Run one mark-sweep cycle rooted at `roots`. Returns how many stubs
/// were reachable and how many were reclaimed.
pub fn collect(heap: &mut Heap, roots: &[StubId]) -> GcReport {
    heap.clear_marks();

    let mut work: Vec<StubId> = roots.to_vec();
    let mut reachable = 0u64;

    while let Some(id) = work.pop() {
        if heap.mark(id) {
            reachable += 1;
            work.extend(heap.child_ids(id));
        }
    }

    let reclaimed = heap.sweep();
    tracing::debug!(reachable, reclaimed, "gc cycle complete");
    GcReport {
        reachable,
        reclaimed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::stub::{Flavor, Payload};

    #[test]
    fn cyclic_object_graph_does_not_crash_collector() {
        let mut heap = Heap::new(1 << 16);
        let a = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        let b = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        heap.promote_to_managed(a);
        heap.promote_to_managed(b);

        // a -> b -> a, a cycle.
        heap.get_mut(a)
            .unwrap()
            .as_array_mut()
            .unwrap()
            .push(Cell::array(crate::cell::SequenceKind::Block, b, 0));
        heap.get_mut(b)
            .unwrap()
            .as_array_mut()
            .unwrap()
            .push(Cell::array(crate::cell::SequenceKind::Block, a, 0));

        let report = collect(&mut heap, &[a]);
        assert_eq!(report.reachable, 2);
        assert_eq!(report.reclaimed, 0);
        assert!(heap.get(a).is_some());
        assert!(heap.get(b).is_some());
    }

    #[test]
    fn unreachable_stub_reclaimed_within_one_cycle() {
        let mut heap = Heap::new(1 << 16);
        let root = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        let orphan = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        heap.promote_to_managed(root);
        heap.promote_to_managed(orphan);

        let report = collect(&mut heap, &[root]);
        assert_eq!(report.reclaimed, 1);
        assert!(heap.get(orphan).is_none());
    }

    #[test]
    fn deeply_nested_chain_does_not_overflow_stack() {
        let mut heap = Heap::new(1 << 24);
        let mut prev = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        heap.promote_to_managed(prev);
        let root = prev;
        for _ in 0..20_000 {
            let next = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
            heap.promote_to_managed(next);
            heap.get_mut(next)
                .unwrap()
                .as_array_mut()
                .unwrap()
                .push(Cell::array(crate::cell::SequenceKind::Block, prev, 0));
            prev = next;
        }
        let report = collect(&mut heap, &[root]);
        assert_eq!(report.reachable, 20_001);
        assert_eq!(report.reclaimed, 0);
    }
}
