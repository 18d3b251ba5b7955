//! The pooled stub allocator.
//!
//! Stubs live in a slab addressed by [`StubId`]: a `Vec<Option<Box<Stub>>>`
//! with a freelist of reclaimed slots. This is the safe-Rust analogue of
//! "a fixed-size pool allocator with a freelist per size class" — instead
//! of size classes we have one slot per stub regardless of its payload's
//! size, which is the shape that actually matters for the collector (one
//! header, one set of flags, one mark bit per live object).
//!
//! Two-phase lifecycle: [`Heap::allocate_unmanaged`] returns a `StubId`
//! owned solely by its caller; [`Heap::promote_to_managed`] links it into
//! the reachability graph the collector scans. A stub that is never
//! promoted and whose id is dropped by its creator without promotion is
//! leaked until the next [`crate::gc::collect`] sweep notices nothing
//! points at it — consistent with "unmanaged stubs are solely owned by
//! their creator until managed".

use crate::stub::{Flavor, Payload, Stub};
use std::fmt;

/// An index into a [`Heap`]'s stub slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubId(u32);

impl StubId {
    pub fn to_u64(self) -> u64 {
        self.0 as u64
    }

    pub fn from_u64(raw: u64) -> StubId {
        StubId(raw as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub#{}", self.0)
    }
}

/// A GC-managed heap: the stub slab plus depletion accounting.
pub struct Heap {
    slots: Vec<Option<Box<Stub>>>,
    free_list: Vec<u32>,
    /// Bytes charged against the GC depletion counter since the last
    /// collection (spec 4.1: "a GC depletion counter decreases by each
    /// allocated byte").
    pub depletion_counter: i64,
    pub depletion_threshold: i64,
    pub stubs_allocated_total: u64,
    pub stubs_reclaimed_total: u64,
    pub collections_run: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new(1 << 20)
    }
}

impl Heap {
    pub fn new(depletion_threshold: i64) -> Self {
        Heap {
            slots: Vec::new(),
            free_list: Vec::new(),
            depletion_counter: depletion_threshold,
            depletion_threshold,
            stubs_allocated_total: 0,
            stubs_reclaimed_total: 0,
            collections_run: 0,
        }
    }

    fn estimated_size(payload: &Payload) -> i64 {
        let base = std::mem::size_of::<Stub>() as i64;
        let extra = match payload {
            Payload::Array(s) => s.capacity_units() * std::mem::size_of::<crate::Cell>(),
            Payload::ByteBuffer(s) => s.capacity_units(),
            Payload::Varlist(s) => s.capacity_units() * std::mem::size_of::<crate::Cell>(),
            Payload::Keylist(v) => v.capacity() * std::mem::size_of::<crate::SymbolId>(),
            Payload::Pairlist(v) => v.capacity() * std::mem::size_of::<crate::Cell>() * 2,
            Payload::HashList(m) => m.capacity() * 16,
            Payload::ModuleSea(m) => m.capacity() * (std::mem::size_of::<crate::Cell>() + 4),
            Payload::Details(_) | Payload::Let(_) => 0,
            Payload::BookmarkList(v) => v.capacity() * 16,
        };
        base + extra as i64
    }

    /// Allocate a stub, unmanaged: owned solely by the caller until
    /// [`Heap::promote_to_managed`] is called on its id.
    pub fn allocate_unmanaged(&mut self, flavor: Flavor, payload: Payload) -> StubId {
        let size = Self::estimated_size(&payload);
        self.depletion_counter -= size;
        self.stubs_allocated_total += 1;
        let stub = Box::new(Stub::new(flavor, payload));
        let id = if let Some(slot) = self.free_list.pop() {
            self.slots[slot as usize] = Some(stub);
            slot
        } else {
            self.slots.push(Some(stub));
            (self.slots.len() - 1) as u32
        };
        tracing::trace!(stub = id, ?flavor, "allocated unmanaged stub");
        StubId(id)
    }

    pub fn promote_to_managed(&mut self, id: StubId) {
        if let Some(stub) = self.get_mut(id) {
            stub.header.managed = true;
        }
    }

    pub fn is_managed(&self, id: StubId) -> bool {
        self.get(id).map(|s| s.header.managed).unwrap_or(false)
    }

    /// Diminish a stub: mark it inaccessible without deallocating its
    /// slot, so dangling references can report an error instead of
    /// reading freed memory.
    pub fn diminish(&mut self, id: StubId) {
        if let Some(stub) = self.get_mut(id) {
            stub.header.inaccessible = true;
        }
    }

    pub fn get(&self, id: StubId) -> Option<&Stub> {
        self.slots.get(id.index()).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, id: StubId) -> Option<&mut Stub> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_deref_mut())
    }

    /// Whether the next evaluator boundary should trigger a collection
    /// (spec 4.1: the trampoline consults this, not the heap itself).
    pub fn should_recycle(&self) -> bool {
        self.depletion_counter <= 0
    }

    /// Free-form accounting hook: deduct `bytes` from the depletion
    /// counter without allocating a stub (used for byte-series growth).
    pub fn charge(&mut self, bytes: i64) {
        self.depletion_counter -= bytes;
    }

    pub(crate) fn live_ids(&self) -> impl Iterator<Item = StubId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| StubId(i as u32)))
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.header.marked = false;
        }
    }

    pub(crate) fn mark(&mut self, id: StubId) -> bool {
        if let Some(stub) = self.get_mut(id) {
            if stub.header.marked {
                false
            } else {
                stub.header.marked = true;
                true
            }
        } else {
            false
        }
    }

    pub(crate) fn child_ids(&self, id: StubId) -> Vec<StubId> {
        self.get(id).map(|s| s.child_stub_ids()).unwrap_or_default()
    }

    /// Sweep every slot that is managed, unmarked, and not still owned
    /// unmanaged by a live builder (unmanaged stubs are never swept here
    /// — only the managed reachability graph is collected).
    pub(crate) fn sweep(&mut self) -> u64 {
        let mut reclaimed = 0u64;
        for i in 0..self.slots.len() {
            let should_free = match &self.slots[i] {
                Some(stub) => stub.header.managed && !stub.header.marked,
                None => false,
            };
            if should_free {
                self.slots[i] = None;
                self.free_list.push(i as u32);
                reclaimed += 1;
            }
        }
        self.stubs_reclaimed_total += reclaimed;
        self.collections_run += 1;
        self.depletion_counter = self.depletion_threshold;
        reclaimed
    }

    pub fn stub_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cell;

    #[test]
    fn unmanaged_stub_survives_until_promoted() {
        let mut heap = Heap::new(1 << 16);
        let id = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        assert!(!heap.is_managed(id));
        heap.promote_to_managed(id);
        assert!(heap.is_managed(id));
    }

    #[test]
    fn sweep_reclaims_unreachable_managed_stubs() {
        let mut heap = Heap::new(1 << 16);
        let keep = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        let drop_me = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        heap.promote_to_managed(keep);
        heap.promote_to_managed(drop_me);

        heap.clear_marks();
        heap.mark(keep);
        let reclaimed = heap.sweep();

        assert_eq!(reclaimed, 1);
        assert!(heap.get(keep).is_some());
        assert!(heap.get(drop_me).is_none());
    }

    #[test]
    fn reclaimed_slot_is_reused() {
        let mut heap = Heap::new(1 << 16);
        let a = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        heap.promote_to_managed(a);
        heap.clear_marks();
        heap.sweep();
        let b = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        assert_eq!(a, b);
    }

    #[test]
    fn depletion_counter_decreases_with_allocation() {
        let mut heap = Heap::new(1 << 16);
        let before = heap.depletion_counter;
        heap.allocate_unmanaged(
            Flavor::Array,
            Payload::Array(crate::SeriesBuf::from_vec(vec![Cell::integer(1); 64])),
        );
        assert!(heap.depletion_counter < before);
    }

    #[test]
    fn should_recycle_once_depleted() {
        let mut heap = Heap::new(10);
        assert!(!heap.should_recycle());
        heap.charge(20);
        assert!(heap.should_recycle());
    }
}
