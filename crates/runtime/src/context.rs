//! Context & frame objects: keyed variable storage.
//!
//! A context is a pair of parallel series sharing an index space — a
//! `varlist` of cells and a `keylist` of interned symbols — plus an
//! optional inheritance back-reference. `varlist[0]` is the archetype
//! cell identifying the context itself (spec section 3, "Context").
//!
//! [`glyph_core::Heap`] only knows about bare varlist/keylist stubs; the
//! pairing between a varlist and its keylist, and the inheritance chain,
//! is tracked here in a side table rather than inside the cell, so the
//! memory subsystem stays ignorant of binding policy.

use glyph_core::cell::{Cell, ContextKind};
use glyph_core::heap::{Heap, StubId};
use glyph_core::stub::{Flavor, Payload};
use glyph_core::symbol::SymbolId;
use std::collections::HashMap;

/// Side-table metadata for one context's varlist.
#[derive(Debug, Clone)]
struct ContextMeta {
    keylist: StubId,
    kind: ContextKind,
    inherit: Option<StubId>,
}

/// Registry pairing varlist stubs with their keylists and inheritance
/// chain. One instance lives on [`crate::api::Engine`].
#[derive(Debug, Default)]
pub struct ContextTable {
    meta: HashMap<StubId, ContextMeta>,
}

/// Why a context lookup or build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    KeyNotFound,
    LengthMismatch,
    NotAContext,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::KeyNotFound => write!(f, "key not found in context"),
            ContextError::LengthMismatch => write!(f, "keylist and varlist length differ"),
            ContextError::NotAContext => write!(f, "cell does not reference a context"),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextTable {
    pub fn new() -> Self {
        ContextTable::default()
    }

    /// Build a new context from `(symbol, value)` pairs, returning the
    /// archetype [`Cell`] that names it. `varlist[0]` holds the
    /// archetype itself, mirroring spec section 3.
    pub fn build(
        &mut self,
        heap: &mut Heap,
        kind: ContextKind,
        inherit: Option<StubId>,
        fields: &[(SymbolId, Cell)],
    ) -> Cell {
        let keylist_id = heap.allocate_unmanaged(
            Flavor::Keylist,
            Payload::Keylist(fields.iter().map(|(s, _)| *s).collect()),
        );
        heap.promote_to_managed(keylist_id);

        // Reserve slot 0 for the archetype; filled in once varlist_id is known.
        let mut cells = vec![Cell::erased()];
        cells.extend(fields.iter().map(|(_, v)| *v));
        let varlist_id = heap.allocate_unmanaged(
            Flavor::Varlist,
            Payload::Varlist(glyph_core::series::SeriesBuf::from_vec(cells)),
        );
        heap.promote_to_managed(varlist_id);

        let archetype = Cell::context(kind, varlist_id);
        if let Some(varlist) = heap.get_mut(varlist_id).and_then(|s| s.as_varlist_mut()) {
            if let Some(slot0) = varlist.get_mut(0) {
                *slot0 = archetype;
            }
        }

        self.meta.insert(
            varlist_id,
            ContextMeta {
                keylist: keylist_id,
                kind,
                inherit,
            },
        );
        archetype
    }

    pub fn keylist_of(&self, varlist: StubId) -> Option<StubId> {
        self.meta.get(&varlist).map(|m| m.keylist)
    }

    pub fn inherit_of(&self, varlist: StubId) -> Option<StubId> {
        self.meta.get(&varlist).and_then(|m| m.inherit)
    }

    pub fn kind_of(&self, varlist: StubId) -> Option<ContextKind> {
        self.meta.get(&varlist).map(|m| m.kind)
    }

    /// Look up `symbol` starting at `varlist`, consulting the
    /// inheritance chain if it's not found locally. Returns the varlist
    /// it was actually found in together with its index there, since an
    /// inherited field lives in the ancestor's varlist, not the child's.
    pub fn index_of(&self, heap: &Heap, varlist: StubId, symbol: SymbolId) -> Option<(StubId, u32)> {
        let mut current = Some(varlist);
        while let Some(v) = current {
            let meta = self.meta.get(&v)?;
            let keys = heap.get(meta.keylist)?.as_keylist()?;
            if let Some(pos) = keys.iter().position(|&s| s == symbol) {
                // +1: varlist index 0 is the archetype, keys start at 1.
                return Some((v, pos as u32 + 1));
            }
            current = meta.inherit;
        }
        None
    }

    /// Fetch the value cell at `index` in `varlist`.
    pub fn get(&self, heap: &Heap, varlist: StubId, index: u32) -> Result<Cell, ContextError> {
        let stub = heap.get(varlist).ok_or(ContextError::NotAContext)?;
        let cells = stub.as_varlist().ok_or(ContextError::NotAContext)?;
        cells.get(index as usize).copied().ok_or(ContextError::KeyNotFound)
    }

    /// Overwrite the value cell at `index` in `varlist`.
    pub fn set(
        &self,
        heap: &mut Heap,
        varlist: StubId,
        index: u32,
        value: Cell,
    ) -> Result<(), ContextError> {
        let stub = heap.get_mut(varlist).ok_or(ContextError::NotAContext)?;
        let cells = stub.as_varlist_mut().ok_or(ContextError::NotAContext)?;
        let slot = cells.get_mut(index as usize).ok_or(ContextError::KeyNotFound)?;
        *slot = value;
        Ok(())
    }

    /// Invariant check used by checked-build tests: keylist and varlist
    /// lengths agree (spec section 8's context invariant).
    pub fn lengths_agree(&self, heap: &Heap, varlist: StubId) -> bool {
        let Some(meta) = self.meta.get(&varlist) else {
            return false;
        };
        let Some(keys) = heap.get(meta.keylist).and_then(|s| s.as_keylist()) else {
            return false;
        };
        let Some(vars) = heap.get(varlist).and_then(|s| s.as_varlist()) else {
            return false;
        };
        // varlist carries the archetype at index 0 in addition to one
        // cell per key.
        keys.len() + 1 == vars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::symbol::SymbolTable;

    #[test]
    fn build_then_lookup_round_trips() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut table = ContextTable::new();
        let x = symbols.intern("x");
        let archetype = table.build(
            &mut heap,
            ContextKind::Object,
            None,
            &[(x, Cell::integer(10))],
        );
        let varlist = archetype.context_varlist().unwrap();
        let (found_in, index) = table.index_of(&heap, varlist, x).unwrap();
        assert_eq!(table.get(&heap, found_in, index).unwrap().as_integer(), Some(10));
    }

    #[test]
    fn keylist_varlist_lengths_agree() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut table = ContextTable::new();
        let a = symbols.intern("a");
        let b = symbols.intern("b");
        let archetype = table.build(
            &mut heap,
            ContextKind::Object,
            None,
            &[(a, Cell::integer(1)), (b, Cell::integer(2))],
        );
        let varlist = archetype.context_varlist().unwrap();
        assert!(table.lengths_agree(&heap, varlist));
    }

    #[test]
    fn inheritance_chain_is_consulted_on_miss() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut table = ContextTable::new();
        let parent_sym = symbols.intern("inherited");
        let parent = table.build(
            &mut heap,
            ContextKind::Object,
            None,
            &[(parent_sym, Cell::integer(99))],
        );
        let parent_varlist = parent.context_varlist().unwrap();
        let child = table.build(&mut heap, ContextKind::Object, Some(parent_varlist), &[]);
        let child_varlist = child.context_varlist().unwrap();
        let found = table.index_of(&heap, child_varlist, parent_sym);
        assert_eq!(found, Some((parent_varlist, 1)));
    }
}
