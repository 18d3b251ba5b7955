//! The uniform heap-object header and its payload variants.
//!
//! Every managed compound value — arrays, byte buffers, keylists,
//! varlists, map storage, action bodies, single-variable `let` bindings,
//! bookmark caches, and module seas — is a [`Stub`]: one [`StubHeader`]
//! plus a [`Flavor`]-selected payload. The header carries the flag bits
//! the collector and the mutation primitives both need to consult.

use crate::cell::Cell;
use crate::series::SeriesBuf;
use crate::symbol::SymbolId;
use std::collections::HashMap;

/// Which payload variant a [`Stub`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Array,
    ByteBuffer,
    Keylist,
    Varlist,
    Pairlist,
    HashList,
    Details,
    Let,
    BookmarkList,
    ModuleSea,
}

/// Flag bits every stub carries regardless of flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubHeader {
    pub flavor: Flavor,
    pub managed: bool,
    pub marked: bool,
    pub frozen_shallow: bool,
    pub frozen_deep: bool,
    pub protected: bool,
    pub read_only: bool,
    pub inaccessible: bool,
}

impl StubHeader {
    pub fn new(flavor: Flavor) -> Self {
        StubHeader {
            flavor,
            managed: false,
            marked: false,
            frozen_shallow: false,
            frozen_deep: false,
            protected: false,
            read_only: false,
            inaccessible: false,
        }
    }

    /// Freeze this header. Freezing deeply implies freezing shallowly,
    /// per the spec invariant `frozen-deep implies frozen-shallow`.
    pub fn freeze(&mut self, deep: bool) {
        self.frozen_shallow = true;
        if deep {
            self.frozen_deep = true;
        }
    }

    pub fn is_mutable(&self) -> bool {
        !self.frozen_shallow && !self.protected && !self.read_only && !self.inaccessible
    }
}

/// A single `let`-bound variable: one symbol, one cell, and an optional
/// link to the next `let` in a chain (virtual-binding overlays walk this).
#[derive(Debug, Clone)]
pub struct LetBinding {
    pub symbol: SymbolId,
    pub value: Cell,
    pub next: Option<crate::heap::StubId>,
}

/// An action's body: the paramlist it was built from, a dispatcher
/// identifier the runtime resolves through its own native-function
/// registry, and an optional specialization (partially-filled) varlist.
#[derive(Debug, Clone)]
pub struct DetailsBody {
    pub paramlist: crate::heap::StubId,
    pub dispatcher: u32,
    pub specialization: Option<crate::heap::StubId>,
}

/// Cheap hash of a hashable [`Cell`], used as the key inside a map's
/// [`Flavor::HashList`] index stub. Computed by `glyph-runtime`'s map
/// helpers; kept here as plain data so the heap need not depend on
/// runtime-level hashing policy.
pub type MapHash = u64;

/// The payload a [`Stub`] holds, selected by its header's [`Flavor`].
#[derive(Debug, Clone)]
pub enum Payload {
    Array(SeriesBuf<Cell>),
    ByteBuffer(SeriesBuf<u8>),
    Keylist(Vec<SymbolId>),
    Varlist(SeriesBuf<Cell>),
    Pairlist(Vec<(Cell, Cell)>),
    HashList(HashMap<MapHash, u32>),
    Details(DetailsBody),
    Let(LetBinding),
    BookmarkList(Vec<(usize, usize)>),
    ModuleSea(HashMap<SymbolId, Cell>),
}

/// A managed or unmanaged heap object.
#[derive(Debug, Clone)]
pub struct Stub {
    pub header: StubHeader,
    pub payload: Payload,
}

impl Stub {
    pub fn new(flavor: Flavor, payload: Payload) -> Self {
        Stub {
            header: StubHeader::new(flavor),
            payload,
        }
    }

    pub fn array(items: Vec<Cell>) -> Self {
        Stub::new(Flavor::Array, Payload::Array(SeriesBuf::from_vec(items)))
    }

    pub fn byte_buffer(bytes: Vec<u8>) -> Self {
        Stub::new(
            Flavor::ByteBuffer,
            Payload::ByteBuffer(SeriesBuf::from_vec(bytes)),
        )
    }

    pub fn keylist(symbols: Vec<SymbolId>) -> Self {
        Stub::new(Flavor::Keylist, Payload::Keylist(symbols))
    }

    pub fn varlist(cells: Vec<Cell>) -> Self {
        Stub::new(
            Flavor::Varlist,
            Payload::Varlist(SeriesBuf::from_vec(cells)),
        )
    }

    pub fn as_array(&self) -> Option<&SeriesBuf<Cell>> {
        match &self.payload {
            Payload::Array(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut SeriesBuf<Cell>> {
        match &mut self.payload {
            Payload::Array(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_byte_buffer(&self) -> Option<&SeriesBuf<u8>> {
        match &self.payload {
            Payload::ByteBuffer(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_varlist(&self) -> Option<&SeriesBuf<Cell>> {
        match &self.payload {
            Payload::Varlist(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_varlist_mut(&mut self) -> Option<&mut SeriesBuf<Cell>> {
        match &mut self.payload {
            Payload::Varlist(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keylist(&self) -> Option<&[SymbolId]> {
        match &self.payload {
            Payload::Keylist(k) => Some(k),
            _ => None,
        }
    }

    /// References to other stubs this payload holds, for the collector's
    /// transitive mark pass. Keylists, byte buffers, hash lists and `let`
    /// chains only ever reference stubs through the slots enumerated here.
    pub fn child_stub_ids(&self) -> Vec<crate::heap::StubId> {
        match &self.payload {
            Payload::Array(cells) => cells.as_slice().iter().filter_map(|c| c.stub_ref()).collect(),
            Payload::Varlist(cells) => cells.as_slice().iter().filter_map(|c| c.stub_ref()).collect(),
            Payload::Pairlist(entries) => entries
                .iter()
                .flat_map(|(k, v)| [k.stub_ref(), v.stub_ref()])
                .flatten()
                .collect(),
            Payload::ModuleSea(map) => map.values().filter_map(|c| c.stub_ref()).collect(),
            Payload::Details(body) => {
                let mut refs = vec![body.paramlist];
                if let Some(spec) = body.specialization {
                    refs.push(spec);
                }
                refs
            }
            Payload::Let(binding) => {
                let mut refs: Vec<_> = binding.value.stub_ref().into_iter().collect();
                if let Some(next) = binding.next {
                    refs.push(next);
                }
                refs
            }
            Payload::ByteBuffer(_) | Payload::Keylist(_) | Payload::HashList(_) | Payload::BookmarkList(_) => {
                Vec::new()
            }
        }
    }
}
