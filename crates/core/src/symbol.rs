//! Symbol interning.
//!
//! A [`Symbol`] is an immutable UTF-8 byte-string with stable identity:
//! two symbols interned from equal bytes always resolve to the same
//! `SymbolId`, so equality reduces to comparing two small integers
//! instead of comparing bytes. Symbols are never freed once interned —
//! the [`SymbolTable`] is append-only for the lifetime of the `Engine`
//! that owns it.

use std::collections::HashMap;
use std::sync::Arc;

/// Flags carried alongside an interned symbol's bytes.
///
/// Some symbols are forbidden inside certain sequence kinds (for
/// example a symbol containing `/` cannot appear as an atom of a
/// slashed path sequence). These flags are computed once at intern
/// time so `sequence::build_sequence` can check them without
/// re-scanning bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolFlags {
    pub forbidden_in_dotted: bool,
    pub forbidden_in_slashed: bool,
    pub forbidden_in_chained: bool,
}

impl SymbolFlags {
    fn compute(bytes: &str) -> Self {
        SymbolFlags {
            forbidden_in_dotted: bytes.contains(':') || bytes.contains('/'),
            forbidden_in_slashed: bytes.contains('/'),
            forbidden_in_chained: bytes.contains(':'),
        }
    }
}

#[derive(Debug)]
struct Interned {
    text: Arc<str>,
    flags: SymbolFlags,
}

/// Stable identity for an interned symbol.
///
/// `SymbolId` is `Copy` and cheap to carry inside a [`crate::Cell`]'s
/// payload; it indexes into the [`SymbolTable`] that produced it and is
/// only meaningful relative to that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// A resolved symbol: its id, text, and sequence-legality flags.
#[derive(Debug, Clone, Copy)]
pub struct Symbol<'a> {
    pub id: SymbolId,
    pub text: &'a str,
    pub flags: SymbolFlags,
}

/// Deduplicating interner. One `SymbolTable` is owned per `Engine`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_text: HashMap<Arc<str>, SymbolId>,
    entries: Vec<Interned>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Intern `text`, returning its stable id. Interning the same bytes
    /// twice returns the same id.
    pub fn intern(&mut self, text: &str) -> SymbolId {
        if let Some(&id) = self.by_text.get(text) {
            return id;
        }
        let id = SymbolId(self.entries.len() as u32);
        let arc: Arc<str> = Arc::from(text);
        let flags = SymbolFlags::compute(text);
        self.by_text.insert(arc.clone(), id);
        self.entries.push(Interned { text: arc, flags });
        tracing::trace!(symbol = text, id = id.0, "interned symbol");
        id
    }

    pub fn resolve(&self, id: SymbolId) -> Symbol<'_> {
        let entry = &self.entries[id.0 as usize];
        Symbol {
            id,
            text: &entry.text,
            flags: entry.flags,
        }
    }

    pub fn text(&self, id: SymbolId) -> &str {
        &self.entries[id.0 as usize].text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
