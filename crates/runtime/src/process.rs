//! Process state: the well-known symbols and root contexts every
//! [`crate::api::Engine`] starts with (spec section 6, "process state
//! persistence").
//!
//! The root context is where top-level words resolve by default; the
//! library context is where natives the engine registers for itself
//! (not user code) live, kept separate so user assignments at the top
//! level can never shadow a native out from under internal callers.

use crate::context::ContextTable;
use glyph_core::cell::ContextKind;
use glyph_core::heap::{Heap, StubId};
use glyph_core::symbol::SymbolId;
use glyph_core::symbol::SymbolTable;

/// The sentinel symbols several cell constructors need (spec 4.2's
/// antiform signals `null`/`okay` are parameterized over which symbol
/// names them).
#[derive(Debug, Clone, Copy)]
pub struct WellKnownSymbols {
    pub null: SymbolId,
    pub okay: SymbolId,
}

impl WellKnownSymbols {
    pub fn intern(symbols: &mut SymbolTable) -> Self {
        WellKnownSymbols {
            null: symbols.intern("null"),
            okay: symbols.intern("okay"),
        }
    }
}

/// The two process-lifetime contexts every engine starts with.
pub struct ProcessState {
    pub well_known: WellKnownSymbols,
    pub root: StubId,
    pub lib: StubId,
}

impl ProcessState {
    /// Build the root and library contexts, empty, ready for the
    /// embedding API to populate (spec 6 "process init").
    pub fn init(heap: &mut Heap, contexts: &mut ContextTable, symbols: &mut SymbolTable) -> Self {
        let well_known = WellKnownSymbols::intern(symbols);
        let root_archetype = contexts.build(heap, ContextKind::Module, None, &[]);
        let lib_archetype = contexts.build(heap, ContextKind::Module, None, &[]);
        ProcessState {
            well_known,
            root: root_archetype.context_varlist().expect("just built as a context"),
            lib: lib_archetype.context_varlist().expect("just built as a context"),
        }
    }
}
