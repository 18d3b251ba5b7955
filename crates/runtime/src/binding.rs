//! Binding resolution: mapping a word-cell to the variable slot it
//! names.
//!
//! Resolution walks the cell's own [`glyph_core::cell::Binding`] (a
//! `let` stub, a context slot, or unbound), then consults any virtual
//! binding overlay attached to the currently running level before
//! falling back to the word's own binding — spec section 4.4.
//!
//! The binder utility pre-indexes a keylist into a scratch map for bulk
//! binding. It is scoped with a `thread_local!` the same way the
//! teacher's error module scopes its last-error string: a single slot
//! reused across calls, with a guard whose `Drop` asserts it left the
//! map empty, so a bug that forgets to unbind is caught immediately
//! rather than corrupting the next caller's bind pass.

use crate::context::ContextTable;
use glyph_core::cell::{Binding, Cell};
use glyph_core::heap::{Heap, StubId};
use glyph_core::stub::Payload;
use glyph_core::symbol::SymbolId;
use std::cell::RefCell;
use std::collections::HashMap;

/// Why a word failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    Unbound,
    DanglingTarget,
}

impl std::fmt::Display for BindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingError::Unbound => write!(f, "word has no binding"),
            BindingError::DanglingTarget => write!(f, "binding target no longer exists"),
        }
    }
}

impl std::error::Error for BindingError {}

/// An overlay chain attached to a running level, consulted before a
/// word's own binding (spec 4.4, "virtual binding overlays").
#[derive(Debug, Clone, Default)]
pub struct VirtualBinding {
    overlays: Vec<StubId>,
}

impl VirtualBinding {
    pub fn new() -> Self {
        VirtualBinding::default()
    }

    pub fn push(&mut self, varlist: StubId) {
        self.overlays.push(varlist);
    }

    fn resolve(&self, heap: &Heap, contexts: &ContextTable, symbol: SymbolId) -> Option<(StubId, u32)> {
        self.overlays
            .iter()
            .rev()
            .find_map(|&v| contexts.index_of(heap, v, symbol))
    }
}

/// Resolve `word`'s binding to a concrete slot, reading through an
/// optional virtual overlay first.
pub fn resolve(
    word: &Cell,
    heap: &Heap,
    contexts: &ContextTable,
    overlay: Option<&VirtualBinding>,
) -> Result<(StubId, u32), BindingError> {
    let symbol = word.as_word_symbol().ok_or(BindingError::Unbound)?;

    if let Some(overlay) = overlay {
        if let Some(found) = overlay.resolve(heap, contexts, symbol) {
            return Ok(found);
        }
    }

    match word.binding() {
        Some(Binding::Context { stub, index }) => {
            if heap.get(stub).is_some() {
                Ok((stub, index))
            } else {
                Err(BindingError::DanglingTarget)
            }
        }
        Some(Binding::Let(stub)) => {
            let mut current = Some(stub);
            while let Some(id) = current {
                let Some(s) = heap.get(id) else {
                    return Err(BindingError::DanglingTarget);
                };
                match &s.payload {
                    Payload::Let(binding) if binding.symbol == symbol => return Ok((id, 0)),
                    Payload::Let(binding) => current = binding.next,
                    _ => return Err(BindingError::DanglingTarget),
                }
            }
            Err(BindingError::Unbound)
        }
        Some(Binding::Unbound) | None => Err(BindingError::Unbound),
    }
}

/// Fetch the value a resolved word names.
pub fn get_value(
    word: &Cell,
    heap: &Heap,
    contexts: &ContextTable,
    overlay: Option<&VirtualBinding>,
) -> Result<Cell, BindingError> {
    let (stub, index) = resolve(word, heap, contexts, overlay)?;
    match &heap.get(stub).ok_or(BindingError::DanglingTarget)?.payload {
        Payload::Let(binding) => Ok(binding.value),
        Payload::Varlist(_) => contexts
            .get(heap, stub, index)
            .map_err(|_| BindingError::DanglingTarget),
        _ => Err(BindingError::DanglingTarget),
    }
}

/// Overwrite the value a resolved word names (set-word evaluation).
pub fn set_value(
    word: &Cell,
    value: Cell,
    heap: &mut Heap,
    contexts: &ContextTable,
    overlay: Option<&VirtualBinding>,
) -> Result<(), BindingError> {
    let (stub, index) = resolve(word, heap, contexts, overlay)?;
    match &mut heap.get_mut(stub).ok_or(BindingError::DanglingTarget)?.payload {
        Payload::Let(binding) => {
            binding.value = value;
            Ok(())
        }
        Payload::Varlist(_) => contexts
            .set(heap, stub, index, value)
            .map_err(|_| BindingError::DanglingTarget),
        _ => Err(BindingError::DanglingTarget),
    }
}

thread_local! {
    static BINDER_SCRATCH: RefCell<HashMap<SymbolId, u32>> = RefCell::new(HashMap::new());
}

/// RAII handle over the process-wide binder scratch map. Bulk-bind
/// passes acquire one, populate it from a keylist, use it for O(1)
/// lookups, then drop it. [`BinderGuard::acquire`] asserts the map is
/// already empty before repopulating it — if a prior guard leaked
/// (panicked mid-use without unwinding through `Drop`, or was leaked
/// via `mem::forget`), the *next* acquire is what catches it, since the
/// scratch map is reused rather than freshly allocated per call.
pub struct BinderGuard {
    _private: (),
}

impl BinderGuard {
    /// Acquire the scratch map and index `keylist` into it: symbol ->
    /// position. Panics if another `BinderGuard` is already live on
    /// this thread (binder is not reentrant, per spec 4.4).
    pub fn acquire(keylist: &[SymbolId]) -> Self {
        BINDER_SCRATCH.with(|scratch| {
            let mut map = scratch.borrow_mut();
            assert!(map.is_empty(), "binder scratch map is not reentrant");
            for (i, sym) in keylist.iter().enumerate() {
                map.insert(*sym, i as u32);
            }
        });
        BinderGuard { _private: () }
    }

    pub fn lookup(&self, symbol: SymbolId) -> Option<u32> {
        BINDER_SCRATCH.with(|scratch| scratch.borrow().get(&symbol).copied())
    }

    pub fn release(self) {
        // Drop clears the scratch map.
    }
}

impl Drop for BinderGuard {
    fn drop(&mut self) {
        BINDER_SCRATCH.with(|scratch| scratch.borrow_mut().clear());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::cell::{Lift, WordForm};
    use glyph_core::symbol::SymbolTable;

    #[test]
    fn unbound_word_fails_to_resolve() {
        let mut symbols = SymbolTable::new();
        let heap = Heap::new(1 << 16);
        let contexts = ContextTable::new();
        let sym = symbols.intern("x");
        let word = Cell::word(WordForm::Plain, sym, Lift::Plain);
        assert_eq!(resolve(&word, &heap, &contexts, None), Err(BindingError::Unbound));
    }

    #[test]
    fn context_bound_word_resolves_to_value() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let sym = symbols.intern("x");
        let archetype = contexts.build(
            &mut heap,
            glyph_core::cell::ContextKind::Object,
            None,
            &[(sym, Cell::integer(5))],
        );
        let varlist = archetype.context_varlist().unwrap();
        let (_, index) = contexts.index_of(&heap, varlist, sym).unwrap();
        let mut word = Cell::word(WordForm::Plain, sym, Lift::Plain);
        word.set_binding(Binding::Context { stub: varlist, index });
        assert_eq!(get_value(&word, &heap, &contexts, None).unwrap().as_integer(), Some(5));
    }

    #[test]
    fn binder_guard_balances_on_release() {
        let mut symbols = SymbolTable::new();
        let a = symbols.intern("a");
        let guard = BinderGuard::acquire(&[a]);
        assert_eq!(guard.lookup(a), Some(0));
        guard.release();
        // A second acquire must succeed; if the prior guard hadn't
        // balanced this would panic.
        let guard2 = BinderGuard::acquire(&[a]);
        guard2.release();
    }

    #[test]
    fn set_value_overwrites_context_slot() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let sym = symbols.intern("x");
        let archetype = contexts.build(
            &mut heap,
            glyph_core::cell::ContextKind::Object,
            None,
            &[(sym, Cell::integer(1))],
        );
        let varlist = archetype.context_varlist().unwrap();
        let (_, index) = contexts.index_of(&heap, varlist, sym).unwrap();
        let mut word = Cell::word(WordForm::Plain, sym, Lift::Plain);
        word.set_binding(Binding::Context { stub: varlist, index });
        set_value(&word, Cell::integer(42), &mut heap, &contexts, None).unwrap();
        assert_eq!(get_value(&word, &heap, &contexts, None).unwrap().as_integer(), Some(42));
    }
}
