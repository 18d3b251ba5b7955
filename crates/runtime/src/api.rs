//! The public embedding API (spec section 6 / 4.5's "Public embedding
//! API"): an [`Engine`] owning every process-wide resource, opaque
//! [`Handle`]s pinning cells against collection, and the entry points
//! a host calls to run code and move values across the boundary.
//!
//! The scanner that turns source text into cells is an external
//! collaborator (spec section 1); [`Engine::run_source`] takes one as
//! a `&dyn Scanner` rather than implementing lexing itself.

use crate::action::{ActionTable, DispatcherTable};
use crate::context::ContextTable;
use crate::level::{ExecutorKind, Level};
use crate::mold::MoldBuffer;
use crate::process::ProcessState;
use crate::stack::DataStack;
use crate::stepper::EvalContext;
use crate::trampoline::{self, Thrown};
use glyph_core::cell::{Cell, Lift, SequenceKind};
use glyph_core::heap::{Heap, StubId};
use glyph_core::symbol::SymbolTable;
use std::cell::RefCell;
use std::rc::Rc;

/// Errors the embedding API surfaces directly, as opposed to errors
/// raised from evaluated code (those are [`crate::error::EvalError`]
/// antiforms that arrive wrapped in a [`Thrown`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnboxTypeMismatch,
    Thrown(String),
    ShutdownWithLiveHandles(usize),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnboxTypeMismatch => write!(f, "value does not hold the requested type"),
            EngineError::Thrown(msg) => write!(f, "uncaught throw: {msg}"),
            EngineError::ShutdownWithLiveHandles(n) => write!(f, "{n} handle(s) still live at shutdown"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<Thrown> for EngineError {
    fn from(t: Thrown) -> Self {
        EngineError::Thrown(format!("{:?}", t.value.kind()))
    }
}

/// A caller-supplied producer of cells from source text (spec section
/// 1's scanner, an out-of-scope collaborator here).
pub trait Scanner {
    fn scan(&self, text: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> StubId;
}

#[derive(Default)]
struct HandleTableInner {
    live: std::collections::HashMap<u32, Cell>,
    next: u32,
}

/// The root set backing every outstanding [`Handle`]. Lives on
/// [`Engine`] behind an `Rc<RefCell<_>>` so a `Handle` can release
/// itself from `Drop` without borrowing the engine, and so
/// [`Engine::collect`] can read every live handle's cell as a GC root
/// without walking `Handle` instances it doesn't own.
#[derive(Default, Clone)]
pub struct HandleTable {
    inner: Rc<RefCell<HandleTableInner>>,
}

impl HandleTable {
    fn new() -> Self {
        HandleTable::default()
    }

    fn allocate(&self, cell: Cell) -> u32 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next;
        inner.next += 1;
        inner.live.insert(id, cell);
        id
    }

    fn release(&self, id: u32) {
        self.inner.borrow_mut().live.remove(&id);
    }

    pub fn live_count(&self) -> usize {
        self.inner.borrow().live.len()
    }

    /// The stubs referenced by every live handle's cell, for use as GC
    /// roots.
    pub fn root_stub_ids(&self) -> Vec<StubId> {
        self.inner.borrow().live.values().filter_map(Cell::stub_ref).collect()
    }
}

/// An opaque handle pinning a cell against collection until dropped
/// (spec 4.5/6 "allocate-handle, release-handle").
pub struct Handle {
    id: u32,
    table: HandleTable,
}

impl Handle {
    pub fn cell(&self) -> Cell {
        self.table.inner.borrow().live[&self.id]
    }

    pub fn set_cell(&mut self, cell: Cell) {
        self.table.inner.borrow_mut().live.insert(self.id, cell);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}

/// Owns every process-wide resource: the managed heap, symbol table,
/// context/action/dispatcher registries, data stack, mold buffer, and
/// the root/library contexts built at startup (spec section 6,
/// "Process state persistence").
pub struct Engine {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub contexts: ContextTable,
    pub actions: ActionTable,
    pub dispatchers: DispatcherTable,
    pub data_stack: DataStack,
    pub mold: MoldBuffer,
    pub process: ProcessState,
    handles: HandleTable,
}

impl Engine {
    /// Initialize a fresh process: empty heap, registries, and the
    /// root/library contexts (spec 6 "process init"). Ownership is an
    /// instance field here rather than a global `static`, so
    /// constructing a second `Engine` after one has been shut down
    /// needs no special re-initialization path.
    pub fn new() -> Self {
        Engine::with_depletion_threshold(64 * 1024 * 1024)
    }

    /// Same as [`Engine::new`] but with a caller-chosen GC depletion
    /// threshold, e.g. from `glyph.toml` (spec 2 "configuration").
    pub fn with_depletion_threshold(depletion_threshold: i64) -> Self {
        let mut heap = Heap::new(depletion_threshold);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let process = ProcessState::init(&mut heap, &mut contexts, &mut symbols);
        tracing::debug!(depletion_threshold, "process init");
        Engine {
            heap,
            symbols,
            contexts,
            actions: ActionTable::new(),
            dispatchers: DispatcherTable::new(),
            data_stack: DataStack::new(),
            mold: MoldBuffer::new(),
            process,
            handles: HandleTable::new(),
        }
    }

    fn eval_context(&mut self) -> EvalContext<'_> {
        EvalContext {
            heap: &mut self.heap,
            symbols: &mut self.symbols,
            contexts: &mut self.contexts,
            actions: &self.actions,
            dispatchers: &self.dispatchers,
        }
    }

    /// Run every expression in `array` to completion (spec 6
    /// "run-source (feed ... or an array)"). Uses the same last-result,
    /// ghost-non-displacement fold as a `(...)` group (spec 4.6) rather
    /// than the single-expression `Stepper` executor, since a top-level
    /// program is itself a sequence of expressions, not one.
    pub fn run_array(&mut self, array: StubId) -> Result<Cell, Thrown> {
        let level = Level::new(
            crate::feed::Feed::from_array(array),
            ExecutorKind::GroupEval,
            self.data_stack.baseline(),
        );
        let mut ctx = EvalContext {
            heap: &mut self.heap,
            symbols: &mut self.symbols,
            contexts: &mut self.contexts,
            actions: &self.actions,
            dispatchers: &self.dispatchers,
        };
        trampoline::run(level, &mut ctx, &mut self.data_stack)
    }

    /// Run every expression pulled from `feed` to completion.
    pub fn run_feed(&mut self, feed: crate::feed::Feed) -> Result<Cell, Thrown> {
        let level = Level::new(feed, ExecutorKind::GroupEval, self.data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut self.heap,
            symbols: &mut self.symbols,
            contexts: &mut self.contexts,
            actions: &self.actions,
            dispatchers: &self.dispatchers,
        };
        trampoline::run(level, &mut ctx, &mut self.data_stack)
    }

    /// Scan `text` with the caller-supplied scanner, then run the
    /// resulting array (spec 6: the core itself never scans source).
    pub fn run_source(&mut self, text: &str, scanner: &dyn Scanner) -> Result<Cell, Thrown> {
        let array = scanner.scan(text, &mut self.heap, &mut self.symbols);
        self.run_array(array)
    }

    // -- embedding handles -------------------------------------------------

    pub fn allocate_handle(&mut self, cell: Cell) -> Handle {
        Handle {
            id: self.handles.allocate(cell),
            table: self.handles.clone(),
        }
    }

    pub fn live_handle_count(&self) -> usize {
        self.handles.live_count()
    }

    /// Run a collection cycle, rooted at every live handle plus the
    /// process's root and library contexts (spec 4.1).
    pub fn collect(&mut self) -> glyph_core::gc::GcReport {
        let mut roots = self.handles.root_stub_ids();
        roots.push(self.process.root);
        roots.push(self.process.lib);
        glyph_core::gc::collect(&mut self.heap, &roots)
    }

    /// Tear the engine down, asserting no handle outlived it (spec 6
    /// "process state persistence" checked-build invariant).
    pub fn shutdown(self) -> Result<(), EngineError> {
        let live = self.handles.live_count();
        if live > 0 {
            return Err(EngineError::ShutdownWithLiveHandles(live));
        }
        Ok(())
    }

    // -- unboxing (spec 6 "unbox-integer/logic/decimal/bytes") -------------

    pub fn unbox_integer(&self, cell: &Cell) -> Result<i64, EngineError> {
        cell.as_integer().ok_or(EngineError::UnboxTypeMismatch)
    }

    pub fn unbox_logic(&self, cell: &Cell) -> Result<bool, EngineError> {
        cell.as_logic().ok_or(EngineError::UnboxTypeMismatch)
    }

    pub fn unbox_decimal(&self, cell: &Cell) -> Result<f64, EngineError> {
        cell.as_decimal().ok_or(EngineError::UnboxTypeMismatch)
    }

    pub fn unbox_bytes(&self, cell: &Cell) -> Result<Vec<u8>, EngineError> {
        let stub_id = cell.string_like_stub().ok_or(EngineError::UnboxTypeMismatch)?;
        let stub = self.heap.get(stub_id).ok_or(EngineError::UnboxTypeMismatch)?;
        match &stub.payload {
            glyph_core::stub::Payload::ByteBuffer(buf) => Ok(buf.as_slice().to_vec()),
            _ => Err(EngineError::UnboxTypeMismatch),
        }
    }

    // -- spread/quote/unquote/typecheck (spec 6) ---------------------------

    /// Produce a splice antiform from an array (spec 6 "spread").
    pub fn spread(&mut self, items: &[Cell]) -> Cell {
        let stub = self
            .heap
            .allocate_unmanaged(glyph_core::stub::Flavor::Array, glyph_core::stub::Payload::Array(glyph_core::series::SeriesBuf::from_vec(items.to_vec())));
        self.heap.promote_to_managed(stub);
        Cell::splice(stub)
    }

    /// Wrap an array as a `Group`/`Block` array cell so it can be
    /// spliced into evaluated code and later evaluated or re-quoted.
    pub fn wrap_array(&mut self, seq_kind: SequenceKind, items: Vec<Cell>) -> Cell {
        let stub = self
            .heap
            .allocate_unmanaged(glyph_core::stub::Flavor::Array, glyph_core::stub::Payload::Array(glyph_core::series::SeriesBuf::from_vec(items)));
        self.heap.promote_to_managed(stub);
        Cell::array(seq_kind, stub, 0)
    }

    /// Add one level of quoting (spec 6 "quote").
    pub fn quote(&self, cell: Cell) -> Cell {
        let depth = match cell.lift() {
            Lift::Quoted(n) => n.saturating_add(1),
            _ => 1,
        };
        cell.with_lift(Lift::Quoted(depth))
    }

    /// Remove one level of quoting (spec 6 "unquote"). A plain or
    /// already-unquoted value is returned unchanged.
    pub fn unquote(&self, cell: Cell) -> Cell {
        match cell.lift() {
            Lift::Quoted(0) | Lift::Quoted(1) => cell.with_lift(Lift::Plain),
            Lift::Quoted(n) => cell.with_lift(Lift::Quoted(n - 1)),
            _ => cell,
        }
    }

    /// Run an ad hoc typecheck predicate against a value (spec 6
    /// "typecheck"). Datatype-specific checks live outside this crate;
    /// this just runs whatever predicate the caller supplies.
    pub fn typecheck(&self, cell: &Cell, predicate: impl Fn(&Cell) -> bool) -> bool {
        predicate(cell)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::stub::{Flavor, Payload};

    #[test]
    fn handle_release_on_drop_frees_its_slot() {
        let mut engine = Engine::new();
        assert_eq!(engine.live_handle_count(), 0);
        let handle = engine.allocate_handle(Cell::integer(1));
        assert_eq!(engine.live_handle_count(), 1);
        drop(handle);
        assert_eq!(engine.live_handle_count(), 0);
    }

    #[test]
    fn shutdown_rejects_live_handles() {
        let mut engine = Engine::new();
        let handle = engine.allocate_handle(Cell::integer(1));
        let err = engine.shutdown().unwrap_err();
        assert!(matches!(err, EngineError::ShutdownWithLiveHandles(1)));
        drop(handle);
    }

    #[test]
    fn run_array_evaluates_a_literal_array() {
        let mut engine = Engine::new();
        let stub = engine.heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(5)])));
        let result = engine.run_array(stub).unwrap();
        assert_eq!(result.as_integer(), Some(5));
    }

    #[test]
    fn quote_then_unquote_round_trips() {
        let engine = Engine::new();
        let cell = Cell::integer(3);
        let quoted = engine.quote(cell);
        assert_eq!(quoted.lift(), Lift::Quoted(1));
        let back = engine.unquote(quoted);
        assert_eq!(back.lift(), Lift::Plain);
    }

    #[test]
    fn unbox_integer_rejects_wrong_kind() {
        let engine = Engine::new();
        assert_eq!(engine.unbox_integer(&Cell::logic(true)), Err(EngineError::UnboxTypeMismatch));
    }

    #[test]
    fn spread_produces_a_splice_antiform() {
        let mut engine = Engine::new();
        let spread = engine.spread(&[Cell::integer(1), Cell::integer(2)]);
        assert!(spread.is_splice());
    }

    #[test]
    fn collect_reclaims_unrooted_and_spares_handle_rooted() {
        let mut engine = Engine::new();

        let garbage = engine.heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        engine.heap.promote_to_managed(garbage);

        let kept = engine.heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        engine.heap.promote_to_managed(kept);
        let handle = engine.allocate_handle(Cell::array(glyph_core::cell::SequenceKind::Block, kept, 0));

        let report = engine.collect();
        assert!(report.reclaimed >= 1);
        assert!(engine.heap.get(garbage).is_none());
        assert!(engine.heap.get(kept).is_some());

        drop(handle);
    }
}
