//! Actions: function objects, paramlists, frames, and dispatch.
//!
//! An action pairs a *paramlist* (the immutable, keyed description of
//! its arguments) with a *dispatcher* — native Rust code registered in
//! the [`DispatcherTable`] and looked up by id at call time, the same
//! way [`crate::context::ContextTable`] keeps a side table over bare
//! varlist stubs rather than folding dispatch policy into the cell
//! representation itself (spec section 3 "Action", section 4.5).

use crate::context::ContextTable;
use glyph_core::cell::Cell;
use glyph_core::heap::{Heap, StubId};
use glyph_core::symbol::SymbolId;
use std::collections::HashMap;

/// The evaluation treatment a paramlist entry asks for, spec 4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Evaluate the next expression normally.
    Normal,
    /// Evaluate normally, but lift the result to its meta form.
    Meta,
    /// Take the next cell literally, with no evaluation.
    Just,
    /// Take the next cell literally, carrying its current binding.
    The,
    /// Take the next cell literally unless it's a group, in which case
    /// evaluate the group.
    SoftEscapable,
}

bitflags::bitflags! {
    /// Per-parameter flags, spec 4.5.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        const REFINEMENT    = 0b0000_0001;
        const ENDABLE       = 0b0000_0010;
        const NULL_OK       = 0b0000_0100;
        const VARIADIC      = 0b0000_1000;
        const SKIPPABLE     = 0b0001_0000;
        const CONST_IF_UNSET = 0b0010_0000;
    }
}

/// The closed set of infix binding modes an action can register under
/// (spec 4.6 "infix lookahead"). Distinguishing tight/normal/deferred
/// precedence nuance beyond "is this action infix at all" is left to
/// future dispatcher-level cooperation — spec §9 open question (d)
/// notes this area is still under design upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixMode {
    Normal,
    Tight,
    Deferred,
}

/// One entry in a paramlist: a parameter's name, class, flags, and an
/// optional typechecker. The typechecker is a closure rather than a
/// spec-block cell — the datatype-specific checks it would run are an
/// out-of-scope collaborator here, same as the scanner.
#[derive(Clone)]
pub struct Param {
    pub symbol: SymbolId,
    pub class: ParamClass,
    pub flags: ParamFlags,
    pub typecheck: Option<std::rc::Rc<dyn Fn(&Cell) -> bool>>,
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("symbol", &self.symbol)
            .field("class", &self.class)
            .field("flags", &self.flags)
            .field("typecheck", &self.typecheck.is_some())
            .finish()
    }
}

impl Param {
    pub fn new(symbol: SymbolId, class: ParamClass, flags: ParamFlags) -> Self {
        Param {
            symbol,
            class,
            flags,
            typecheck: None,
        }
    }

    pub fn with_typecheck(mut self, check: impl Fn(&Cell) -> bool + 'static) -> Self {
        self.typecheck = Some(std::rc::Rc::new(check));
        self
    }

    pub fn is_refinement(&self) -> bool {
        self.flags.contains(ParamFlags::REFINEMENT)
    }

    pub fn is_variadic(&self) -> bool {
        self.flags.contains(ParamFlags::VARIADIC)
    }
}

/// An immutable parameter list, spec 4.5.
#[derive(Debug, Clone, Default)]
pub struct Paramlist {
    params: Vec<Param>,
}

impl Paramlist {
    pub fn new(params: Vec<Param>) -> Self {
        Paramlist { params }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn position_of(&self, symbol: SymbolId) -> Option<usize> {
        self.params.iter().position(|p| p.symbol == symbol)
    }

    /// True if `other`'s keys are a prefix-compatible derivation of
    /// this paramlist's keys in the same order — the fast-path test
    /// for hijack frame compatibility (spec 4.5 "Hijack", open
    /// question (a)). Anything beyond simple prefix derivation is
    /// resolved by the shim dispatcher path instead of guessed here.
    pub fn frame_compatible_with(&self, other: &Paramlist) -> bool {
        self.params
            .iter()
            .zip(other.params.iter())
            .all(|(a, b)| a.symbol == b.symbol && a.class == b.class)
    }
}

/// A function identity's durable state, spec 4.5's "Action": a
/// paramlist, an optional specialization frame holding pre-filled
/// argument values, and the id of the dispatcher currently installed.
/// Hijack (spec 4.5) mutates `dispatcher` in place without disturbing
/// `id`, so references taken before a hijack still observe it.
#[derive(Debug, Clone)]
pub struct Action {
    pub paramlist: Paramlist,
    pub specialization: Option<StubId>,
    pub dispatcher: DispatcherId,
    /// `Some` when this action is registered to be looked up during
    /// the stepper's infix lookahead rather than only prefix-style
    /// (spec 4.6).
    pub infix: Option<InfixMode>,
}

/// A native dispatcher's identity in the [`DispatcherTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(pub u32);

/// What a dispatcher hands back once argument fulfillment is complete,
/// spec 4.5 "Dispatch".
pub enum DispatchResult {
    /// Return a value synchronously.
    Value(Cell),
    /// Delegate to another action entirely (bounce-redo).
    Redo(ActionRef),
    /// A definitional error; the trampoline converts this into an
    /// unwind (spec 4.8).
    Raise(Cell),
}

/// A dispatcher callback: takes the fulfilled argument cells in
/// paramlist order and produces a result. Native dispatchers that need
/// sub-evaluation push a sublevel from the stepper instead of calling
/// back into the evaluator directly, keeping this table free of a
/// dependency on `Level`.
pub type DispatcherFn = dyn Fn(&[Cell]) -> DispatchResult;

/// Registry of native dispatcher callbacks, keyed by [`DispatcherId`].
/// One instance lives on [`crate::api::Engine`], mirroring
/// [`ContextTable`]'s role as a side table the core heap knows nothing
/// about.
#[derive(Default)]
pub struct DispatcherTable {
    fns: Vec<std::rc::Rc<DispatcherFn>>,
}

impl DispatcherTable {
    pub fn new() -> Self {
        DispatcherTable::default()
    }

    pub fn register(&mut self, f: impl Fn(&[Cell]) -> DispatchResult + 'static) -> DispatcherId {
        let id = DispatcherId(self.fns.len() as u32);
        self.fns.push(std::rc::Rc::new(f));
        id
    }

    /// Swap the dispatcher installed at `id` in place (spec 4.5
    /// "Hijack" fast path: same identity, new behavior).
    pub fn hijack(&mut self, id: DispatcherId, f: impl Fn(&[Cell]) -> DispatchResult + 'static) {
        self.fns[id.0 as usize] = std::rc::Rc::new(f);
    }

    pub fn call(&self, id: DispatcherId, args: &[Cell]) -> DispatchResult {
        (self.fns[id.0 as usize])(args)
    }
}

impl std::fmt::Debug for DispatcherTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherTable")
            .field("len", &self.fns.len())
            .finish()
    }
}

/// A registered action's identity, keyed opaquely like
/// [`glyph_core::heap::StubId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionRef(pub u32);

/// The [`Cell::handle`] type tag marking a handle as an action
/// reference, distinguishing it from other opaque handle kinds a
/// future extension might register.
pub const ACTION_HANDLE_TAG: u32 = 1;

impl ActionRef {
    /// The value a bound action word evaluates to: an opaque handle
    /// carrying this action's identity (spec 4.5, actions are values
    /// like any other).
    pub fn to_cell(self) -> Cell {
        Cell::handle(self.0 as u64, ACTION_HANDLE_TAG)
    }

    pub fn from_cell(cell: &Cell) -> Option<ActionRef> {
        match (cell.kind(), cell.handle_type_tag()) {
            (glyph_core::cell::Kind::Handle, Some(ACTION_HANDLE_TAG)) => {
                cell.handle_opaque().map(|v| ActionRef(v as u32))
            }
            _ => None,
        }
    }
}

/// Registry of [`Action`]s by [`ActionRef`]. Generic-method dispatch
/// (spec 4.5 "a generic-method table keyed by first-argument datatype")
/// is layered on top by callers that register one action per
/// `(generic, datatype)` pair and look the pair up before dispatch;
/// this table only owns identity and hijack, not that policy.
#[derive(Debug, Default)]
pub struct ActionTable {
    actions: HashMap<u32, Action>,
    next_id: u32,
}

impl ActionTable {
    pub fn new() -> Self {
        ActionTable::default()
    }

    pub fn define(&mut self, paramlist: Paramlist, dispatcher: DispatcherId) -> ActionRef {
        let id = self.next_id;
        self.next_id += 1;
        self.actions.insert(
            id,
            Action {
                paramlist,
                specialization: None,
                dispatcher,
                infix: None,
            },
        );
        ActionRef(id)
    }

    /// Like [`Self::define`], but registers the action for infix
    /// lookahead (spec 4.6). Rejected if the first parameter is
    /// variadic: the stepper's infix lookahead has already consumed
    /// exactly one left-hand value by the time dispatch begins, which
    /// has no sensible reading as "the start of a variadic run" (spec
    /// §9 open question (d)).
    pub fn define_infix(&mut self, paramlist: Paramlist, dispatcher: DispatcherId, mode: InfixMode) -> Result<ActionRef, ActionError> {
        if paramlist.params().first().is_some_and(Param::is_variadic) {
            return Err(ActionError::VariadicInfixFirstParam);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.actions.insert(
            id,
            Action {
                paramlist,
                specialization: None,
                dispatcher,
                infix: Some(mode),
            },
        );
        Ok(ActionRef(id))
    }

    pub fn get(&self, action: ActionRef) -> Option<&Action> {
        self.actions.get(&action.0)
    }

    /// Replace the dispatcher of `action` in place (spec 4.5
    /// "Hijack"). `hijacker_paramlist` decides fast path vs shim: if
    /// it derives from the victim's current paramlist, the dispatcher
    /// id is swapped directly; otherwise the caller is expected to
    /// have registered a shim dispatcher in `dispatchers` that remaps
    /// by parameter name and passed that id here instead.
    pub fn hijack(&mut self, action: ActionRef, new_dispatcher: DispatcherId) -> Result<(), ActionError> {
        let entry = self.actions.get_mut(&action.0).ok_or(ActionError::NoSuchAction)?;
        entry.dispatcher = new_dispatcher;
        Ok(())
    }

    pub fn specialize(&mut self, action: ActionRef, frame: StubId) -> Result<(), ActionError> {
        let entry = self.actions.get_mut(&action.0).ok_or(ActionError::NoSuchAction)?;
        entry.specialization = Some(frame);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    NoSuchAction,
    ArityMismatch,
    TypecheckFailed,
    VariadicInfixFirstParam,
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::NoSuchAction => write!(f, "no action with that identity"),
            ActionError::ArityMismatch => write!(f, "argument count does not match paramlist"),
            ActionError::TypecheckFailed => write!(f, "argument failed its parameter typecheck"),
            ActionError::VariadicInfixFirstParam => write!(f, "an infix action's first parameter cannot be variadic"),
        }
    }
}

impl std::error::Error for ActionError {}

/// Build a frame context from already-fulfilled `args`, in paramlist
/// order, checking each non-skippable argument's typechecker (spec
/// 4.5 "Argument fulfillment ... run the typechecker"). The context's
/// varlist doubles as the action's call frame.
pub fn build_frame(
    contexts: &mut ContextTable,
    heap: &mut Heap,
    paramlist: &Paramlist,
    args: &[Cell],
) -> Result<Cell, ActionError> {
    if args.len() != paramlist.params().len() {
        return Err(ActionError::ArityMismatch);
    }
    for (param, arg) in paramlist.params().iter().zip(args.iter()) {
        if let Some(check) = &param.typecheck {
            if !check(arg) {
                return Err(ActionError::TypecheckFailed);
            }
        }
    }
    let fields: Vec<_> = paramlist
        .params()
        .iter()
        .zip(args.iter())
        .map(|(p, v)| (p.symbol, *v))
        .collect();
    Ok(contexts.build(heap, glyph_core::cell::ContextKind::Frame, None, &fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::symbol::SymbolTable;

    fn dummy_params(symbols: &mut SymbolTable, names: &[&str]) -> Paramlist {
        Paramlist::new(
            names
                .iter()
                .map(|n| Param::new(symbols.intern(n), ParamClass::Normal, ParamFlags::empty()))
                .collect(),
        )
    }

    #[test]
    fn build_frame_fulfills_positionally() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let params = dummy_params(&mut symbols, &["a", "b"]);
        let frame = build_frame(
            &mut contexts,
            &mut heap,
            &params,
            &[Cell::integer(1), Cell::integer(2)],
        )
        .unwrap();
        let varlist = frame.context_varlist().unwrap();
        let (v, idx) = contexts.index_of(&heap, varlist, params.params()[1].symbol).unwrap();
        assert_eq!(contexts.get(&heap, v, idx).unwrap().as_integer(), Some(2));
    }

    #[test]
    fn arity_mismatch_rejected() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let params = dummy_params(&mut symbols, &["a", "b"]);
        let result = build_frame(&mut contexts, &mut heap, &params, &[Cell::integer(1)]);
        assert_eq!(result.unwrap_err(), ActionError::ArityMismatch);
    }

    #[test]
    fn typecheck_failure_rejected() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let sym = symbols.intern("n");
        let params = Paramlist::new(vec![
            Param::new(sym, ParamClass::Normal, ParamFlags::empty())
                .with_typecheck(|c| c.as_integer().is_some()),
        ]);
        let result = build_frame(&mut contexts, &mut heap, &params, &[Cell::erased()]);
        assert_eq!(result.unwrap_err(), ActionError::TypecheckFailed);
    }

    #[test]
    fn dispatcher_table_hijack_swaps_behavior() {
        let mut dispatchers = DispatcherTable::new();
        let id = dispatchers.register(|_args| DispatchResult::Value(Cell::integer(1)));
        match dispatchers.call(id, &[]) {
            DispatchResult::Value(c) => assert_eq!(c.as_integer(), Some(1)),
            _ => panic!("expected value"),
        }
        dispatchers.hijack(id, |_args| DispatchResult::Value(Cell::integer(2)));
        match dispatchers.call(id, &[]) {
            DispatchResult::Value(c) => assert_eq!(c.as_integer(), Some(2)),
            _ => panic!("expected value"),
        }
    }

    #[test]
    fn action_table_hijack_preserves_identity() {
        let mut actions = ActionTable::new();
        let mut dispatchers = DispatcherTable::new();
        let params = dummy_params(&mut SymbolTable::new(), &[]);
        let d1 = dispatchers.register(|_| DispatchResult::Value(Cell::integer(1)));
        let d2 = dispatchers.register(|_| DispatchResult::Value(Cell::integer(2)));
        let action = actions.define(params, d1);
        actions.hijack(action, d2).unwrap();
        assert_eq!(actions.get(action).unwrap().dispatcher, d2);
    }

    #[test]
    fn action_ref_round_trips_through_handle_cell() {
        let action = ActionRef(7);
        let cell = action.to_cell();
        assert_eq!(ActionRef::from_cell(&cell), Some(action));
        assert_eq!(ActionRef::from_cell(&Cell::integer(7)), None);
    }

    #[test]
    fn define_infix_rejects_variadic_first_param() {
        let mut actions = ActionTable::new();
        let mut dispatchers = DispatcherTable::new();
        let mut symbols = SymbolTable::new();
        let d = dispatchers.register(|_| DispatchResult::Value(Cell::integer(0)));
        let params = Paramlist::new(vec![Param::new(symbols.intern("a"), ParamClass::Normal, ParamFlags::VARIADIC)]);
        let result = actions.define_infix(params, d, InfixMode::Normal);
        assert_eq!(result.unwrap_err(), ActionError::VariadicInfixFirstParam);
    }

    #[test]
    fn define_infix_accepts_a_two_arg_operator() {
        let mut actions = ActionTable::new();
        let mut dispatchers = DispatcherTable::new();
        let mut symbols = SymbolTable::new();
        let d = dispatchers.register(|args| DispatchResult::Value(Cell::integer(args[0].as_integer().unwrap() + args[1].as_integer().unwrap())));
        let params = dummy_params(&mut symbols, &["left", "right"]);
        let action = actions.define_infix(params, d, InfixMode::Normal).unwrap();
        assert_eq!(actions.get(action).unwrap().infix, Some(InfixMode::Normal));
    }

    #[test]
    fn frame_compatible_checks_prefix_derivation() {
        let mut symbols = SymbolTable::new();
        let victim = dummy_params(&mut symbols, &["a", "b"]);
        let compatible = dummy_params(&mut symbols, &["a", "b"]);
        let incompatible = dummy_params(&mut symbols, &["x"]);
        assert!(victim.frame_compatible_with(&compatible));
        assert!(!victim.frame_compatible_with(&incompatible));
    }
}
