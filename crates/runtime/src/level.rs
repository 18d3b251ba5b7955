//! Level: one unit of cooperative evaluation, and the bounce sentinel
//! its executor hands back to the trampoline.
//!
//! A level bundles a feed, a state byte, scratch cells, and an optional
//! action-dispatch sub-record — spec section 3, "Level". Executors are
//! represented as a closed enum (`ExecutorKind`) rather than a function
//! pointer: native Rust doesn't need the C family's function-pointer
//! indirection to swap behavior, a match arm in the stepper does the
//! same job with exhaustiveness checking.

use crate::binding::VirtualBinding;
use crate::feed::Feed;
use glyph_core::cell::Cell;
use glyph_core::heap::StubId;
use glyph_core::symbol::SymbolId;

/// The state machine driving a level's evaluation, per spec 4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    InitialEntry,
    Lookahead,
    FulfillArg,
    RunningAction,
    Reevaluating,
    Done,
}

/// Which evaluator sub-machine this level is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// The general stepper: evaluate one expression from the feed.
    Stepper,
    /// A group `(...)`: evaluate every expression in the nested feed,
    /// keeping only the last result.
    GroupEval,
    /// An action is being dispatched; `dispatcher` names which native
    /// in the registry runs it.
    ActionDispatch { dispatcher: u32 },
}

/// Progress through argument gathering for an in-flight action call.
#[derive(Debug, Clone, Default)]
pub struct ActionDispatchState {
    pub label: Option<SymbolId>,
    pub param_index: usize,
    pub args: Vec<Cell>,
    /// The action's paramlist varlist, once dispatch has begun.
    pub paramlist: Option<StubId>,
    /// Set when the in-progress argument's own evaluation suspended
    /// (it needed a pushed sublevel); `level.output` holds its result
    /// on the next resume, so the param-fulfillment loop picks it up
    /// instead of re-pulling a cell from the feed.
    pub pending_arg: bool,
}

bitflags::bitflags! {
    /// Per-level flags, spec section 3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LevelFlags: u8 {
        const THROWING            = 0b0000_0001;
        const FULFILLING_ARG      = 0b0000_0010;
        const KEEPALIVE           = 0b0000_0100;
        const DISPATCHER_CATCHING = 0b0000_1000;
        /// A set-word's RHS suspended before producing its final value;
        /// `level.scratch` holds the set-word cell to assign once
        /// `finish_step` sees the real result.
        const PENDING_SET_WORD    = 0b0001_0000;
    }
}

/// One frame of the cooperative evaluation stack.
pub struct Level {
    pub feed: Feed,
    pub executor: ExecutorKind,
    pub state: StepState,
    pub output: Cell,
    pub spare: Cell,
    pub scratch: Cell,
    pub dispatch: ActionDispatchState,
    pub flags: LevelFlags,
    pub overlay: Option<VirtualBinding>,
    /// The data-stack base recorded at push time (spec 4.9): this level
    /// must restore the stack to this depth before returning.
    pub stack_base: usize,
}

impl Level {
    pub fn new(feed: Feed, executor: ExecutorKind, stack_base: usize) -> Self {
        Level {
            feed,
            executor,
            state: StepState::InitialEntry,
            output: Cell::erased(),
            spare: Cell::erased(),
            scratch: Cell::erased(),
            dispatch: ActionDispatchState::default(),
            flags: LevelFlags::empty(),
            overlay: None,
            stack_base,
        }
    }

    pub fn is_throwing(&self) -> bool {
        self.flags.contains(LevelFlags::THROWING)
    }

    pub fn set_throwing(&mut self, value: bool) {
        if value {
            self.flags.insert(LevelFlags::THROWING);
        } else {
            self.flags.remove(LevelFlags::THROWING);
        }
    }
}

/// What a level's executor asks the trampoline to do next, spec 4.7.
pub enum Bounce {
    /// This level finished with a value in `output`.
    Out,
    /// A sublevel was pushed; resume the loop with it on top.
    ContinueSublevel(Box<Level>),
    /// Like `ContinueSublevel`, but the sublevel's eventual result
    /// becomes this level's own result and this level is also dropped.
    Delegate(Box<Level>),
    /// This level rewrote its own executor; re-enter without popping.
    Downshifted,
    /// A throw is propagating; `label` identifies it (spec 4.6 return/
    /// break/continue, spec 4.8 errors).
    Thrown { label: Option<SymbolId>, value: Cell },
    /// Re-dispatch the current level without re-fulfilling arguments.
    RedoUnchecked,
}
