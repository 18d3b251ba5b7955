//! The stepper: the state machine that drives one [`Level`] through
//! one expression (spec 4.6).
//!
//! Each call to [`step`] runs the level forward until it either has an
//! answer (`Bounce::Out`), needs a sublevel (`Bounce::ContinueSublevel`
//! / `Bounce::Delegate`), or is propagating a throw
//! (`Bounce::Thrown`). The trampoline (`crate::trampoline`) is what
//! actually loops calling this; the stepper never recurses into itself
//! directly, matching spec 4.7's "an executor suspends only at
//! explicit bounce returns".

use crate::action::{ActionRef, ActionTable, DispatchResult, DispatcherTable, ParamClass};
use crate::binding;
use crate::context::ContextTable;
use crate::error::{ErrorKind, EvalError};
use crate::level::{Bounce, ExecutorKind, Level, StepState};
use glyph_core::cell::{Cell, Kind, WordForm};
use glyph_core::heap::Heap;
use glyph_core::symbol::SymbolTable;

/// The collaborators a step needs beyond the level itself, bundled so
/// `step`'s signature stays readable (spec 4.4–4.5's binder, context
/// table, and action/dispatcher registries are all process-wide
/// resources owned by `crate::api::Engine`).
pub struct EvalContext<'a> {
    pub heap: &'a mut Heap,
    pub symbols: &'a mut SymbolTable,
    pub contexts: &'a mut ContextTable,
    pub actions: &'a ActionTable,
    pub dispatchers: &'a DispatcherTable,
}

/// Run `level` forward by one bounce. Spec 4.6: "inert-copy-through,
/// group evaluation via sublevel, word lookup/action dispatch, infix
/// lookahead, argument gathering by parameter class, comma-as-barrier,
/// ghost non-displacement, raised-error propagation".
pub fn step(level: &mut Level, ctx: &mut EvalContext) -> Bounce {
    match level.executor {
        ExecutorKind::Stepper => step_stepper(level, ctx),
        ExecutorKind::GroupEval => step_group_eval(level, ctx),
        ExecutorKind::ActionDispatch { .. } => step_action_dispatch(level, ctx),
    }
}

fn step_stepper(level: &mut Level, ctx: &mut EvalContext) -> Bounce {
    match level.state {
        StepState::InitialEntry => {
            level.state = StepState::Lookahead;
            step_stepper(level, ctx)
        }
        StepState::Lookahead => {
            let Some(cell) = level.feed.take(ctx.heap) else {
                level.output = Cell::ghost();
                level.state = StepState::Done;
                return Bounce::Out;
            };
            evaluate_one(level, ctx, cell)
        }
        StepState::Reevaluating => {
            let value = level.output;
            finish_step(level, ctx, value)
        }
        StepState::FulfillArg | StepState::RunningAction | StepState::Done => Bounce::Out,
    }
}

/// Evaluate one pulled cell (spec 4.6's expression dispatch). Commas
/// are expression barriers and stop a sequence of evaluations without
/// being values themselves; ghosts do not displace a prior result, so
/// callers fold a ghost step's output by simply not overwriting
/// `level.output` with it (handled at the trampoline/`GroupEval`
/// layer, since a single `evaluate_one` call only ever produces one
/// step's worth of `Bounce`).
fn evaluate_one(level: &mut Level, ctx: &mut EvalContext, cell: Cell) -> Bounce {
    if cell.is_comma() {
        level.output = Cell::ghost();
        level.state = StepState::Done;
        return Bounce::Out;
    }

    match cell.kind() {
        Kind::Array if cell.array_kind() == Some(glyph_core::cell::SequenceKind::Group) => {
            let stub = cell.array_stub().expect("group cell carries its array stub");
            let sub = Level::new(crate::feed::Feed::from_array(stub), ExecutorKind::GroupEval, 0);
            level.state = StepState::Reevaluating;
            Bounce::ContinueSublevel(Box::new(sub))
        }
        Kind::Word => evaluate_word(level, ctx, cell),
        _ => finish_step(level, ctx, cell),
    }
}

/// Finalize a step's result, first checking the spec 4.6 infix
/// lookahead: "peek one ahead; if the next cell is a bound word
/// resolving to an infix action, and the current output is a permitted
/// left-hand-side for that infix mode, enter argument fulfillment with
/// the output as the first argument." A ghost output is never a
/// permitted left-hand-side (there is nothing there to bind).
fn finish_step(level: &mut Level, ctx: &mut EvalContext, value: Cell) -> Bounce {
    if level.flags.contains(crate::level::LevelFlags::PENDING_SET_WORD) {
        level.flags.remove(crate::level::LevelFlags::PENDING_SET_WORD);
        let target = level.scratch;
        let overlay = level.overlay.as_ref();
        return match binding::set_value(&target, value, ctx.heap, ctx.contexts, overlay) {
            Ok(()) => {
                level.output = value;
                level.state = StepState::Done;
                Bounce::Out
            }
            Err(_) => raise(level, ctx, ErrorKind::Invalid, "set-word target is unbound"),
        };
    }

    level.output = value;
    if value.is_ghost() {
        level.state = StepState::Done;
        return Bounce::Out;
    }

    let overlay = level.overlay.as_ref();
    if let Some(peeked) = level.feed.peek(ctx.heap) {
        if peeked.kind() == Kind::Word && peeked.word_form() == Some(WordForm::Plain) {
            if let Ok(resolved) = binding::get_value(&peeked, ctx.heap, ctx.contexts, overlay) {
                if let Some(action) = ActionRef::from_cell(&resolved) {
                    if let Some(def) = ctx.actions.get(action) {
                        if def.infix.is_some() {
                            level.feed.take(ctx.heap);
                            return begin_infix_dispatch(level, ctx, action, peeked.as_word_symbol(), value);
                        }
                    }
                }
            }
        }
    }

    level.state = StepState::Done;
    Bounce::Out
}

/// Like [`begin_dispatch`], but the left-hand value is already in hand
/// (spec 4.6's infix lookahead) and seeds the first argument slot.
fn begin_infix_dispatch(level: &mut Level, ctx: &mut EvalContext, action: ActionRef, label: Option<glyph_core::symbol::SymbolId>, lhs: Cell) -> Bounce {
    let Some(def) = ctx.actions.get(action) else {
        return raise(level, ctx, ErrorKind::IllegalAction, "action identity no longer registered");
    };
    level.dispatch.label = label;
    level.dispatch.param_index = 1;
    level.dispatch.args = Vec::with_capacity(def.paramlist.params().len());
    level.dispatch.args.push(lhs);
    level.executor = ExecutorKind::ActionDispatch {
        dispatcher: action.0,
    };
    level.state = StepState::FulfillArg;
    step_action_dispatch(level, ctx)
}

fn evaluate_word(level: &mut Level, ctx: &mut EvalContext, cell: Cell) -> Bounce {
    let overlay = level.overlay.clone();
    match cell.word_form() {
        Some(WordForm::Set) => {
            let Some(next) = level.feed.take(ctx.heap) else {
                return raise(level, ctx, ErrorKind::NoArg, "set-word has nothing to assign");
            };
            match evaluate_one(level, ctx, next) {
                Bounce::Out => {
                    let value = level.output;
                    match binding::set_value(&cell, value, ctx.heap, ctx.contexts, overlay.as_ref()) {
                        Ok(()) => {
                            level.state = StepState::Done;
                            Bounce::Out
                        }
                        Err(_) => raise(level, ctx, ErrorKind::Invalid, "set-word target is unbound"),
                    }
                }
                other => {
                    // The RHS suspended (a group needing a pushed
                    // sublevel, or an action dispatch whose own argument
                    // fulfillment needed one): `level.output` isn't the
                    // final value yet, so `cell` can't be assigned here.
                    // Park it in `level.scratch`; `finish_step` is the
                    // one place this level's RHS result eventually
                    // surfaces (via `StepState::Reevaluating` or a
                    // completed dispatch), so it performs the assignment
                    // once the real value is in hand.
                    level.scratch = cell;
                    level.flags.insert(crate::level::LevelFlags::PENDING_SET_WORD);
                    other
                }
            }
        }
        Some(WordForm::Get) => match binding::get_value(&cell, ctx.heap, ctx.contexts, overlay.as_ref()) {
            Ok(value) => finish_step(level, ctx, value),
            Err(_) => raise(level, ctx, ErrorKind::Invalid, "get-word is unbound"),
        },
        Some(WordForm::Lit) => finish_step(level, ctx, cell),
        _ => match binding::get_value(&cell, ctx.heap, ctx.contexts, overlay.as_ref()) {
            Ok(value) => {
                if let Some(action) = ActionRef::from_cell(&value) {
                    begin_dispatch(level, ctx, action, cell.as_word_symbol())
                } else {
                    finish_step(level, ctx, value)
                }
            }
            Err(_) => raise(level, ctx, ErrorKind::Invalid, "word is unbound"),
        },
    }
}

fn begin_dispatch(level: &mut Level, ctx: &mut EvalContext, action: ActionRef, label: Option<glyph_core::symbol::SymbolId>) -> Bounce {
    let Some(def) = ctx.actions.get(action) else {
        return raise(level, ctx, ErrorKind::IllegalAction, "action identity no longer registered");
    };
    level.dispatch.label = label;
    level.dispatch.param_index = 0;
    level.dispatch.args = Vec::with_capacity(def.paramlist.params().len());
    level.executor = ExecutorKind::ActionDispatch {
        dispatcher: action.0,
    };
    level.state = StepState::FulfillArg;
    step_action_dispatch(level, ctx)
}

fn step_action_dispatch(level: &mut Level, ctx: &mut EvalContext) -> Bounce {
    let ExecutorKind::ActionDispatch { dispatcher } = level.executor else {
        unreachable!("step_action_dispatch called with non-dispatch executor");
    };
    let action = ActionRef(dispatcher);
    let Some(def) = ctx.actions.get(action) else {
        return raise(level, ctx, ErrorKind::IllegalAction, "action identity no longer registered");
    };
    let params = def.paramlist.params().to_vec();

    // Resuming after one of this dispatch's own arguments suspended
    // (it needed a pushed sublevel, e.g. a nested group): the feed cell
    // for that argument was already consumed before the suspension, so
    // pick its now-ready value up from `level.output` instead of
    // pulling the next feed cell, which would silently skip one.
    if level.dispatch.pending_arg {
        level.dispatch.pending_arg = false;
        let param = &params[level.dispatch.param_index];
        let arg = match param.class {
            ParamClass::Meta => meta_lift(level.output),
            _ => level.output,
        };
        if let Some(check) = &param.typecheck {
            if !check(&arg) {
                return raise(level, ctx, ErrorKind::UnexpectedType, "argument failed parameter typecheck");
            }
        }
        level.dispatch.args.push(arg);
        level.dispatch.param_index += 1;
    }

    while level.dispatch.param_index < params.len() {
        let param = &params[level.dispatch.param_index];
        if param.is_refinement() {
            // Refinement fulfillment is a second pass driven by
            // path/chain accessors (spec 4.5); none are supplied here,
            // so refinements default to absent.
            level.dispatch.args.push(Cell::blank());
            level.dispatch.param_index += 1;
            continue;
        }
        let Some(next) = level.feed.take(ctx.heap) else {
            if param.flags.contains(crate::action::ParamFlags::ENDABLE) {
                level.dispatch.args.push(Cell::blank());
                level.dispatch.param_index += 1;
                continue;
            }
            return raise(level, ctx, ErrorKind::NoArg, "not enough arguments for action");
        };
        let arg = match param.class {
            ParamClass::Just | ParamClass::The => next,
            ParamClass::SoftEscapable
                if next.kind() == Kind::Array && next.array_kind() == Some(glyph_core::cell::SequenceKind::Group) =>
            {
                match evaluate_one(level, ctx, next) {
                    Bounce::Out => level.output,
                    other => {
                        level.dispatch.pending_arg = true;
                        return other;
                    }
                }
            }
            ParamClass::SoftEscapable => next,
            ParamClass::Normal => match evaluate_one(level, ctx, next) {
                Bounce::Out => level.output,
                other => {
                    level.dispatch.pending_arg = true;
                    return other;
                }
            },
            ParamClass::Meta => match evaluate_one(level, ctx, next) {
                Bounce::Out => meta_lift(level.output),
                other => {
                    level.dispatch.pending_arg = true;
                    return other;
                }
            },
        };
        if let Some(check) = &param.typecheck {
            if !check(&arg) {
                return raise(level, ctx, ErrorKind::UnexpectedType, "argument failed parameter typecheck");
            }
        }
        level.dispatch.args.push(arg);
        level.dispatch.param_index += 1;
    }

    level.state = StepState::RunningAction;
    match ctx.dispatchers.call(def.dispatcher, &level.dispatch.args) {
        DispatchResult::Value(value) => {
            level.executor = ExecutorKind::Stepper;
            finish_step(level, ctx, value)
        }
        DispatchResult::Raise(value) => {
            level.set_throwing(true);
            level.state = StepState::Done;
            Bounce::Thrown {
                label: level.dispatch.label,
                value,
            }
        }
        DispatchResult::Redo(next_action) => begin_dispatch(level, ctx, next_action, level.dispatch.label),
    }
}

/// Evaluate every expression in a group's nested feed, keeping only
/// the last non-ghost result (spec 4.6, "ghost non-displacement").
///
/// This can itself suspend mid-sequence (one of its own cells is a
/// group that needs a pushed sublevel, or an action it dispatches
/// fulfills an argument that does), so the running "last seen
/// non-ghost value" can't live in a local: it's parked in
/// `level.spare` across the suspension and picked back up here on
/// resumption, the same `StepState::Reevaluating` convention the
/// stepper's own `finish_step` path uses to avoid discarding a
/// just-finished sublevel's output.
fn step_group_eval(level: &mut Level, ctx: &mut EvalContext) -> Bounce {
    let mut last = if level.state == StepState::Reevaluating {
        let finished = level.output;
        if finished.is_ghost() {
            level.spare
        } else {
            finished
        }
    } else {
        Cell::ghost()
    };
    loop {
        if level.feed.is_end(ctx.heap) {
            level.output = last;
            level.state = StepState::Done;
            return Bounce::Out;
        }
        let Some(cell) = level.feed.take(ctx.heap) else {
            level.output = last;
            level.state = StepState::Done;
            return Bounce::Out;
        };
        match evaluate_one(level, ctx, cell) {
            Bounce::Out => {
                if !level.output.is_ghost() {
                    last = level.output;
                }
            }
            other => {
                level.spare = last;
                level.state = StepState::Reevaluating;
                return other;
            }
        }
    }
}

/// Lift a value for a `meta` parameter (spec 4.5/4.6: "meta = one step
/// lifted"). An antiform becomes its quasiform; anything else picks up
/// one more quote level, the same transform `api::Engine::quote` applies.
fn meta_lift(cell: Cell) -> Cell {
    match cell.lift() {
        glyph_core::cell::Lift::Antiform => cell.with_lift(glyph_core::cell::Lift::Quasiform),
        glyph_core::cell::Lift::Quoted(n) => cell.with_lift(glyph_core::cell::Lift::Quoted(n.saturating_add(1))),
        _ => cell.with_lift(glyph_core::cell::Lift::Quoted(1)),
    }
}

fn raise(level: &mut Level, ctx: &mut EvalContext, kind: ErrorKind, message: &str) -> Bounce {
    let err = EvalError::new(kind, message);
    let cell = err.to_cell(ctx.heap, ctx.contexts, ctx.symbols);
    level.set_throwing(true);
    level.state = StepState::Done;
    Bounce::Thrown { label: None, value: cell }
}
