//! The trampoline: the outermost loop that drives a stack of levels to
//! completion (spec 4.7).
//!
//! The stepper never recurses into itself; instead it hands back a
//! [`Bounce`] telling the trampoline what to do next. This keeps
//! arbitrarily deep nested evaluation (a million-element block of
//! groups, say) off the native call stack, the same motivation behind
//! `glyph_core::gc::collect`'s explicit work-list over recursion.

use crate::level::{Bounce, Level};
use crate::stack::DataStack;
use crate::stepper::{step, EvalContext};

/// Run `root` (and whatever sublevels it pushes) to completion,
/// returning its final output cell or the value of an uncaught throw.
///
/// `data_stack` is passed through so each level's baseline can be
/// enforced as it completes (spec 4.9's checked-build invariant).
pub fn run(root: Level, ctx: &mut EvalContext, data_stack: &mut DataStack) -> Result<glyph_core::cell::Cell, Thrown> {
    let mut levels = vec![root];

    loop {
        let bounce = {
            let top = levels.last_mut().expect("trampoline never empties its own level stack");
            step(top, ctx)
        };

        match bounce {
            Bounce::Out => {
                let finished = levels.pop().expect("just stepped the top level");
                data_stack.drop_to(finished.stack_base);
                match levels.last_mut() {
                    Some(parent) => parent.output = finished.output,
                    None => return Ok(finished.output),
                }
            }
            Bounce::ContinueSublevel(sub) => {
                levels.push(*sub);
            }
            Bounce::Delegate(sub) => {
                levels.pop();
                levels.push(*sub);
            }
            Bounce::Downshifted => {
                // The level rewrote its own executor/state in place;
                // loop and step it again without touching the stack.
            }
            Bounce::RedoUnchecked => {
                // Re-dispatch without re-fulfilling arguments; the
                // level's dispatch state is left as-is by the stepper.
            }
            Bounce::Thrown { label, value } => {
                let unwound_from = levels.pop().expect("just stepped the top level");
                data_stack.drop_to(unwound_from.stack_base);
                if levels.is_empty() {
                    return Err(Thrown { label, value });
                }
                // No catch-level machinery is registered here; an
                // uncaught throw propagates straight to the root the
                // same way it would past every intervening level that
                // didn't install itself as a catch (spec 4.8).
                for level in levels.iter_mut().rev() {
                    data_stack.drop_to(level.stack_base);
                }
                return Err(Thrown { label, value });
            }
        }
    }
}

/// A throw that reached the trampoline's root without being caught.
#[derive(Debug, Clone, Copy)]
pub struct Thrown {
    pub label: Option<glyph_core::symbol::SymbolId>,
    pub value: glyph_core::cell::Cell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTable, DispatcherTable};
    use crate::context::ContextTable;
    use crate::feed::Feed;
    use crate::level::ExecutorKind;
    use glyph_core::cell::Cell;
    use glyph_core::heap::Heap;
    use glyph_core::stub::{Flavor, Payload};
    use glyph_core::symbol::SymbolTable;

    #[test]
    fn single_inert_value_runs_to_completion() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let actions = ActionTable::new();
        let dispatchers = DispatcherTable::new();
        let stub = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(1)])));
        let mut data_stack = DataStack::new();
        let level = Level::new(Feed::from_array(stub), ExecutorKind::Stepper, data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut heap,
            symbols: &mut symbols,
            contexts: &mut contexts,
            actions: &actions,
            dispatchers: &dispatchers,
        };
        let result = run(level, &mut ctx, &mut data_stack).unwrap();
        assert_eq!(result.as_integer(), Some(1));
    }

    #[test]
    fn nested_group_runs_through_a_sublevel() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let actions = ActionTable::new();
        let dispatchers = DispatcherTable::new();

        let inner = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(7)])));
        heap.promote_to_managed(inner);
        let group = Cell::array(glyph_core::cell::SequenceKind::Group, inner, 0);
        let outer = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![group])));

        let mut data_stack = DataStack::new();
        let level = Level::new(Feed::from_array(outer), ExecutorKind::Stepper, data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut heap,
            symbols: &mut symbols,
            contexts: &mut contexts,
            actions: &actions,
            dispatchers: &dispatchers,
        };
        let result = run(level, &mut ctx, &mut data_stack).unwrap();
        assert_eq!(result.as_integer(), Some(7));
    }

    #[test]
    fn group_eval_root_keeps_a_trailing_groups_result_across_its_own_sublevel() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let actions = ActionTable::new();
        let dispatchers = DispatcherTable::new();

        let inner = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(9)])));
        heap.promote_to_managed(inner);
        let group = Cell::array(glyph_core::cell::SequenceKind::Group, inner, 0);
        let outer = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(1), group])));

        let mut data_stack = DataStack::new();
        let level = Level::new(Feed::from_array(outer), ExecutorKind::GroupEval, data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut heap,
            symbols: &mut symbols,
            contexts: &mut contexts,
            actions: &actions,
            dispatchers: &dispatchers,
        };
        let result = run(level, &mut ctx, &mut data_stack).unwrap();
        assert_eq!(result.as_integer(), Some(9));
    }

    #[test]
    fn set_word_assignment_survives_a_suspending_group_rhs() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let actions = ActionTable::new();
        let dispatchers = DispatcherTable::new();

        let x = symbols.intern("x");
        let archetype = contexts.build(&mut heap, glyph_core::cell::ContextKind::Object, None, &[(x, Cell::integer(0))]);
        let varlist = archetype.context_varlist().unwrap();
        let (_, index) = contexts.index_of(&heap, varlist, x).unwrap();
        let mut set_word = Cell::word(glyph_core::cell::WordForm::Set, x, glyph_core::cell::Lift::Plain);
        set_word.set_binding(glyph_core::cell::Binding::Context { stub: varlist, index });

        let inner = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(9)])));
        heap.promote_to_managed(inner);
        let group = Cell::array(glyph_core::cell::SequenceKind::Group, inner, 0);
        let outer = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![set_word, group])));

        let mut data_stack = DataStack::new();
        let level = Level::new(Feed::from_array(outer), ExecutorKind::Stepper, data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut heap,
            symbols: &mut symbols,
            contexts: &mut contexts,
            actions: &actions,
            dispatchers: &dispatchers,
        };
        let result = run(level, &mut ctx, &mut data_stack).unwrap();
        assert_eq!(result.as_integer(), Some(9));
        assert_eq!(contexts.get(&heap, varlist, index).unwrap().as_integer(), Some(9));
    }

    #[test]
    fn uncaught_throw_propagates_to_caller() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let mut contexts = ContextTable::new();
        let actions = ActionTable::new();
        let dispatchers = DispatcherTable::new();
        let sym = symbols.intern("missing");
        let word = Cell::word(glyph_core::cell::WordForm::Plain, sym, glyph_core::cell::Lift::Plain);
        let stub = heap.allocate_unmanaged(Flavor::Array, Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![word])));
        let mut data_stack = DataStack::new();
        let level = Level::new(Feed::from_array(stub), ExecutorKind::Stepper, data_stack.baseline());
        let mut ctx = EvalContext {
            heap: &mut heap,
            symbols: &mut symbols,
            contexts: &mut contexts,
            actions: &actions,
            dispatchers: &dispatchers,
        };
        let result = run(level, &mut ctx, &mut data_stack);
        assert!(result.is_err());
    }
}
