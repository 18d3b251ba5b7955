//! The data stack: a single growable array of cells shared by argument
//! collection, partial-paramlist construction, and mold-building (spec
//! 4.9). Unlike the teacher's codegen-facing raw-pointer stack (built
//! to match LLVM calling-convention layout), nothing here talks to
//! generated machine code, so a plain `Vec<Cell>` does the job safely.

use glyph_core::cell::Cell;

/// A baseline recorded when a level is pushed; the level must restore
/// the stack to this depth before it returns (spec 4.9, "Each level
/// records the stack base at push time").
pub type Baseline = usize;

#[derive(Debug, Default)]
pub struct DataStack {
    cells: Vec<Cell>,
}

impl DataStack {
    pub fn new() -> Self {
        DataStack::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn baseline(&self) -> Baseline {
        self.cells.len()
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn pop(&mut self) -> Option<Cell> {
        self.cells.pop()
    }

    pub fn top(&self) -> Option<&Cell> {
        self.cells.last()
    }

    /// Discard everything above `baseline`. Checked builds call this
    /// from the trampoline to enforce the push/pop invariant (spec
    /// 4.9) even when a level's executor didn't balance its own stack
    /// use, e.g. on an error unwind.
    pub fn drop_to(&mut self, baseline: Baseline) {
        debug_assert!(baseline <= self.cells.len(), "baseline above current stack depth");
        self.cells.truncate(baseline);
    }

    /// Remove everything above `baseline` and return it as a freshly
    /// ordered `Vec`, for building an array out of a run of pushed
    /// cells (spec 4.9 "pop-as-new-series").
    pub fn pop_as_new_series(&mut self, baseline: Baseline) -> Vec<Cell> {
        debug_assert!(baseline <= self.cells.len(), "baseline above current stack depth");
        self.cells.split_off(baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_round_trip() {
        let mut stack = DataStack::new();
        stack.push(Cell::integer(1));
        stack.push(Cell::integer(2));
        assert_eq!(stack.pop().unwrap().as_integer(), Some(2));
        assert_eq!(stack.pop().unwrap().as_integer(), Some(1));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn drop_to_baseline_truncates() {
        let mut stack = DataStack::new();
        stack.push(Cell::integer(1));
        let baseline = stack.baseline();
        stack.push(Cell::integer(2));
        stack.push(Cell::integer(3));
        stack.drop_to(baseline);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop().unwrap().as_integer(), Some(1));
    }

    #[test]
    fn pop_as_new_series_extracts_tail() {
        let mut stack = DataStack::new();
        stack.push(Cell::integer(1));
        let baseline = stack.baseline();
        stack.push(Cell::integer(2));
        stack.push(Cell::integer(3));
        let popped = stack.pop_as_new_series(baseline);
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].as_integer(), Some(2));
        assert_eq!(stack.len(), 1);
    }
}
