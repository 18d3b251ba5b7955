//! Feed: a one-item-lookahead cursor over a source array.
//!
//! Spec section 3/6 describes three feed sources: a list-stub cursor
//! with binding, a UTF-8 text buffer scanned on demand, and a
//! pull-callback. Scanning text is out of scope here (the scanner is an
//! external collaborator, spec section 1); [`Feed`] implements the
//! array-cursor and pull-callback forms, which is everything the
//! trampoline and stepper need.

use glyph_core::cell::Cell;
use glyph_core::heap::{Heap, StubId};

/// Where a [`Feed`] pulls its next cell from.
enum Source {
    Array { stub: StubId, index: usize },
    Pull(Box<dyn FnMut() -> Option<Cell>>),
}

/// A cursor over a source of cells with one-item lookahead, used by the
/// stepper to detect infix words and expression-barrier commas without
/// consuming them.
pub struct Feed {
    source: Source,
    lookahead: Option<Cell>,
    primed: bool,
}

impl Feed {
    pub fn from_array(stub: StubId) -> Self {
        Feed {
            source: Source::Array { stub, index: 0 },
            lookahead: None,
            primed: false,
        }
    }

    pub fn from_pull(pull: impl FnMut() -> Option<Cell> + 'static) -> Self {
        Feed {
            source: Source::Pull(Box::new(pull)),
            lookahead: None,
            primed: false,
        }
    }

    fn advance_source(&mut self, heap: &Heap) -> Option<Cell> {
        match &mut self.source {
            Source::Array { stub, index } => {
                let stub_ref = heap.get(*stub)?;
                let cell = stub_ref.as_array()?.get(*index).copied();
                if cell.is_some() {
                    *index += 1;
                }
                cell
            }
            Source::Pull(f) => f(),
        }
    }

    fn ensure_primed(&mut self, heap: &Heap) {
        if !self.primed {
            self.lookahead = self.advance_source(heap);
            self.primed = true;
        }
    }

    /// True if the feed has no more cells.
    pub fn is_end(&mut self, heap: &Heap) -> bool {
        self.ensure_primed(heap);
        self.lookahead.is_none()
    }

    /// Look at the next cell without consuming it.
    pub fn peek(&mut self, heap: &Heap) -> Option<Cell> {
        self.ensure_primed(heap);
        self.lookahead
    }

    /// Consume and return the next cell.
    pub fn take(&mut self, heap: &Heap) -> Option<Cell> {
        self.ensure_primed(heap);
        let current = self.lookahead.take();
        self.lookahead = self.advance_source(heap);
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::stub::{Flavor, Payload};

    #[test]
    fn array_feed_yields_cells_in_order() {
        let mut heap = Heap::new(1 << 16);
        let stub = heap.allocate_unmanaged(
            Flavor::Array,
            Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![
                Cell::integer(1),
                Cell::integer(2),
            ])),
        );
        let mut feed = Feed::from_array(stub);
        assert_eq!(feed.take(&heap).unwrap().as_integer(), Some(1));
        assert_eq!(feed.take(&heap).unwrap().as_integer(), Some(2));
        assert!(feed.is_end(&heap));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut heap = Heap::new(1 << 16);
        let stub = heap.allocate_unmanaged(
            Flavor::Array,
            Payload::Array(glyph_core::series::SeriesBuf::from_vec(vec![Cell::integer(7)])),
        );
        let mut feed = Feed::from_array(stub);
        assert_eq!(feed.peek(&heap).unwrap().as_integer(), Some(7));
        assert_eq!(feed.peek(&heap).unwrap().as_integer(), Some(7));
        assert_eq!(feed.take(&heap).unwrap().as_integer(), Some(7));
        assert!(feed.is_end(&heap));
    }

    #[test]
    fn empty_array_feed_is_immediately_at_end() {
        let mut heap = Heap::new(1 << 16);
        let stub = heap.allocate_unmanaged(Flavor::Array, Payload::Array(Default::default()));
        let mut feed = Feed::from_array(stub);
        assert!(feed.is_end(&heap));
        assert!(feed.take(&heap).is_none());
    }
}
