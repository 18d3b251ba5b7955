//! Construction and validation of tuple/path/chain sequences.
//!
//! A sequence is an ordered, frozen list of at least two elements whose
//! atoms are constrained by its kind: a dotted (tuple) sequence forbids
//! atoms that themselves look like paths or chains, a slashed (path)
//! sequence forbids atoms containing `/`, and a chained sequence forbids
//! atoms containing `:` — see spec section 4.3. The common case of two
//! elements where one is blank (`a/` or `/a`) never needs a heap-backed
//! array at all: [`Cell::compressed_sequence`] packs the surviving word
//! and a "which side was blank" bit directly into the cell.

use crate::cell::{Cell, SequenceKind};
use crate::heap::Heap;
use crate::stub::{Flavor, Payload};
use crate::symbol::SymbolTable;

/// Why a candidate sequence was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    /// Sequences need at least two elements.
    TooFewElements,
    /// A word atom carried a character forbidden by this sequence kind.
    ForbiddenAtom,
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::TooFewElements => write!(f, "a sequence needs at least two elements"),
            SequenceError::ForbiddenAtom => {
                write!(f, "an atom is not legal inside this sequence kind")
            }
        }
    }
}

impl std::error::Error for SequenceError {}

fn atom_is_forbidden(seq_kind: SequenceKind, cell: &Cell, symbols: &SymbolTable) -> bool {
    let Some(sym) = cell.as_word_symbol() else {
        return false;
    };
    let flags = symbols.resolve(sym).flags;
    match seq_kind {
        SequenceKind::Tuple => flags.forbidden_in_dotted,
        SequenceKind::Path => flags.forbidden_in_slashed,
        SequenceKind::Chain => flags.forbidden_in_chained,
        // block/group/fence are not dotted/slashed/chained sequences.
        SequenceKind::Block | SequenceKind::Group | SequenceKind::Fence => false,
    }
}

/// Build a tuple/path/chain sequence cell from its element cells,
/// validating atom legality and choosing the compressed representation
/// when possible.
///
/// `seq_kind` must be one of `Tuple`, `Path`, or `Chain` — passing a
/// block/group/fence kind is a caller error (those are built through
/// [`Cell::array`], not this path).
pub fn build_sequence(
    seq_kind: SequenceKind,
    items: &[Cell],
    symbols: &SymbolTable,
    heap: &mut Heap,
) -> Result<Cell, SequenceError> {
    if items.len() < 2 {
        return Err(SequenceError::TooFewElements);
    }
    for item in items {
        if atom_is_forbidden(seq_kind, item, symbols) {
            return Err(SequenceError::ForbiddenAtom);
        }
    }

    if items.len() == 2 {
        let (first, second) = (&items[0], &items[1]);
        if first.kind() == crate::cell::Kind::Blank && second.as_word_symbol().is_some() {
            return Ok(Cell::compressed_sequence(
                seq_kind,
                second.as_word_symbol().unwrap(),
                true,
            ));
        }
        if second.kind() == crate::cell::Kind::Blank && first.as_word_symbol().is_some() {
            return Ok(Cell::compressed_sequence(
                seq_kind,
                first.as_word_symbol().unwrap(),
                false,
            ));
        }
    }

    let payload = Payload::Array(crate::series::SeriesBuf::from_vec(items.to_vec()));
    let id = heap.allocate_unmanaged(Flavor::Array, payload);
    heap.promote_to_managed(id);
    Ok(Cell::sequence(seq_kind, id))
}
