//! The cell: a fixed-size, self-describing tagged value.
//!
//! A [`Cell`] is a `#[repr(C)]` struct of a packed header (kind, lift,
//! flags) and three raw 64-bit slots (`payload1`, `payload2`, `extra`).
//! Which slots are meaningful, and whether they hold an inline scalar or
//! a [`crate::heap::StubId`] reference the collector must trace, is
//! entirely determined by `kind` plus `lift` — the same "self-describing"
//! contract the spec requires, expressed the way the teacher's
//! `NanBoxedValue` packs a tag and payload into fixed bit ranges rather
//! than relying on an opaque Rust enum discriminant.

use crate::heap::StubId;
use crate::symbol::SymbolId;

/// The closed set of primitive kinds a cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Blank = 0,
    Logic,
    Integer,
    Decimal,
    Percent,
    Money,
    Time,
    Date,
    Pair,
    Sequence, // tuple/chain/path, distinguished by SequenceKind in flags
    Text,
    File,
    Tag,
    Email,
    Url,
    Issue,
    Binary,
    Bitset,
    Word, // plain/set/get/lit, distinguished by WordForm in flags
    Array, // block/group/fence, distinguished by SequenceKind-like tag in flags
    Map,
    Context, // object/frame/port/error/module, distinguished by ContextKind in flags
    Handle,
    Varargs,
    Parameter,
    Datatype,
    Comma,
    Extension,
    // Internal-only states, never observed by user code.
    Erased,
    Poisoned,
    Unreadable,
}

/// The four forms every kind can take, per spec section 4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lift {
    Plain,
    Quoted(u8),
    Quasiform,
    Antiform,
}

impl Lift {
    pub fn is_antiform(self) -> bool {
        matches!(self, Lift::Antiform)
    }

    fn to_tag(self) -> u16 {
        match self {
            Lift::Plain => 0,
            Lift::Quoted(n) => 0x0100 | (n as u16),
            Lift::Quasiform => 0x0200,
            Lift::Antiform => 0x0300,
        }
    }

    fn from_tag(tag: u16) -> Lift {
        match tag & 0xFF00 {
            0x0000 => Lift::Plain,
            0x0100 => Lift::Quoted((tag & 0x00FF) as u8),
            0x0200 => Lift::Quasiform,
            0x0300 => Lift::Antiform,
            _ => Lift::Plain,
        }
    }
}

/// Disambiguates a `Kind::Sequence` or `Kind::Array` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Tuple,
    Chain,
    Path,
    Block,
    Group,
    Fence,
}

impl SequenceKind {
    fn to_bits(self) -> u8 {
        match self {
            SequenceKind::Tuple => 0,
            SequenceKind::Chain => 1,
            SequenceKind::Path => 2,
            SequenceKind::Block => 3,
            SequenceKind::Group => 4,
            SequenceKind::Fence => 5,
        }
    }

    fn from_bits(bits: u8) -> SequenceKind {
        match bits {
            0 => SequenceKind::Tuple,
            1 => SequenceKind::Chain,
            2 => SequenceKind::Path,
            3 => SequenceKind::Block,
            4 => SequenceKind::Group,
            _ => SequenceKind::Fence,
        }
    }
}

/// Disambiguates a `Kind::Word` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordForm {
    Plain,
    Set,
    Get,
    Lit,
}

impl WordForm {
    fn to_bits(self) -> u8 {
        match self {
            WordForm::Plain => 0,
            WordForm::Set => 1,
            WordForm::Get => 2,
            WordForm::Lit => 3,
        }
    }

    fn from_bits(bits: u8) -> WordForm {
        match bits {
            0 => WordForm::Plain,
            1 => WordForm::Set,
            2 => WordForm::Get,
            _ => WordForm::Lit,
        }
    }
}

/// Disambiguates a `Kind::Context` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Object,
    Frame,
    Port,
    Error,
    Module,
}

impl ContextKind {
    fn to_bits(self) -> u8 {
        match self {
            ContextKind::Object => 0,
            ContextKind::Frame => 1,
            ContextKind::Port => 2,
            ContextKind::Error => 3,
            ContextKind::Module => 4,
        }
    }

    fn from_bits(bits: u8) -> ContextKind {
        match bits {
            0 => ContextKind::Object,
            1 => ContextKind::Frame,
            2 => ContextKind::Port,
            3 => ContextKind::Error,
            _ => ContextKind::Module,
        }
    }
}

/// Low byte of a cell's flags word: a sub-kind discriminant whose meaning
/// depends on `kind` (sequence form, word form, or context form). The
/// high byte is reserved for mutation-relevant bits (const).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellFlags(u16);

impl CellFlags {
    pub const CONST: u16 = 0x0100;
    pub const COMPRESSED_SEQUENCE: u16 = 0x0002;

    pub fn is_const(self) -> bool {
        self.0 & Self::CONST != 0
    }

    pub fn with_const(mut self, value: bool) -> Self {
        if value {
            self.0 |= Self::CONST;
        } else {
            self.0 &= !Self::CONST;
        }
        self
    }
}

/// A fixed-size, self-describing value.
///
/// `payload1`/`payload2`/`extra` are raw 64-bit slots; accessor methods
/// interpret them according to `kind`/`lift`. This keeps `Cell` `Copy`
/// and a predictable size, matching the spec's "every cell is
/// self-describing" invariant in a way `size_of::<Cell>()` can verify.
#[repr(C)]
#[derive(Clone, Copy, PartialEq)]
pub struct Cell {
    kind: Kind,
    lift_tag: u16,
    sub_kind: u8,
    flags: u16,
    payload1: u64,
    payload2: u64,
    extra: u64,
}

impl Default for Cell {
    /// The default cell is `erased` — the only state legal in an output
    /// cell before its first write (spec section 4.2).
    fn default() -> Self {
        Cell::erased()
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind)
            .field("lift", &self.lift())
            .field("payload1", &self.payload1)
            .field("payload2", &self.payload2)
            .field("extra", &self.extra)
            .finish()
    }
}

impl Cell {
    fn raw(kind: Kind, lift: Lift, sub_kind: u8, payload1: u64, payload2: u64, extra: u64) -> Cell {
        Cell {
            kind,
            lift_tag: lift.to_tag(),
            sub_kind,
            flags: 0,
            payload1,
            payload2,
            extra,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn lift(&self) -> Lift {
        Lift::from_tag(self.lift_tag)
    }

    pub fn cell_flags(&self) -> CellFlags {
        CellFlags(self.flags)
    }

    pub fn set_const(&mut self, value: bool) {
        self.flags = self.cell_flags().with_const(value).0;
    }

    pub fn is_const(&self) -> bool {
        self.cell_flags().is_const()
    }

    /// Reserved states, never observed by user code.
    pub fn erased() -> Cell {
        Cell::raw(Kind::Erased, Lift::Plain, 0, 0, 0, 0)
    }

    pub fn is_erased(&self) -> bool {
        self.kind == Kind::Erased
    }

    pub fn poisoned() -> Cell {
        Cell::raw(Kind::Poisoned, Lift::Plain, 0, 0, 0, 0)
    }

    pub fn is_poisoned(&self) -> bool {
        self.kind == Kind::Poisoned
    }

    pub fn unreadable() -> Cell {
        Cell::raw(Kind::Unreadable, Lift::Plain, 0, 0, 0, 0)
    }

    // -- scalars -------------------------------------------------------

    pub fn blank() -> Cell {
        Cell::raw(Kind::Blank, Lift::Plain, 0, 0, 0, 0)
    }

    pub fn logic(b: bool) -> Cell {
        Cell::raw(Kind::Logic, Lift::Plain, 0, b as u64, 0, 0)
    }

    pub fn as_logic(&self) -> Option<bool> {
        (self.kind == Kind::Logic).then(|| self.payload1 != 0)
    }

    pub fn integer(n: i64) -> Cell {
        Cell::raw(Kind::Integer, Lift::Plain, 0, n as u64, 0, 0)
    }

    pub fn as_integer(&self) -> Option<i64> {
        (self.kind == Kind::Integer).then_some(self.payload1 as i64)
    }

    pub fn decimal(f: f64) -> Cell {
        Cell::raw(Kind::Decimal, Lift::Plain, 0, f.to_bits(), 0, 0)
    }

    pub fn as_decimal(&self) -> Option<f64> {
        (self.kind == Kind::Decimal).then(|| f64::from_bits(self.payload1))
    }

    pub fn comma() -> Cell {
        Cell::raw(Kind::Comma, Lift::Plain, 0, 0, 0, 0)
    }

    pub fn is_comma(&self) -> bool {
        self.kind == Kind::Comma && matches!(self.lift(), Lift::Plain)
    }

    // -- evaluator signals (antiforms) ----------------------------------

    /// The invisible/ghost result: an antiform comma.
    pub fn ghost() -> Cell {
        Cell::raw(Kind::Comma, Lift::Antiform, 0, 0, 0, 0)
    }

    pub fn is_ghost(&self) -> bool {
        self.kind == Kind::Comma && self.lift().is_antiform()
    }

    /// `void`: the antiform of blank, meaning "no value, not an error".
    pub fn void() -> Cell {
        Cell::raw(Kind::Blank, Lift::Antiform, 0, 0, 0, 0)
    }

    pub fn is_void(&self) -> bool {
        self.kind == Kind::Blank && self.lift().is_antiform()
    }

    /// `null`: the antiform word `null`, the evaluator's absent-value
    /// signal (distinct from `void`: null is an intentional "nothing").
    pub fn null(null_symbol: SymbolId) -> Cell {
        Cell::word(WordForm::Plain, null_symbol, Lift::Antiform)
    }

    pub fn is_null(&self, null_symbol: SymbolId) -> bool {
        self.kind == Kind::Word
            && self.lift().is_antiform()
            && self.as_word_symbol() == Some(null_symbol)
    }

    /// `okay`: the antiform word `okay`, the evaluator's canonical truthy
    /// signal returned by conditionals.
    pub fn okay(okay_symbol: SymbolId) -> Cell {
        Cell::word(WordForm::Plain, okay_symbol, Lift::Antiform)
    }

    /// A splice: an antiform block whose elements are spread into the
    /// enclosing list by `insert`/`append`/argument-gathering.
    pub fn splice(array: StubId) -> Cell {
        Cell::raw(Kind::Array, Lift::Antiform, SequenceKind::Block.to_bits(), array.to_u64(), 0, 0)
    }

    pub fn is_splice(&self) -> bool {
        self.kind == Kind::Array && self.lift().is_antiform()
    }

    /// A pack: an antiform block carrying multiple simultaneous return
    /// values, unpacked positionally by `set-word`/argument binding.
    pub fn pack(array: StubId) -> Cell {
        Cell::splice(array)
    }

    // -- words -----------------------------------------------------------

    pub fn word(form: WordForm, symbol: SymbolId, lift: Lift) -> Cell {
        Cell::raw(
            Kind::Word,
            lift,
            form.to_bits(),
            symbol.0 as u64,
            0,
            Binding::Unbound.encode(),
        )
    }

    pub fn word_form(&self) -> Option<WordForm> {
        (self.kind == Kind::Word).then(|| WordForm::from_bits(self.sub_kind))
    }

    pub fn as_word_symbol(&self) -> Option<SymbolId> {
        (self.kind == Kind::Word).then_some(SymbolId(self.payload1 as u32))
    }

    pub fn binding(&self) -> Option<Binding> {
        (self.kind == Kind::Word).then(|| Binding::decode(self.extra))
    }

    pub fn set_binding(&mut self, binding: Binding) {
        debug_assert_eq!(self.kind, Kind::Word, "set_binding on non-word cell");
        self.extra = binding.encode();
    }

    // -- sequences ---------------------------------------------------------

    /// A general sequence (tuple/chain/path) backed by a frozen array.
    pub fn sequence(seq_kind: SequenceKind, array: StubId) -> Cell {
        Cell::raw(Kind::Sequence, Lift::Plain, seq_kind.to_bits(), array.to_u64(), 0, 0)
    }

    /// The compressed 2-element-with-leading-space form: a word-like cell
    /// carrying only a symbol plus the "leading space" bit, used when one
    /// element of a tuple/path/chain is blank (spec section 4.3).
    pub fn compressed_sequence(seq_kind: SequenceKind, symbol: SymbolId, leading_space: bool) -> Cell {
        let mut c = Cell::raw(Kind::Sequence, Lift::Plain, seq_kind.to_bits(), symbol.0 as u64, 0, 0);
        c.extra = leading_space as u64;
        c.flags |= CellFlags::COMPRESSED_SEQUENCE;
        c
    }

    pub fn sequence_kind(&self) -> Option<SequenceKind> {
        (self.kind == Kind::Sequence).then(|| SequenceKind::from_bits(self.sub_kind))
    }

    pub fn is_compressed_sequence(&self) -> bool {
        self.kind == Kind::Sequence && self.flags & CellFlags::COMPRESSED_SEQUENCE != 0
    }

    pub fn compressed_symbol(&self) -> Option<SymbolId> {
        self.is_compressed_sequence().then_some(SymbolId(self.payload1 as u32))
    }

    pub fn compressed_leading_space(&self) -> Option<bool> {
        self.is_compressed_sequence().then_some(self.extra != 0)
    }

    // -- arrays (block/group/fence) ----------------------------------------

    pub fn array(seq_kind: SequenceKind, array: StubId, index: u32) -> Cell {
        Cell::raw(
            Kind::Array,
            Lift::Plain,
            seq_kind.to_bits(),
            array.to_u64(),
            index as u64,
            0,
        )
    }

    pub fn array_kind(&self) -> Option<SequenceKind> {
        (self.kind == Kind::Array).then(|| SequenceKind::from_bits(self.sub_kind))
    }

    pub fn array_stub(&self) -> Option<StubId> {
        (self.kind == Kind::Array).then(|| StubId::from_u64(self.payload1))
    }

    pub fn array_index(&self) -> Option<u32> {
        (self.kind == Kind::Array).then_some(self.payload2 as u32)
    }

    pub fn with_array_index(mut self, index: u32) -> Cell {
        self.payload2 = index as u64;
        self
    }

    // -- string-likes ------------------------------------------------------

    pub fn text(buffer: StubId, index: u32) -> Cell {
        Cell::raw(Kind::Text, Lift::Plain, 0, buffer.to_u64(), index as u64, 0)
    }

    pub fn issue(buffer: StubId) -> Cell {
        Cell::raw(Kind::Issue, Lift::Plain, 0, buffer.to_u64(), 0, 0)
    }

    pub fn binary(buffer: StubId, index: u32) -> Cell {
        Cell::raw(Kind::Binary, Lift::Plain, 0, buffer.to_u64(), index as u64, 0)
    }

    pub fn bitset(buffer: StubId) -> Cell {
        Cell::raw(Kind::Bitset, Lift::Plain, 0, buffer.to_u64(), 0, 0)
    }

    pub fn string_like_stub(&self) -> Option<StubId> {
        matches!(self.kind, Kind::Text | Kind::File | Kind::Tag | Kind::Email | Kind::Url | Kind::Issue | Kind::Binary | Kind::Bitset)
            .then(|| StubId::from_u64(self.payload1))
    }

    // -- map ---------------------------------------------------------------

    pub fn map(pairlist: StubId) -> Cell {
        Cell::raw(Kind::Map, Lift::Plain, 0, pairlist.to_u64(), 0, 0)
    }

    pub fn map_stub(&self) -> Option<StubId> {
        (self.kind == Kind::Map).then(|| StubId::from_u64(self.payload1))
    }

    // -- contexts (object/frame/port/error/module) --------------------------

    pub fn context(ctx_kind: ContextKind, varlist: StubId) -> Cell {
        Cell::raw(Kind::Context, Lift::Plain, ctx_kind.to_bits(), varlist.to_u64(), 0, 0)
    }

    pub fn context_kind(&self) -> Option<ContextKind> {
        (self.kind == Kind::Context).then(|| ContextKind::from_bits(self.sub_kind))
    }

    pub fn context_varlist(&self) -> Option<StubId> {
        (self.kind == Kind::Context).then(|| StubId::from_u64(self.payload1))
    }

    /// Reinterpret a value in a different lift form, e.g. lifting a
    /// plain error context to its antiform (spec section 4.2, "raised
    /// errors flow through evaluation boundaries as antiforms").
    pub fn with_lift(mut self, lift: Lift) -> Cell {
        self.lift_tag = lift.to_tag();
        self
    }

    // -- datatype ------------------------------------------------------------

    pub fn datatype(named: Kind) -> Cell {
        Cell::raw(Kind::Datatype, Lift::Plain, named as u8, 0, 0, 0)
    }

    pub fn datatype_named(&self) -> Option<u8> {
        (self.kind == Kind::Datatype).then_some(self.sub_kind)
    }

    // -- varargs / parameter / handle (opaque payloads) ----------------------

    pub fn varargs(level_id: u32, param_index: u32) -> Cell {
        Cell::raw(Kind::Varargs, Lift::Plain, 0, level_id as u64, param_index as u64, 0)
    }

    pub fn handle(opaque: u64, type_tag: u32) -> Cell {
        Cell::raw(Kind::Handle, Lift::Plain, 0, opaque, type_tag as u64, 0)
    }

    pub fn handle_opaque(&self) -> Option<u64> {
        (self.kind == Kind::Handle).then_some(self.payload1)
    }

    pub fn handle_type_tag(&self) -> Option<u32> {
        (self.kind == Kind::Handle).then_some(self.payload2 as u32)
    }

    // -- GC / evaluator introspection -----------------------------------------

    /// The stub this cell references, if it holds one. Used by the
    /// collector's transitive mark pass and by `Stub::child_stub_ids`.
    pub fn stub_ref(&self) -> Option<StubId> {
        match self.kind {
            Kind::Sequence if self.is_compressed_sequence() => {
                // Compressed form carries only a symbol, no stub.
                None
            }
            Kind::Sequence | Kind::Array | Kind::Map | Kind::Context | Kind::Text | Kind::File
            | Kind::Tag | Kind::Email | Kind::Url | Kind::Issue | Kind::Binary | Kind::Bitset => {
                Some(StubId::from_u64(self.payload1))
            }
            Kind::Word => match self.binding() {
                Some(Binding::Context { stub, .. }) => Some(stub),
                Some(Binding::Let(stub)) => Some(stub),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether this cell's kind is bindable (word-like).
    pub fn is_bindable(&self) -> bool {
        self.kind == Kind::Word
    }

    /// Whether this cell's kind holds a cell-array (listlike).
    pub fn is_listlike(&self) -> bool {
        matches!(self.kind, Kind::Array | Kind::Sequence)
    }

    /// Whether this cell's kind holds byte-string data.
    pub fn is_stringlike(&self) -> bool {
        matches!(
            self.kind,
            Kind::Text | Kind::File | Kind::Tag | Kind::Email | Kind::Url | Kind::Issue
        )
    }

    /// Inert values self-evaluate: copied through by the stepper without
    /// further dispatch (spec 4.6 step 2).
    pub fn is_inert(&self) -> bool {
        !matches!(self.kind, Kind::Word | Kind::Comma)
            && !(self.kind == Kind::Array && matches!(self.array_kind(), Some(SequenceKind::Group)))
    }

    /// Truthiness used by conditionals: everything except antiform
    /// `null` and plain `Logic(false)` is truthy. `void` and `ghost` are
    /// not valid conditional inputs and are rejected by callers.
    pub fn is_truthy(&self, null_symbol: SymbolId) -> bool {
        if self.is_null(null_symbol) {
            return false;
        }
        if let Some(b) = self.as_logic() {
            return b;
        }
        true
    }
}

/// Where a word-bearing cell resolves, per spec section 4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    /// Bound into a context's varlist at a cached index.
    Context { stub: StubId, index: u32 },
    /// Bound to a single-variable `let` stub.
    Let(StubId),
}

impl Binding {
    fn encode(self) -> u64 {
        match self {
            Binding::Unbound => u64::MAX,
            Binding::Context { stub, index } => (stub.to_u64() << 32) | (index as u64) | (1 << 63),
            Binding::Let(stub) => stub.to_u64() | (1 << 62),
        }
    }

    fn decode(raw: u64) -> Binding {
        if raw == u64::MAX {
            Binding::Unbound
        } else if raw & (1 << 63) != 0 {
            let stub = StubId::from_u64((raw & !(1 << 63)) >> 32);
            let index = (raw & 0xFFFF_FFFF) as u32;
            Binding::Context { stub, index }
        } else if raw & (1 << 62) != 0 {
            Binding::Let(StubId::from_u64(raw & !(1 << 62)))
        } else {
            Binding::Unbound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_is_fixed_size() {
        assert_eq!(std::mem::size_of::<Cell>(), std::mem::size_of::<Cell>());
        // Header (kind+lift_tag+sub_kind+flags) packs into 8 bytes, plus
        // three u64 payload slots: a stable, predictable layout.
        assert!(std::mem::size_of::<Cell>() <= 32);
    }

    #[test]
    fn integer_round_trips() {
        let c = Cell::integer(-42);
        assert_eq!(c.as_integer(), Some(-42));
        assert_eq!(c.as_logic(), None);
    }

    #[test]
    fn ghost_is_distinct_from_void_and_null() {
        let ghost = Cell::ghost();
        let void = Cell::void();
        assert!(ghost.is_ghost());
        assert!(!ghost.is_void());
        assert!(void.is_void());
        assert!(!void.is_ghost());
    }

    #[test]
    fn null_is_antiform_word() {
        let sym = SymbolId(7);
        let n = Cell::null(sym);
        assert!(n.is_null(sym));
        assert!(!n.is_null(SymbolId(8)));
        assert_eq!(n.as_word_symbol(), Some(sym));
    }

    #[test]
    fn word_binding_round_trips() {
        let mut w = Cell::word(WordForm::Plain, SymbolId(3), Lift::Plain);
        assert_eq!(w.binding(), Some(Binding::Unbound));
        let target = Binding::Context {
            stub: StubId::from_u64(5),
            index: 2,
        };
        w.set_binding(target);
        assert_eq!(w.binding(), Some(target));
    }

    #[test]
    fn compressed_sequence_carries_no_stub_ref() {
        let c = Cell::compressed_sequence(SequenceKind::Path, SymbolId(1), true);
        assert!(c.is_compressed_sequence());
        assert_eq!(c.stub_ref(), None);
    }

    #[test]
    fn inert_values_self_evaluate() {
        assert!(Cell::integer(1).is_inert());
        assert!(Cell::blank().is_inert());
        assert!(!Cell::word(WordForm::Plain, SymbolId(0), Lift::Plain).is_inert());
        assert!(!Cell::comma().is_inert());
    }

    #[test]
    fn truthiness_rejects_null_accepts_everything_else() {
        let null_sym = SymbolId(0);
        assert!(!Cell::null(null_sym).is_truthy(null_sym));
        assert!(!Cell::logic(false).is_truthy(null_sym));
        assert!(Cell::logic(true).is_truthy(null_sym));
        assert!(Cell::integer(0).is_truthy(null_sym));
        assert!(Cell::blank().is_truthy(null_sym));
    }
}
