//! Evaluation errors: the closed error-kind set (spec section 7) and
//! the conversion between Rust-side [`EvalError`]s and the antiform
//! error cells that actually cross evaluation boundaries (spec 4.8).
//!
//! A dispatcher panic (as opposed to a definitional raise) is staged
//! in a thread-local slot for the trampoline to recover, the same way
//! the teacher's error module threads a panic payload into a
//! last-error string rather than letting it unwind across an FFI
//! boundary — generalized here from a C-string-facing channel to a
//! plain Rust `String`.

use crate::context::ContextTable;
use glyph_core::cell::{Cell, ContextKind, Lift};
use glyph_core::heap::Heap;
use glyph_core::symbol::SymbolTable;
use std::cell::RefCell;

/// One member of the closed error-kind set named in spec section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadMake,
    Overflow,
    ZeroDivide,
    OutOfRange,
    Invalid,
    InvalidCompare,
    InvalidType,
    UnexpectedType,
    BadAntiform,
    BadPoke,
    NoArg,
    NoPortAction,
    BadExtension,
    NativeUnloaded,
    NeedNonNull,
    MathArgs,
    TypeLimit,
    InvalidPart,
    VarargsTakeLast,
    VarargsNoLook,
    Positive,
    IllegalAction,
    User,
    Veto,
}

impl ErrorKind {
    /// The stable identifier stored in an error context's `id` field,
    /// matching the kebab-case names spec section 7 uses.
    pub fn id(self) -> &'static str {
        match self {
            ErrorKind::BadMake => "bad-make",
            ErrorKind::Overflow => "overflow",
            ErrorKind::ZeroDivide => "zero-divide",
            ErrorKind::OutOfRange => "out-of-range",
            ErrorKind::Invalid => "invalid",
            ErrorKind::InvalidCompare => "invalid-compare",
            ErrorKind::InvalidType => "invalid-type",
            ErrorKind::UnexpectedType => "unexpected-type",
            ErrorKind::BadAntiform => "bad-antiform",
            ErrorKind::BadPoke => "bad-poke",
            ErrorKind::NoArg => "no-arg",
            ErrorKind::NoPortAction => "no-port-action",
            ErrorKind::BadExtension => "bad-extension",
            ErrorKind::NativeUnloaded => "native-unloaded",
            ErrorKind::NeedNonNull => "need-non-null",
            ErrorKind::MathArgs => "math-args",
            ErrorKind::TypeLimit => "type-limit",
            ErrorKind::InvalidPart => "invalid-part",
            ErrorKind::VarargsTakeLast => "varargs-take-last",
            ErrorKind::VarargsNoLook => "varargs-no-look",
            ErrorKind::Positive => "positive",
            ErrorKind::IllegalAction => "illegal-action",
            ErrorKind::User => "user",
            ErrorKind::Veto => "veto",
        }
    }
}

/// A raised evaluation error: a kind plus a human-readable message.
/// Structured argument data (the `arg1`/`arg2`/... slots a real error
/// object carries) is out of scope here the same way datatype-specific
/// handlers are (spec section 1) — the message is enough to drive the
/// propagation and catch machinery this crate owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
        }
    }

    /// Build the antiform error-context cell that travels through
    /// `Bounce::Thrown` and evaluation boundaries (spec 4.8).
    pub fn to_cell(&self, heap: &mut Heap, contexts: &mut ContextTable, symbols: &mut SymbolTable) -> Cell {
        let id_sym = symbols.intern("id");
        let message_sym = symbols.intern("message");
        let id_stub = heap.allocate_unmanaged(
            glyph_core::stub::Flavor::ByteBuffer,
            glyph_core::stub::Payload::ByteBuffer(glyph_core::series::SeriesBuf::from_vec(
                self.kind.id().bytes().collect(),
            )),
        );
        heap.promote_to_managed(id_stub);
        let id_value = Cell::issue(id_stub);

        let message_stub = heap.allocate_unmanaged(
            glyph_core::stub::Flavor::ByteBuffer,
            glyph_core::stub::Payload::ByteBuffer(glyph_core::series::SeriesBuf::from_vec(
                self.message.bytes().collect(),
            )),
        );
        heap.promote_to_managed(message_stub);
        let message_value = Cell::text(message_stub, 0);
        let archetype = contexts.build(
            heap,
            ContextKind::Error,
            None,
            &[(id_sym, id_value), (message_sym, message_value)],
        );
        archetype.with_lift(Lift::Antiform)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.id(), self.message)
    }
}

impl std::error::Error for EvalError {}

thread_local! {
    /// The payload of a dispatcher panic caught at a trampoline
    /// boundary, staged here until the trampoline decides whether to
    /// convert it into a throw or resume unwinding.
    static PENDING_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Stage a caught panic payload for the trampoline to pick up.
pub fn set_pending_panic(payload: &(dyn std::any::Any + Send)) {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    PENDING_PANIC.with(|p| *p.borrow_mut() = Some(message));
}

/// Take (and clear) a pending panic payload, if any.
pub fn take_pending_panic() -> Option<String> {
    PENDING_PANIC.with(|p| p.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_core::heap::Heap;

    #[test]
    fn error_kind_ids_are_stable_kebab_case() {
        assert_eq!(ErrorKind::ZeroDivide.id(), "zero-divide");
        assert_eq!(ErrorKind::VarargsTakeLast.id(), "varargs-take-last");
    }

    #[test]
    fn pending_panic_round_trips() {
        assert!(take_pending_panic().is_none());
        set_pending_panic(&"boom");
        assert_eq!(take_pending_panic().as_deref(), Some("boom"));
        assert!(take_pending_panic().is_none());
    }

    #[test]
    fn eval_error_displays_kind_and_message() {
        let err = EvalError::new(ErrorKind::Overflow, "too big");
        assert_eq!(err.to_string(), "overflow: too big");
    }

    #[test]
    fn to_cell_produces_antiform_error_context() {
        let mut heap = Heap::new(1 << 16);
        let mut contexts = ContextTable::new();
        let mut symbols = SymbolTable::new();
        let err = EvalError::new(ErrorKind::ZeroDivide, "divide by zero");
        let cell = err.to_cell(&mut heap, &mut contexts, &mut symbols);
        assert_eq!(cell.lift(), Lift::Antiform);
        assert_eq!(cell.context_kind(), Some(ContextKind::Error));
    }
}
