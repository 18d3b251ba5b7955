//! The mold buffer: a shared, ephemeral byte buffer used while
//! synthesizing text (spec section 11). Per-datatype molding logic
//! (how an integer or a map renders itself) is an external
//! collaborator's concern, the same as the scanner (spec section 1);
//! this module only owns the append/checkpoint/truncate/take
//! mechanics a molder built on top of it would share.

/// A checkpoint recorded before a nested mold begins, so it can be
/// unwound if that nested mold is abandoned (spec 4.9's checked-build
/// push/pop invariant, mirrored here for the mold buffer).
pub type MoldMark = usize;

#[derive(Debug, Default)]
pub struct MoldBuffer {
    bytes: Vec<u8>,
}

impl MoldBuffer {
    pub fn new() -> Self {
        MoldBuffer::default()
    }

    pub fn mark(&self) -> MoldMark {
        self.bytes.len()
    }

    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn push_byte(&mut self, b: u8) {
        self.bytes.push(b);
    }

    /// Discard everything appended since `mark`.
    pub fn truncate_to(&mut self, mark: MoldMark) {
        debug_assert!(mark <= self.bytes.len(), "mark above current mold length");
        self.bytes.truncate(mark);
    }

    /// Take everything appended since `mark` as a standalone string,
    /// also truncating the buffer back to `mark` (the completed piece
    /// is handed off, the shared buffer resets for its next use).
    pub fn take_since(&mut self, mark: MoldMark) -> String {
        let bytes = self.bytes.split_off(mark);
        String::from_utf8(bytes).expect("mold buffer only ever receives valid UTF-8")
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).expect("mold buffer only ever receives valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_mold_unwinds_to_mark() {
        let mut mold = MoldBuffer::new();
        mold.push_str("outer");
        let mark = mold.mark();
        mold.push_str("abandoned");
        mold.truncate_to(mark);
        assert_eq!(mold.as_str(), "outer");
    }

    #[test]
    fn take_since_extracts_and_resets() {
        let mut mold = MoldBuffer::new();
        mold.push_str("prefix:");
        let mark = mold.mark();
        mold.push_str("value");
        let taken = mold.take_since(mark);
        assert_eq!(taken, "value");
        assert_eq!(mold.as_str(), "prefix:");
    }
}
