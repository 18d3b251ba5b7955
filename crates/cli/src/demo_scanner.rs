//! A bracket-and-word reader good enough to drive the CLI's
//! `run`/`repl` subcommands. Not a conforming scanner: no string
//! escapes, no path/tuple/chain sequences, no decimals beyond a single
//! dot, no comments. Source-text syntax is explicitly out of scope for
//! the engine itself; this exists only so `glyph` has something to
//! type at.

use glyph_core::cell::{Cell, SequenceKind, WordForm};
use glyph_core::heap::{Heap, StubId};
use glyph_core::series::SeriesBuf;
use glyph_core::stub::{Flavor, Payload};
use glyph_core::symbol::SymbolTable;
use glyph_runtime::api::Scanner;

pub struct DemoScanner;

impl Scanner for DemoScanner {
    fn scan(&self, text: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> StubId {
        let mut tokens = tokenize(text);
        let cells = read_sequence(&mut tokens, heap, symbols);
        let stub = heap.allocate_unmanaged(Flavor::Array, Payload::Array(SeriesBuf::from_vec(cells)));
        heap.promote_to_managed(stub);
        stub
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(char),
    Close(char),
    Comma,
    Word(String),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' | '(' | '{' => {
                out.push(Token::Open(c));
                chars.next();
            }
            ']' | ')' | '}' => {
                out.push(Token::Close(c));
                chars.next();
            }
            ',' => {
                out.push(Token::Comma);
                chars.next();
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    s.push(c);
                }
                out.push(Token::Text(s));
            }
            c if c.is_ascii_digit() || (c == '-' && peek_is_digit(&mut chars)) => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                let mut is_decimal = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        s.push(c);
                        chars.next();
                    } else if c == '.' && !is_decimal {
                        is_decimal = true;
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_decimal {
                    out.push(Token::Decimal(s.parse().unwrap_or(0.0)));
                } else {
                    out.push(Token::Integer(s.parse().unwrap_or(0)));
                }
            }
            _ => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | ',' | '"') {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                out.push(Token::Word(s));
            }
        }
    }
    out
}

fn peek_is_digit(chars: &mut std::iter::Peekable<std::str::Chars>) -> bool {
    let mut clone = chars.clone();
    clone.next();
    matches!(clone.peek(), Some(c) if c.is_ascii_digit())
}

/// Reads tokens until the enclosing close bracket (or end of input at
/// the top level), returning the cells in between.
fn read_sequence(tokens: &mut Vec<Token>, heap: &mut Heap, symbols: &mut SymbolTable) -> Vec<Cell> {
    let mut cells = Vec::new();
    tokens.reverse();
    while let Some(tok) = tokens.pop() {
        match tok {
            Token::Close(_) => break,
            Token::Open(open) => {
                let inner = read_sequence_from_reversed(tokens, heap, symbols);
                let seq_kind = match open {
                    '[' => SequenceKind::Block,
                    '(' => SequenceKind::Group,
                    '{' => SequenceKind::Fence,
                    _ => SequenceKind::Block,
                };
                let inner_stub = heap.allocate_unmanaged(Flavor::Array, Payload::Array(SeriesBuf::from_vec(inner)));
                heap.promote_to_managed(inner_stub);
                cells.push(Cell::array(seq_kind, inner_stub, 0));
            }
            Token::Comma => cells.push(Cell::comma()),
            Token::Integer(n) => cells.push(Cell::integer(n)),
            Token::Decimal(f) => cells.push(Cell::decimal(f)),
            Token::Text(s) => cells.push(text_cell(&s, heap)),
            Token::Word(w) => cells.push(word_cell(&w, heap, symbols)),
        }
    }
    cells
}

fn read_sequence_from_reversed(tokens: &mut Vec<Token>, heap: &mut Heap, symbols: &mut SymbolTable) -> Vec<Cell> {
    let mut forward: Vec<Token> = Vec::new();
    while let Some(tok) = tokens.pop() {
        if matches!(tok, Token::Close(_)) {
            break;
        }
        forward.push(tok);
    }
    forward.reverse();
    read_sequence(&mut forward, heap, symbols)
}

fn text_cell(s: &str, heap: &mut Heap) -> Cell {
    let stub = heap.allocate_unmanaged(Flavor::ByteBuffer, Payload::ByteBuffer(SeriesBuf::from_vec(s.as_bytes().to_vec())));
    heap.promote_to_managed(stub);
    Cell::text(stub, 0)
}

fn word_cell(w: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> Cell {
    let (form, name) = if let Some(stripped) = w.strip_suffix(':') {
        (WordForm::Set, stripped)
    } else if let Some(stripped) = w.strip_prefix(':') {
        (WordForm::Get, stripped)
    } else if let Some(stripped) = w.strip_prefix('\'') {
        (WordForm::Lit, stripped)
    } else {
        (WordForm::Plain, w)
    };
    if name.starts_with('#') {
        return issue_cell(&name[1..], heap);
    }
    let sym = symbols.intern(name);
    Cell::word(form, sym, glyph_core::cell::Lift::Plain)
}

fn issue_cell(name: &str, heap: &mut Heap) -> Cell {
    let stub = heap.allocate_unmanaged(Flavor::ByteBuffer, Payload::ByteBuffer(SeriesBuf::from_vec(name.as_bytes().to_vec())));
    heap.promote_to_managed(stub);
    Cell::issue(stub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_a_flat_word_and_integer_sequence() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let stub = DemoScanner.scan("add 1 2", &mut heap, &mut symbols);
        let stored = heap.get(stub).unwrap();
        let Payload::Array(buf) = &stored.payload else {
            panic!("expected an array payload");
        };
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.as_slice()[1].as_integer(), Some(1));
    }

    #[test]
    fn scans_a_nested_block() {
        let mut heap = Heap::new(1 << 16);
        let mut symbols = SymbolTable::new();
        let stub = DemoScanner.scan("[1 2 [3]]", &mut heap, &mut symbols);
        let stored = heap.get(stub).unwrap();
        let Payload::Array(buf) = &stored.payload else {
            panic!("expected an array payload");
        };
        assert_eq!(buf.len(), 1);
        assert!(buf.as_slice()[0].is_listlike());
    }
}
