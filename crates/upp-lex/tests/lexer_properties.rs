//! Property-based lexer tests.

use proptest::prelude::*;
use upp_lex::lex_buffer;
use upp_util::{Handler, IdentifierPool, SourceBuffer, UnitId};

fn lex_text(text: &str) -> upp_lex::LexedUnit {
    let pool = IdentifierPool::new();
    let handler = Handler::new();
    let mut buffer = SourceBuffer::from_text("prop.upp", text);
    let lock = pool.lock();
    lex_buffer(&mut buffer, UnitId(0), &pool, &lock, &handler)
}

proptest! {
    /// Token spans on a line are ordered and non-overlapping.
    #[test]
    fn spans_are_ordered(text in "[ a-z0-9:(){}*?.,;=+-]{0,60}") {
        let unit = lex_text(&text);
        for line in &unit.lines {
            let mut previous_end = 0u32;
            for token in line {
                prop_assert!(token.char_start >= previous_end);
                prop_assert!(token.char_end > token.char_start);
                previous_end = token.char_end;
            }
        }
    }

    /// Lexing is deterministic: the same text yields the same tags.
    #[test]
    fn lexing_is_deterministic(text in "[ a-z0-9:(){}]{0,40}") {
        let a = lex_text(&text);
        let b = lex_text(&text);
        let tags_a: Vec<_> = a.lines.iter().flatten().map(|t| t.tag).collect();
        let tags_b: Vec<_> = b.lines.iter().flatten().map(|t| t.tag).collect();
        prop_assert_eq!(tags_a, tags_b);
    }

    /// Identifiers interned from equal text in one pool compare equal.
    #[test]
    fn interning_in_one_unit(word in "[a-z_][a-z0-9_]{0,10}") {
        if upp_lex::TokenTag::keyword(&word).is_some() || word == "true" || word == "false" {
            return Ok(());
        }
        let text = format!("{word} {word}");
        let unit = lex_text(&text);
        let line = &unit.lines[0];
        prop_assert_eq!(line.len(), 2);
        prop_assert_eq!(line[0].identifier(), line[1].identifier());
    }
}
