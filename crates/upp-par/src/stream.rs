//! Flattened token stream over a lexed unit.
//!
//! The lexer produces tokens per line; the parser wants one stream. The
//! stream keeps each token's `(line, token)` position so node ranges stay
//! addressable in the per-line model.

use upp_lex::{LexedUnit, Token, TokenAttribute, TokenTag};
use upp_util::{TokenIndex, TokenRange};

pub struct TokenStream {
    tokens: Vec<(Token, TokenIndex)>,
    position: usize,
}

impl TokenStream {
    pub fn new(unit: &LexedUnit) -> Self {
        let mut tokens = Vec::new();
        for (line, line_tokens) in unit.lines.iter().enumerate() {
            for (index, token) in line_tokens.iter().enumerate() {
                tokens.push((*token, TokenIndex::new(line as u32, index as u32)));
            }
        }
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Number of tokens left, including the current one.
    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.position)
    }

    /// Tag of the token at `offset` from the current position.
    /// Past-the-end reads yield `Invalid`.
    pub fn peek(&self, offset: usize) -> TokenTag {
        self.tokens
            .get(self.position + offset)
            .map(|(t, _)| t.tag)
            .unwrap_or(TokenTag::Invalid)
    }

    pub fn current(&self) -> TokenTag {
        self.peek(0)
    }

    pub fn current_attribute(&self) -> TokenAttribute {
        self.tokens
            .get(self.position)
            .map(|(t, _)| t.attribute)
            .unwrap_or(TokenAttribute::None)
    }

    /// Position of the current token; end-of-input sticks to the position
    /// one past the last token.
    pub fn current_index(&self) -> TokenIndex {
        if let Some((_, index)) = self.tokens.get(self.position) {
            *index
        } else {
            self.end_index()
        }
    }

    /// Position one past the last consumed token.
    pub fn previous_end_index(&self) -> TokenIndex {
        if self.position == 0 {
            return TokenIndex::new(0, 0);
        }
        match self.tokens.get(self.position - 1) {
            Some((_, index)) => TokenIndex::new(index.line, index.token + 1),
            None => self.end_index(),
        }
    }

    fn end_index(&self) -> TokenIndex {
        match self.tokens.last() {
            Some((_, index)) => TokenIndex::new(index.line, index.token + 1),
            None => TokenIndex::new(0, 0),
        }
    }

    pub fn advance(&mut self) {
        self.position += 1;
    }

    /// Consume the current token if its tag matches.
    pub fn eat(&mut self, tag: TokenTag) -> bool {
        if self.current() == tag {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Range from a recorded start position to one past the last consumed
    /// token.
    pub fn range_from(&self, start: TokenIndex) -> TokenRange {
        TokenRange::new(start, self.previous_end_index())
    }
}
