//! Source buffers and position types.
//!
//! Source files are loaded once into immutable, line-indexed buffers. Every
//! later stage addresses source positions either by character
//! ([`TextIndex`]/[`TextRange`]) or by token ([`TokenIndex`]/[`TokenRange`]).
//! Conversions between the two are total: out-of-range positions clamp to
//! the nearest valid position instead of failing.

use crate::define_idx;
use crate::error::SourceError;

define_idx!(UnitId);

/// A `(line, character)` position inside one compilation unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextIndex {
    /// Line number (0-based)
    pub line: u32,
    /// Character offset within the line (0-based)
    pub character: u32,
}

impl TextIndex {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open `(start, end)` pair of text positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: TextIndex,
    pub end: TextIndex,
}

impl TextRange {
    pub const fn new(start: TextIndex, end: TextIndex) -> Self {
        Self { start, end }
    }

    /// Range covering a single position
    pub const fn point(at: TextIndex) -> Self {
        Self { start: at, end: at }
    }

    /// Smallest range covering both inputs
    pub fn join(self, other: TextRange) -> TextRange {
        TextRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(self, index: TextIndex) -> bool {
        index >= self.start && index < self.end
    }
}

/// A `(line, token index within line)` position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenIndex {
    pub line: u32,
    pub token: u32,
}

impl TokenIndex {
    pub const fn new(line: u32, token: u32) -> Self {
        Self { line, token }
    }
}

/// A half-open `(start, end)` pair of token positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TokenRange {
    pub start: TokenIndex,
    pub end: TokenIndex,
}

impl TokenRange {
    pub const fn new(start: TokenIndex, end: TokenIndex) -> Self {
        Self { start, end }
    }

    pub fn join(self, other: TokenRange) -> TokenRange {
        TokenRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Character extent of one token inside its line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSpan {
    pub char_start: u32,
    pub char_end: u32,
}

/// One line of an immutable source buffer.
#[derive(Clone, Debug, Default)]
pub struct SourceLine {
    /// Line text without the trailing newline
    pub text: String,
    /// Character spans of the tokens on this line, set by the lexer
    pub token_spans: Vec<TokenSpan>,
}

/// An immutable, line-indexed source buffer for one compilation unit.
#[derive(Clone, Debug)]
pub struct SourceBuffer {
    pub path: String,
    pub lines: Vec<SourceLine>,
}

impl SourceBuffer {
    /// Split UTF-8 text into lines. The buffer text is immutable afterwards;
    /// only token spans are filled in later by the lexer.
    pub fn from_text(path: impl Into<String>, text: &str) -> Self {
        let mut lines: Vec<SourceLine> = text
            .split('\n')
            .map(|line| SourceLine {
                text: line.strip_suffix('\r').unwrap_or(line).to_string(),
                token_spans: Vec::new(),
            })
            .collect();
        if lines.is_empty() {
            lines.push(SourceLine::default());
        }
        Self {
            path: path.into(),
            lines,
        }
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Record the token spans of one line. Called once per line by the lexer.
    pub fn set_line_tokens(&mut self, line: u32, spans: Vec<TokenSpan>) -> Result<(), SourceError> {
        let line_count = self.lines.len();
        let entry = self
            .lines
            .get_mut(line as usize)
            .ok_or(SourceError::InvalidLine {
                line: line as usize,
                max_lines: line_count,
            })?;
        entry.token_spans = spans;
        Ok(())
    }

    /// Convert a token position to a text position. Total: out-of-range
    /// lines and token indices clamp.
    pub fn token_to_text(&self, index: TokenIndex, use_end: bool) -> TextIndex {
        let line = (index.line as usize).min(self.lines.len().saturating_sub(1));
        let source_line = &self.lines[line];
        if source_line.token_spans.is_empty() {
            return TextIndex::new(line as u32, 0);
        }
        let token = (index.token as usize).min(source_line.token_spans.len() - 1);
        let span = source_line.token_spans[token];
        let character = if use_end { span.char_end } else { span.char_start };
        TextIndex::new(line as u32, character)
    }

    /// Convert a text position to the index of the token at or nearest to
    /// it. Total: positions before the first token map to token 0, after
    /// the last to the last token.
    pub fn text_to_token(&self, index: TextIndex) -> TokenIndex {
        let line = (index.line as usize).min(self.lines.len().saturating_sub(1));
        let spans = &self.lines[line].token_spans;
        if spans.is_empty() {
            return TokenIndex::new(line as u32, 0);
        }
        let mut token = spans.len() - 1;
        for (i, span) in spans.iter().enumerate() {
            if index.character < span.char_end {
                token = i;
                break;
            }
        }
        TokenIndex::new(line as u32, token as u32)
    }

    /// Convert a token range to the text range it covers.
    pub fn token_range_to_text_range(&self, range: TokenRange) -> TextRange {
        TextRange {
            start: self.token_to_text(range.start, false),
            end: self.token_to_text(range.end, true),
        }
    }
}

/// A compilation unit: its buffer plus the unit id assigned at load time.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub id: UnitId,
    pub buffer: SourceBuffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_tokens() -> SourceBuffer {
        let mut buffer = SourceBuffer::from_text("test.upp", "let x\nfoo bar baz\n");
        buffer
            .set_line_tokens(
                0,
                vec![
                    TokenSpan {
                        char_start: 0,
                        char_end: 3,
                    },
                    TokenSpan {
                        char_start: 4,
                        char_end: 5,
                    },
                ],
            )
            .unwrap();
        buffer
            .set_line_tokens(
                1,
                vec![
                    TokenSpan {
                        char_start: 0,
                        char_end: 3,
                    },
                    TokenSpan {
                        char_start: 4,
                        char_end: 7,
                    },
                    TokenSpan {
                        char_start: 8,
                        char_end: 11,
                    },
                ],
            )
            .unwrap();
        buffer
    }

    #[test]
    fn from_text_splits_lines() {
        let buffer = SourceBuffer::from_text("a.upp", "one\r\ntwo\nthree");
        assert_eq!(buffer.lines[0].text, "one");
        assert_eq!(buffer.lines[1].text, "two");
        assert_eq!(buffer.lines[2].text, "three");
    }

    #[test]
    fn token_text_round_trip() {
        let buffer = buffer_with_tokens();
        let token = TokenIndex::new(1, 1);
        let text = buffer.token_to_text(token, false);
        assert_eq!(text, TextIndex::new(1, 4));
        assert_eq!(buffer.text_to_token(text), token);
    }

    #[test]
    fn conversions_are_total() {
        let buffer = buffer_with_tokens();
        // Line past the end clamps to the last line
        let clamped = buffer.token_to_text(TokenIndex::new(99, 99), true);
        assert_eq!(clamped.line, 2);
        // Character past line end clamps to the last token
        let token = buffer.text_to_token(TextIndex::new(1, 200));
        assert_eq!(token.token, 2);
    }

    #[test]
    fn token_range_covers_text() {
        let buffer = buffer_with_tokens();
        let range = TokenRange::new(TokenIndex::new(0, 0), TokenIndex::new(0, 1));
        let text = buffer.token_range_to_text_range(range);
        assert_eq!(text.start, TextIndex::new(0, 0));
        assert_eq!(text.end, TextIndex::new(0, 5));
    }

    #[test]
    fn range_join_and_contains() {
        let a = TextRange::new(TextIndex::new(0, 1), TextIndex::new(0, 4));
        let b = TextRange::new(TextIndex::new(0, 3), TextIndex::new(1, 0));
        let joined = a.join(b);
        assert_eq!(joined.start, TextIndex::new(0, 1));
        assert_eq!(joined.end, TextIndex::new(1, 0));
        assert!(joined.contains(TextIndex::new(0, 3)));
        assert!(!joined.contains(TextIndex::new(1, 0)));
    }
}
