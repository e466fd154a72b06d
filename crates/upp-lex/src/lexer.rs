//! Core lexer implementation.
//!
//! Lexes one source buffer line by line. Each produced token records its
//! character slice; the slices are also written back into the buffer so the
//! token/text position conversions are available to every later stage.

use crate::cursor::Cursor;
use crate::token::{Token, TokenAttribute, TokenTag};
use upp_util::source::TokenSpan;
use upp_util::{Handler, IdentifierPool, PoolLock, SourceBuffer, TextIndex, TextRange, UnitId};

/// Token stream of one compilation unit, line-indexed.
#[derive(Clone, Debug, Default)]
pub struct LexedUnit {
    pub lines: Vec<Vec<Token>>,
}

impl LexedUnit {
    /// Token at a `(line, token)` position, if present.
    pub fn token_at(&self, line: u32, token: u32) -> Option<&Token> {
        self.lines.get(line as usize)?.get(token as usize)
    }

    pub fn line_token_count(&self, line: u32) -> u32 {
        self.lines
            .get(line as usize)
            .map(|tokens| tokens.len() as u32)
            .unwrap_or(0)
    }
}

/// Lex every line of `buffer`, interning names into `pool` and recording
/// token spans back into the buffer. Lexical errors are reported to the
/// handler; an `Invalid` token is produced so the parser can resynchronize.
pub fn lex_buffer(
    buffer: &mut SourceBuffer,
    unit: UnitId,
    pool: &IdentifierPool,
    lock: &PoolLock<'_>,
    handler: &Handler,
) -> LexedUnit {
    let mut lexed = LexedUnit::default();
    for line_index in 0..buffer.lines.len() {
        let text = buffer.lines[line_index].text.clone();
        let mut lexer = LineLexer {
            cursor: Cursor::new(&text),
            line: line_index as u32,
            unit,
            pool,
            lock,
            handler,
        };
        let tokens = lexer.run();
        let spans = tokens
            .iter()
            .map(|t| TokenSpan {
                char_start: t.char_start,
                char_end: t.char_end,
            })
            .collect();
        // Line index is in range by construction
        let _ = buffer.set_line_tokens(line_index as u32, spans);
        lexed.lines.push(tokens);
    }
    lexed
}

struct LineLexer<'a> {
    cursor: Cursor,
    line: u32,
    unit: UnitId,
    pool: &'a IdentifierPool,
    lock: &'a PoolLock<'a>,
    handler: &'a Handler,
}

impl LineLexer<'_> {
    fn run(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.cursor.is_at_end() {
                break;
            }
            // Line comment ends the line
            if self.cursor.current() == '/' && self.cursor.char_at(1) == '/' {
                break;
            }
            tokens.push(self.next_token());
        }
        tokens
    }

    fn skip_whitespace(&mut self) {
        while !self.cursor.is_at_end() && self.cursor.current().is_whitespace() {
            self.cursor.advance();
        }
    }

    fn next_token(&mut self) -> Token {
        let start = self.cursor.position();
        let c = self.cursor.current();

        let (tag, attribute) = match c {
            '(' => self.single(TokenTag::LParen),
            ')' => self.single(TokenTag::RParen),
            '{' => self.single(TokenTag::LBrace),
            '}' => self.single(TokenTag::RBrace),
            '[' => self.single(TokenTag::LBracket),
            ']' => self.single(TokenTag::RBracket),
            ',' => self.single(TokenTag::Comma),
            ';' => self.single(TokenTag::Semicolon),
            '.' => self.single(TokenTag::Dot),
            '?' => self.single(TokenTag::Question),
            '#' => self.single(TokenTag::Hash),
            '$' => self.single(TokenTag::Dollar),
            '+' => self.single(TokenTag::Plus),
            '*' => self.single(TokenTag::Star),
            '/' => self.single(TokenTag::Slash),
            '%' => self.single(TokenTag::Percent),
            ':' => self.pair(':', TokenTag::ColonColon, TokenTag::Colon),
            '=' => self.pair('=', TokenTag::EqEq, TokenTag::Assign),
            '!' => self.pair('=', TokenTag::NotEq, TokenTag::Not),
            '<' => self.pair('=', TokenTag::LessEq, TokenTag::Less),
            '>' => self.pair('=', TokenTag::GreaterEq, TokenTag::Greater),
            '&' => self.pair('&', TokenTag::AndAnd, TokenTag::Ampersand),
            '|' => {
                if self.cursor.char_at(1) == '|' {
                    self.cursor.advance();
                    self.cursor.advance();
                    (TokenTag::OrOr, TokenAttribute::None)
                } else {
                    self.error_at(start, "unexpected character '|'");
                    self.cursor.advance();
                    (TokenTag::Invalid, TokenAttribute::None)
                }
            }
            '-' => {
                if self.cursor.char_at(1) == '>' {
                    self.cursor.advance();
                    self.cursor.advance();
                    (TokenTag::Arrow, TokenAttribute::None)
                } else {
                    self.cursor.advance();
                    (TokenTag::Minus, TokenAttribute::None)
                }
            }
            '"' => self.lex_string(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            c if c.is_alphabetic() || c == '_' => self.lex_word(),
            c => {
                self.error_at(start, format!("unexpected character '{c}'"));
                self.cursor.advance();
                (TokenTag::Invalid, TokenAttribute::None)
            }
        };

        Token {
            tag,
            attribute,
            char_start: start,
            char_end: self.cursor.position(),
        }
    }

    fn single(&mut self, tag: TokenTag) -> (TokenTag, TokenAttribute) {
        self.cursor.advance();
        (tag, TokenAttribute::None)
    }

    /// Two-character token if `second` follows, otherwise the one-character
    /// fallback.
    fn pair(
        &mut self,
        second: char,
        double: TokenTag,
        fallback: TokenTag,
    ) -> (TokenTag, TokenAttribute) {
        self.cursor.advance();
        if self.cursor.current() == second {
            self.cursor.advance();
            (double, TokenAttribute::None)
        } else {
            (fallback, TokenAttribute::None)
        }
    }

    fn lex_word(&mut self) -> (TokenTag, TokenAttribute) {
        let word = self
            .cursor
            .take_while(|c| c.is_alphanumeric() || c == '_');
        match word.as_str() {
            "true" => (TokenTag::BoolLiteral, TokenAttribute::Bool(true)),
            "false" => (TokenTag::BoolLiteral, TokenAttribute::Bool(false)),
            _ => {
                if let Some(keyword) = TokenTag::keyword(&word) {
                    (keyword, TokenAttribute::None)
                } else {
                    let id = self.pool.add(self.lock, &word);
                    (TokenTag::Identifier, TokenAttribute::Id(id))
                }
            }
        }
    }

    fn lex_number(&mut self, start: u32) -> (TokenTag, TokenAttribute) {
        let digits = self.cursor.take_while(|c| c.is_ascii_digit());
        // Float requires a digit after the dot; `1.foo` is member access
        if self.cursor.current() == '.' && self.cursor.char_at(1).is_ascii_digit() {
            self.cursor.advance();
            let fraction = self.cursor.take_while(|c| c.is_ascii_digit());
            let text = format!("{digits}.{fraction}");
            return match text.parse::<f64>() {
                Ok(value) => (TokenTag::FloatLiteral, TokenAttribute::Float(value)),
                Err(_) => {
                    self.error_at(start, format!("invalid float literal '{text}'"));
                    (TokenTag::Invalid, TokenAttribute::None)
                }
            };
        }
        match digits.parse::<i64>() {
            Ok(value) => (TokenTag::IntLiteral, TokenAttribute::Int(value)),
            Err(_) => {
                self.error_at(start, format!("integer literal '{digits}' out of range"));
                (TokenTag::Invalid, TokenAttribute::None)
            }
        }
    }

    fn lex_string(&mut self, start: u32) -> (TokenTag, TokenAttribute) {
        self.cursor.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.cursor.is_at_end() {
                self.error_at(start, "unterminated string literal");
                return (TokenTag::Invalid, TokenAttribute::None);
            }
            match self.cursor.current() {
                '"' => {
                    self.cursor.advance();
                    break;
                }
                '\\' => {
                    self.cursor.advance();
                    let escaped = match self.cursor.current() {
                        'n' => '\n',
                        't' => '\t',
                        '\\' => '\\',
                        '"' => '"',
                        '0' => '\0',
                        other => {
                            self.error_at(start, format!("unknown escape '\\{other}'"));
                            other
                        }
                    };
                    value.push(escaped);
                    self.cursor.advance();
                }
                c => {
                    value.push(c);
                    self.cursor.advance();
                }
            }
        }
        // String bytes live in the identifier pool; constant-pool
        // canonicalisation relies on this copy.
        let id = self.pool.add(self.lock, &value);
        (TokenTag::StringLiteral, TokenAttribute::Id(id))
    }

    fn error_at(&self, start: u32, message: impl Into<String>) {
        let at = TextIndex::new(self.line, start);
        self.handler.error(
            message,
            self.unit,
            TextRange::new(at, TextIndex::new(self.line, self.cursor.position().max(start + 1))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> (LexedUnit, SourceBuffer, Handler, IdentifierPool) {
        let pool = IdentifierPool::new();
        let handler = Handler::new();
        let mut buffer = SourceBuffer::from_text("test.upp", text);
        let lexed = {
            let lock = pool.lock();
            lex_buffer(&mut buffer, UnitId(0), &pool, &lock, &handler)
        };
        (lexed, buffer, handler, pool)
    }

    fn tags(unit: &LexedUnit, line: usize) -> Vec<TokenTag> {
        unit.lines[line].iter().map(|t| t.tag).collect()
    }

    #[test]
    fn lexes_function_definition() {
        let (unit, _, handler, _) = lex("main :: () -> () {}");
        assert!(!handler.has_errors());
        assert_eq!(
            tags(&unit, 0),
            vec![
                TokenTag::Identifier,
                TokenTag::ColonColon,
                TokenTag::LParen,
                TokenTag::RParen,
                TokenTag::Arrow,
                TokenTag::LParen,
                TokenTag::RParen,
                TokenTag::LBrace,
                TokenTag::RBrace,
            ]
        );
    }

    #[test]
    fn lexes_literals() {
        let (unit, _, handler, _) = lex("42 3.5 true \"hi\\n\"");
        assert!(!handler.has_errors());
        let tokens = &unit.lines[0];
        assert_eq!(tokens[0].attribute, TokenAttribute::Int(42));
        assert_eq!(tokens[1].attribute, TokenAttribute::Float(3.5));
        assert_eq!(tokens[2].attribute, TokenAttribute::Bool(true));
        assert_eq!(tokens[3].tag, TokenTag::StringLiteral);
    }

    #[test]
    fn string_bytes_live_in_pool() {
        let (unit, _, _, pool) = lex("\"hello\"");
        let id = unit.lines[0][0].identifier().unwrap();
        assert_eq!(pool.get(id), "hello");
    }

    #[test]
    fn identifiers_are_interned_once() {
        let (unit, _, _, _) = lex("foo foo");
        let a = unit.lines[0][0].identifier().unwrap();
        let b = unit.lines[0][1].identifier().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let (unit, _, _, _) = lex("struct defer cast_pointer");
        assert_eq!(
            tags(&unit, 0),
            vec![
                TokenTag::KwStruct,
                TokenTag::KwDefer,
                TokenTag::KwCastPointer
            ]
        );
    }

    #[test]
    fn line_comments_end_lines() {
        let (unit, _, _, _) = lex("x // comment with tokens :: ()\ny");
        assert_eq!(unit.lines[0].len(), 1);
        assert_eq!(unit.lines[1].len(), 1);
    }

    #[test]
    fn token_spans_are_recorded() {
        let (_, buffer, _, _) = lex("ab cd");
        let spans = &buffer.lines[0].token_spans;
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].char_start, spans[0].char_end), (0, 2));
        assert_eq!((spans[1].char_start, spans[1].char_end), (3, 5));
    }

    #[test]
    fn pointer_and_optional_sigils() {
        let (unit, _, _, _) = lex("*?Node");
        assert_eq!(
            tags(&unit, 0),
            vec![TokenTag::Star, TokenTag::Question, TokenTag::Identifier]
        );
    }

    #[test]
    fn invalid_character_reports_and_continues() {
        let (unit, _, handler, _) = lex("a ` b");
        assert!(handler.has_errors());
        assert_eq!(
            tags(&unit, 0),
            vec![TokenTag::Identifier, TokenTag::Invalid, TokenTag::Identifier]
        );
    }

    #[test]
    fn unterminated_string_reports() {
        let (_, _, handler, _) = lex("\"oops");
        assert!(handler.has_errors());
    }
}
