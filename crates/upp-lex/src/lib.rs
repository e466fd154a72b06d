//! upp-lex - Lexical Analyzer
//!
//! Transforms a line-indexed source buffer into a per-line token stream.
//! Tokens are addressed by `(line, token index)` pairs throughout the rest
//! of the compiler, so the lexer works strictly line by line: no token ever
//! spans a newline, and each line's token character spans are recorded back
//! into the source buffer for total token/text position conversions.

mod cursor;
mod lexer;
pub mod token;

pub use lexer::{lex_buffer, LexedUnit};
pub use token::{Token, TokenAttribute, TokenTag};
