//! Token model.
//!
//! A token is a tag plus an optional attribute (integer/float/bool value or
//! identifier handle) plus the character slice it covers on its line. Later
//! stages store [`upp_util::TokenRange`]s as source positions, so the token
//! itself only needs its in-line extent.

use upp_util::Identifier;

/// Token category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenTag {
    // Names and literals
    Identifier,
    IntLiteral,
    FloatLiteral,
    BoolLiteral,
    StringLiteral,

    // Keywords
    KwModule,
    KwImport,
    KwStruct,
    KwUnion,
    KwEnum,
    KwContext,
    KwCast,
    KwCastRaw,
    KwCastPointer,
    KwBake,
    KwDefer,
    KwReturn,
    KwBreak,
    KwContinue,
    KwIf,
    KwElse,
    KwWhile,
    KwSwitch,
    KwCase,
    KwDefault,
    KwFor,
    KwIn,
    KwNull,
    KwAs,
    KwExtern,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Dot,
    Arrow,
    Question,
    Hash,
    Dollar,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
    Not,

    /// Lexically invalid input, reported and skipped by the parser
    Invalid,
}

impl TokenTag {
    /// Keyword lookup for a lexed identifier-shaped word.
    pub fn keyword(text: &str) -> Option<TokenTag> {
        Some(match text {
            "module" => TokenTag::KwModule,
            "import" => TokenTag::KwImport,
            "struct" => TokenTag::KwStruct,
            "union" => TokenTag::KwUnion,
            "enum" => TokenTag::KwEnum,
            "context" => TokenTag::KwContext,
            "cast" => TokenTag::KwCast,
            "cast_raw" => TokenTag::KwCastRaw,
            "cast_pointer" => TokenTag::KwCastPointer,
            "bake" => TokenTag::KwBake,
            "defer" => TokenTag::KwDefer,
            "return" => TokenTag::KwReturn,
            "break" => TokenTag::KwBreak,
            "continue" => TokenTag::KwContinue,
            "if" => TokenTag::KwIf,
            "else" => TokenTag::KwElse,
            "while" => TokenTag::KwWhile,
            "switch" => TokenTag::KwSwitch,
            "case" => TokenTag::KwCase,
            "default" => TokenTag::KwDefault,
            "for" => TokenTag::KwFor,
            "in" => TokenTag::KwIn,
            "null" => TokenTag::KwNull,
            "as" => TokenTag::KwAs,
            "extern" => TokenTag::KwExtern,
            _ => return None,
        })
    }
}

/// Token attribute payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TokenAttribute {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Identifier or string literal, interned into the identifier pool
    Id(Identifier),
}

/// One lexed token: tag, attribute, and its character slice on its line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Token {
    pub tag: TokenTag,
    pub attribute: TokenAttribute,
    pub char_start: u32,
    pub char_end: u32,
}

impl Token {
    pub fn identifier(self) -> Option<Identifier> {
        match self.attribute {
            TokenAttribute::Id(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(TokenTag::keyword("struct"), Some(TokenTag::KwStruct));
        assert_eq!(TokenTag::keyword("cast_raw"), Some(TokenTag::KwCastRaw));
        assert_eq!(TokenTag::keyword("not_a_keyword"), None);
    }
}
