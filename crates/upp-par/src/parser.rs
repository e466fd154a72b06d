//! Parser driver and error recovery.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::stream::TokenStream;
use upp_lex::{LexedUnit, TokenAttribute, TokenTag};
use upp_util::{
    Handler, Identifier, IdentifierPool, SourceBuffer, TextRange, TokenIndex, TokenRange, UnitId,
};

pub struct Parser<'a> {
    pub stream: TokenStream,
    pub ast: Ast,
    pub handler: &'a Handler,
    pub buffer: &'a SourceBuffer,
    pub pool: &'a IdentifierPool,
    pub unit: UnitId,
}

/// Parse one lexed unit into its AST. The root node is a module containing
/// every top-level item.
pub fn parse_unit(
    lexed: &LexedUnit,
    buffer: &SourceBuffer,
    unit: UnitId,
    pool: &IdentifierPool,
    handler: &Handler,
) -> Ast {
    let mut parser = Parser {
        stream: TokenStream::new(lexed),
        ast: Ast::new(unit),
        handler,
        buffer,
        pool,
        unit,
    };

    let start = parser.stream.current_index();
    let mut items = Vec::new();
    while !parser.stream.is_at_end() {
        match parser.parse_item() {
            Some(item) => items.push(item),
            None => parser.recover_to_item_start(),
        }
    }
    let range = parser.stream.range_from(start);
    let root = parser.ast.push(NodeKind::Module { items }, range);
    parser.ast.root = Some(root);
    parser.ast.assign_parents();
    parser.ast
}

impl Parser<'_> {
    pub fn error_here(&self, message: impl Into<String>) {
        let index = self.stream.current_index();
        let range = TokenRange::new(index, TokenIndex::new(index.line, index.token + 1));
        self.error_at_range(message, range);
    }

    pub fn error_at_range(&self, message: impl Into<String>, range: TokenRange) {
        let text_range: TextRange = self.buffer.token_range_to_text_range(range);
        self.handler.error(message, self.unit, text_range);
    }

    /// Expect and consume a token; report and leave the stream untouched on
    /// mismatch.
    pub fn expect(&mut self, tag: TokenTag, context: &str) -> bool {
        if self.stream.eat(tag) {
            true
        } else {
            self.error_here(format!("expected {tag:?} {context}"));
            false
        }
    }

    /// Consume an identifier token and return its handle.
    pub fn expect_identifier(&mut self, context: &str) -> Option<Identifier> {
        if self.stream.current() == TokenTag::Identifier {
            let id = match self.stream.current_attribute() {
                TokenAttribute::Id(id) => id,
                _ => return None,
            };
            self.stream.advance();
            Some(id)
        } else {
            self.error_here(format!("expected identifier {context}"));
            None
        }
    }

    pub fn push_error_node(&mut self) -> NodeId {
        let index = self.stream.current_index();
        self.ast.push(
            NodeKind::ErrorNode,
            TokenRange::new(index, TokenIndex::new(index.line, index.token + 1)),
        )
    }

    /// Skip to the next plausible item start after a parse failure.
    fn recover_to_item_start(&mut self) {
        let mut depth = 0usize;
        while !self.stream.is_at_end() {
            match self.stream.current() {
                TokenTag::LBrace => depth += 1,
                TokenTag::RBrace => {
                    depth = depth.saturating_sub(1);
                    self.stream.advance();
                    if depth == 0 {
                        return;
                    }
                    continue;
                }
                TokenTag::Semicolon if depth == 0 => {
                    self.stream.advance();
                    return;
                }
                TokenTag::KwImport | TokenTag::KwContext if depth == 0 => return,
                _ => {}
            }
            self.stream.advance();
        }
    }

    /// Skip to the next statement boundary inside a block.
    pub fn recover_to_statement_start(&mut self) {
        let mut depth = 0usize;
        while !self.stream.is_at_end() {
            match self.stream.current() {
                TokenTag::Semicolon if depth == 0 => {
                    self.stream.advance();
                    return;
                }
                TokenTag::LBrace => depth += 1,
                TokenTag::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.stream.advance();
        }
    }
}
