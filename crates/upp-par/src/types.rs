//! Type expression parsing.
//!
//! Types are expressions in Upp: `int` is a symbol lookup that resolves to
//! a type value, `Node(i32)` is a call instantiating a polymorphic struct.
//! Only the type-level sigils (`*`, `*?`, `?`, `[..]`) need dedicated
//! prefix handling, which `parse_unary` already provides. The entry point
//! here restricts the grammar to unary expressions so `a: int = 3` doesn't
//! swallow the initializer into a comparison.

use crate::ast::{NodeId, NodeKind};
use crate::parser::Parser;
use upp_lex::TokenTag;

impl Parser<'_> {
    /// Parse a type position: a unary-level expression.
    pub fn parse_type_expression(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        match self.stream.current() {
            TokenTag::LBracket => self.parse_array_or_slice_type(),
            TokenTag::Star => {
                self.stream.advance();
                let optional = self.stream.eat(TokenTag::Question);
                let element = self.parse_type_expression()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::PointerType { element, optional }, range))
            }
            TokenTag::Question => {
                self.stream.advance();
                let child = self.parse_type_expression()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::OptionalType { child }, range))
            }
            _ => {
                // Symbol lookups, instantiation calls, function types,
                // bakes; all handled by the unary expression grammar.
                self.parse_unary()
            }
        }
    }

    /// `[4]T` array, `[]T` slice, `[expr]T` comptime-sized array.
    pub fn parse_array_or_slice_type(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.expect(TokenTag::LBracket, "to open array type");
        if self.stream.eat(TokenTag::RBracket) {
            let element = self.parse_type_expression()?;
            let range = self.stream.range_from(start);
            return Some(self.ast.push(NodeKind::SliceType { element }, range));
        }
        let count = self.parse_expression()?;
        self.expect(TokenTag::RBracket, "to close array count");
        let element = self.parse_type_expression()?;
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::ArrayType {
                count: Some(count),
                element,
            },
            range,
        ))
    }

}
