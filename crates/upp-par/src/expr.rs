//! Expression parsing with precedence climbing.

use crate::ast::{Binop, CastKeyword, NodeId, NodeKind, Unop};
use crate::parser::Parser;
use upp_lex::{TokenAttribute, TokenTag};

impl Parser<'_> {
    pub fn parse_expression(&mut self) -> Option<NodeId> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Option<NodeId> {
        let start = self.stream.current_index();
        let mut left = self.parse_unary()?;

        while let Some(op) = Binop::from_tag(self.stream.current()) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.stream.advance();
            let right = self.parse_binary(precedence + 1)?;
            let range = self.stream.range_from(start);
            left = self.ast.push(NodeKind::Binary { op, left, right }, range);
        }
        Some(left)
    }

    pub(crate) fn parse_unary(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        match self.stream.current() {
            TokenTag::Minus => {
                self.stream.advance();
                let operand = self.parse_unary()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(
                    NodeKind::Unary {
                        op: Unop::Negate,
                        operand,
                    },
                    range,
                ))
            }
            TokenTag::Not => {
                self.stream.advance();
                let operand = self.parse_unary()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(
                    NodeKind::Unary {
                        op: Unop::Not,
                        operand,
                    },
                    range,
                ))
            }
            TokenTag::Ampersand => {
                self.stream.advance();
                let operand = self.parse_unary()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(
                    NodeKind::Unary {
                        op: Unop::AddressOf,
                        operand,
                    },
                    range,
                ))
            }
            // `*?T` can only be an optional-pointer type; a bare `*x` is a
            // dereference, re-interpreted as a pointer type by the analyser
            // when the operand turns out to be a type.
            TokenTag::Star => {
                self.stream.advance();
                if self.stream.eat(TokenTag::Question) {
                    let element = self.parse_unary()?;
                    let range = self.stream.range_from(start);
                    Some(self.ast.push(
                        NodeKind::PointerType {
                            element,
                            optional: true,
                        },
                        range,
                    ))
                } else {
                    let operand = self.parse_unary()?;
                    let range = self.stream.range_from(start);
                    Some(self.ast.push(
                        NodeKind::Unary {
                            op: Unop::Dereference,
                            operand,
                        },
                        range,
                    ))
                }
            }
            TokenTag::Question => {
                self.stream.advance();
                let child = self.parse_unary()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::OptionalType { child }, range))
            }
            TokenTag::LBracket => self.parse_array_or_slice_type(),
            TokenTag::KwCast => self.parse_cast(CastKeyword::Cast),
            TokenTag::KwCastRaw => self.parse_cast(CastKeyword::CastRaw),
            TokenTag::KwCastPointer => self.parse_cast(CastKeyword::CastPointer),
            TokenTag::KwBake => {
                self.stream.advance();
                let expr = self.parse_expression()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::Bake { expr }, range))
            }
            _ => self.parse_postfix(),
        }
    }

    /// `cast{T} x`, `cast x`, `cast_raw{T} x`, `cast_pointer[{T}] x`.
    fn parse_cast(&mut self, keyword: CastKeyword) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance();
        let target = if self.stream.eat(TokenTag::LBrace) {
            let target = self.parse_type_expression()?;
            self.expect(TokenTag::RBrace, "to close cast target");
            Some(target)
        } else {
            if keyword == CastKeyword::CastRaw {
                self.error_here("cast_raw requires an explicit target type");
            }
            None
        };
        let operand = self.parse_unary()?;
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::Cast {
                keyword,
                target,
                operand,
            },
            range,
        ))
    }

    fn parse_postfix(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        let mut expr = self.parse_primary()?;

        loop {
            match self.stream.current() {
                TokenTag::LParen => {
                    self.stream.advance();
                    let arguments = self.parse_arguments()?;
                    let range = self.stream.range_from(start);
                    expr = self.ast.push(
                        NodeKind::Call {
                            callee: expr,
                            arguments,
                        },
                        range,
                    );
                }
                TokenTag::Dot => {
                    self.stream.advance();
                    let member = self.expect_identifier("after '.'")?;
                    let range = self.stream.range_from(start);
                    expr = self.ast.push(NodeKind::MemberAccess { base: expr, member }, range);
                }
                TokenTag::LBracket => {
                    self.stream.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenTag::RBracket, "to close array access");
                    let range = self.stream.range_from(start);
                    expr = self.ast.push(NodeKind::ArrayAccess { base: expr, index }, range);
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_arguments(&mut self) -> Option<Vec<NodeId>> {
        let mut arguments = Vec::new();
        if self.stream.current() != TokenTag::RParen {
            loop {
                let start = self.stream.current_index();
                // `name = expr` is a named argument
                let name = if self.stream.current() == TokenTag::Identifier
                    && self.stream.peek(1) == TokenTag::Assign
                {
                    let name = self.expect_identifier("in argument")?;
                    self.stream.advance(); // =
                    Some(name)
                } else {
                    None
                };
                let value = self.parse_expression()?;
                let range = self.stream.range_from(start);
                arguments.push(self.ast.push(NodeKind::Argument { name, value }, range));
                if !self.stream.eat(TokenTag::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenTag::RParen, "to close arguments");
        Some(arguments)
    }

    fn parse_primary(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        match self.stream.current() {
            TokenTag::IntLiteral => {
                let value = match self.stream.current_attribute() {
                    TokenAttribute::Int(v) => v,
                    _ => 0,
                };
                self.stream.advance();
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::IntLiteral(value), range))
            }
            TokenTag::FloatLiteral => {
                let value = match self.stream.current_attribute() {
                    TokenAttribute::Float(v) => v,
                    _ => 0.0,
                };
                self.stream.advance();
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::FloatLiteral(value), range))
            }
            TokenTag::BoolLiteral => {
                let value = match self.stream.current_attribute() {
                    TokenAttribute::Bool(v) => v,
                    _ => false,
                };
                self.stream.advance();
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::BoolLiteral(value), range))
            }
            TokenTag::StringLiteral => {
                let value = match self.stream.current_attribute() {
                    TokenAttribute::Id(id) => id,
                    _ => return None,
                };
                self.stream.advance();
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::StringLiteral(value), range))
            }
            TokenTag::KwNull => {
                self.stream.advance();
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::NullLiteral, range))
            }
            TokenTag::Dollar => {
                self.stream.advance();
                let id = self.expect_identifier("after '$'")?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::PatternVariable { id }, range))
            }
            TokenTag::Identifier => {
                let mut path = vec![self.expect_identifier("in expression")?];
                while self.stream.current() == TokenTag::ColonColon
                    && self.stream.peek(1) == TokenTag::Identifier
                {
                    self.stream.advance();
                    path.push(self.expect_identifier("in path")?);
                }
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::SymbolLookup { path }, range))
            }
            TokenTag::KwStruct => self.parse_struct_literal(false),
            TokenTag::KwUnion => self.parse_struct_literal(true),
            TokenTag::KwEnum => self.parse_enum_literal(),
            TokenTag::KwModule => self.parse_module_literal(),
            TokenTag::LParen => self.parse_parenthesized_or_function(),
            _ => {
                self.error_here("expected expression");
                None
            }
        }
    }

    /// Disambiguate `(expr)` from `(params) -> R { body }` and `(params) -> R`
    /// by scanning for `->` after the matching closing parenthesis.
    fn parse_parenthesized_or_function(&mut self) -> Option<NodeId> {
        if self.looks_like_function_signature() {
            return self.parse_function_literal_or_type();
        }
        self.stream.advance(); // (
        let expr = self.parse_expression()?;
        self.expect(TokenTag::RParen, "to close parenthesized expression");
        Some(expr)
    }

    fn looks_like_function_signature(&self) -> bool {
        // Scan ahead to the matching ')' and check for '->'
        let mut depth = 0usize;
        for offset in 0..self.stream.remaining() {
            match self.stream.peek(offset) {
                TokenTag::LParen => depth += 1,
                TokenTag::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.stream.peek(offset + 1) == TokenTag::Arrow;
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// `(params) -> R { body }` is a function literal; without a body it is
    /// a function pointer type.
    fn parse_function_literal_or_type(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // (

        let mut parameters = Vec::new();
        if self.stream.current() != TokenTag::RParen {
            loop {
                parameters.push(self.parse_parameter()?);
                if !self.stream.eat(TokenTag::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenTag::RParen, "to close parameter list");
        self.expect(TokenTag::Arrow, "in function signature");

        // `()` return spelling means no return value
        let return_type = if self.stream.current() == TokenTag::LParen
            && self.stream.peek(1) == TokenTag::RParen
        {
            self.stream.advance();
            self.stream.advance();
            None
        } else {
            Some(self.parse_type_expression()?)
        };

        if self.stream.current() == TokenTag::LBrace {
            let body = self.parse_code_block()?;
            let range = self.stream.range_from(start);
            Some(self.ast.push(
                NodeKind::FunctionLiteral {
                    parameters,
                    return_type,
                    body: Some(body),
                },
                range,
            ))
        } else {
            let range = self.stream.range_from(start);
            Some(self.ast.push(
                NodeKind::FunctionType {
                    parameters,
                    return_type,
                },
                range,
            ))
        }
    }

    /// `struct [(params)] { members and subtypes }` / `union { ... }`
    fn parse_struct_literal(&mut self, is_union: bool) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // struct / union

        let mut parameters = Vec::new();
        if self.stream.eat(TokenTag::LParen) {
            if self.stream.current() != TokenTag::RParen {
                loop {
                    parameters.push(self.parse_parameter()?);
                    if !self.stream.eat(TokenTag::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenTag::RParen, "to close struct parameters");
        }

        self.expect(TokenTag::LBrace, "to open struct body");
        let mut members = Vec::new();
        let mut subtypes = Vec::new();
        while self.stream.current() != TokenTag::RBrace && !self.stream.is_at_end() {
            if self.stream.eat(TokenTag::Semicolon) {
                continue;
            }
            let member_start = self.stream.current_index();
            // `Name :: struct { ... }` inside a struct body declares a subtype
            if self.stream.current() == TokenTag::Identifier
                && self.stream.peek(1) == TokenTag::ColonColon
            {
                let item = self.parse_definition()?;
                subtypes.push(item);
                continue;
            }
            let name = self.expect_identifier("in struct member")?;
            self.expect(TokenTag::Colon, "after member name");
            let type_node = self.parse_type_expression()?;
            self.expect(TokenTag::Semicolon, "after struct member");
            let range = self.stream.range_from(member_start);
            members.push(self.ast.push(NodeKind::StructMember { name, type_node }, range));
        }
        self.expect(TokenTag::RBrace, "to close struct body");

        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::StructLiteral {
                is_union,
                parameters,
                members,
                subtypes,
            },
            range,
        ))
    }

    /// `module { items }` - a nested module as a definition value
    fn parse_module_literal(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // module
        self.expect(TokenTag::LBrace, "to open module body");
        let mut items = Vec::new();
        while self.stream.current() != TokenTag::RBrace && !self.stream.is_at_end() {
            match self.parse_item() {
                Some(item) => items.push(item),
                None => {
                    self.recover_to_statement_start();
                }
            }
        }
        self.expect(TokenTag::RBrace, "to close module body");
        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::Module { items }, range))
    }

    /// `enum { A; B = 4; }`
    fn parse_enum_literal(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // enum
        self.expect(TokenTag::LBrace, "to open enum body");

        let mut members = Vec::new();
        while self.stream.current() != TokenTag::RBrace && !self.stream.is_at_end() {
            if self.stream.eat(TokenTag::Semicolon) {
                continue;
            }
            let member_start = self.stream.current_index();
            let name = self.expect_identifier("in enum member")?;
            let value = if self.stream.eat(TokenTag::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(TokenTag::Semicolon, "after enum member");
            let range = self.stream.range_from(member_start);
            members.push(self.ast.push(NodeKind::EnumMember { name, value }, range));
        }
        self.expect(TokenTag::RBrace, "to close enum body");

        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::EnumLiteral { members }, range))
    }
}
