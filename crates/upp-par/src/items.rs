//! Top-level item parsing: imports, context changes, definitions.

use crate::ast::{ContextChangeKind, DefinitionKind, ImportKind, NodeId, NodeKind};
use crate::parser::Parser;
use upp_lex::TokenTag;

impl Parser<'_> {
    /// Parse one top-level item. Returns `None` on failure; the caller
    /// resynchronizes.
    pub fn parse_item(&mut self) -> Option<NodeId> {
        match self.stream.current() {
            TokenTag::KwImport => self.parse_import(),
            TokenTag::KwContext => self.parse_context_change(),
            TokenTag::Identifier => self.parse_definition(),
            TokenTag::Semicolon => {
                self.stream.advance();
                self.parse_item()
            }
            _ => {
                self.error_here("expected definition, import, or context change");
                None
            }
        }
    }

    /// `import A::B::C;`, `import A::B as Alias;`, `import A as .;`
    fn parse_import(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // import

        let mut path = vec![self.expect_identifier("in import path")?];
        while self.stream.eat(TokenTag::ColonColon) {
            path.push(self.expect_identifier("in import path")?);
        }

        let mut alias = None;
        let mut kind = ImportKind::Symbols;
        if self.stream.eat(TokenTag::KwAs) {
            if self.stream.eat(TokenTag::Dot) {
                kind = ImportKind::DotCalls;
            } else {
                alias = Some(self.expect_identifier("after 'as'")?);
                kind = ImportKind::None;
            }
        }
        self.expect(TokenTag::Semicolon, "after import");

        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::Import { path, alias, kind }, range))
    }

    /// `context cast(f :: (x: int) -> float { ... });` and friends.
    fn parse_context_change(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // context

        let kind = match self.stream.current() {
            TokenTag::KwCast => {
                self.stream.advance();
                ContextChangeKind::Cast
            }
            TokenTag::Identifier => {
                let id = self.expect_identifier("after 'context'")?;
                match self.pool.get(id) {
                    "binop" => ContextChangeKind::Binop,
                    "unop" => ContextChangeKind::Unop,
                    "array_access" => ContextChangeKind::ArrayAccess,
                    "dot_call" => ContextChangeKind::DotCall,
                    "iterator" => ContextChangeKind::Iterator,
                    "cast_mode" => ContextChangeKind::CastMode,
                    other => {
                        self.error_here(format!("unknown context change kind '{other}'"));
                        return None;
                    }
                }
            }
            _ => {
                self.error_here("expected context change kind");
                return None;
            }
        };

        self.expect(TokenTag::LParen, "after context change kind");
        let mut changes = Vec::new();
        if self.stream.current() != TokenTag::RParen {
            loop {
                let change = self.parse_context_change_entry()?;
                changes.push(change);
                if !self.stream.eat(TokenTag::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenTag::RParen, "to close context change");
        self.expect(TokenTag::Semicolon, "after context change");

        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::ContextChange { kind, changes }, range))
    }

    /// A context change entry is either a named definition (`f :: expr`) or
    /// a plain expression.
    fn parse_context_change_entry(&mut self) -> Option<NodeId> {
        if self.stream.current() == TokenTag::Identifier
            && self.stream.peek(1) == TokenTag::ColonColon
        {
            let start = self.stream.current_index();
            let name = self.expect_identifier("in context change")?;
            self.stream.advance(); // ::
            let value = self.parse_expression()?;
            let range = self.stream.range_from(start);
            return Some(self.ast.push(
                NodeKind::Definition {
                    name,
                    kind: DefinitionKind::Comptime,
                    type_node: None,
                    value: Some(value),
                },
                range,
            ));
        }
        self.parse_expression()
    }

    /// `name :: value`, `name : T`, `name : T = value`, `name := value`.
    ///
    /// Used both for top-level items and for local variable definitions.
    pub fn parse_definition(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        let name = self.expect_identifier("at start of definition")?;

        if self.stream.eat(TokenTag::ColonColon) {
            let value = self.parse_expression()?;
            // Brace-closed values (functions, structs) need no semicolon
            self.stream.eat(TokenTag::Semicolon);
            let range = self.stream.range_from(start);
            return Some(self.ast.push(
                NodeKind::Definition {
                    name,
                    kind: DefinitionKind::Comptime,
                    type_node: None,
                    value: Some(value),
                },
                range,
            ));
        }

        if !self.expect(TokenTag::Colon, "in definition") {
            return None;
        }

        // `name := value` - inferred type
        if self.stream.eat(TokenTag::Assign) {
            let value = self.parse_expression()?;
            self.expect(TokenTag::Semicolon, "after definition");
            let range = self.stream.range_from(start);
            return Some(self.ast.push(
                NodeKind::Definition {
                    name,
                    kind: DefinitionKind::Runtime,
                    type_node: None,
                    value: Some(value),
                },
                range,
            ));
        }

        let type_node = self.parse_type_expression()?;
        let value = if self.stream.eat(TokenTag::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenTag::Semicolon, "after definition");
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::Definition {
                name,
                kind: DefinitionKind::Runtime,
                type_node: Some(type_node),
                value,
            },
            range,
        ))
    }

    /// `name: T`, `$name: T`, optionally `= default`.
    pub fn parse_parameter(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        let is_comptime = self.stream.eat(TokenTag::Dollar);
        let name = self.expect_identifier("in parameter")?;
        self.expect(TokenTag::Colon, "after parameter name");
        let type_node = self.parse_type_expression()?;
        let default_value = if self.stream.eat(TokenTag::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::Parameter {
                name,
                is_comptime,
                type_node,
                default_value,
            },
            range,
        ))
    }
}
