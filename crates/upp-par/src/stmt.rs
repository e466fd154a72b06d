//! Statement and code-block parsing.

use crate::ast::{NodeId, NodeKind};
use crate::parser::Parser;
use upp_lex::TokenTag;

impl Parser<'_> {
    /// `{ statements }`
    pub fn parse_code_block(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.expect(TokenTag::LBrace, "to open block");

        let mut statements = Vec::new();
        while self.stream.current() != TokenTag::RBrace && !self.stream.is_at_end() {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => {
                    self.recover_to_statement_start();
                    statements.push(self.push_error_node());
                }
            }
        }
        self.expect(TokenTag::RBrace, "to close block");

        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::CodeBlock { statements }, range))
    }

    pub fn parse_statement(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        match self.stream.current() {
            TokenTag::LBrace => self.parse_code_block(),
            TokenTag::Semicolon => {
                self.stream.advance();
                self.parse_statement()
            }
            TokenTag::KwIf => self.parse_if(),
            TokenTag::KwWhile => {
                self.stream.advance();
                let condition = self.parse_expression()?;
                let block = self.parse_code_block()?;
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::WhileStatement { condition, block }, range))
            }
            TokenTag::KwFor => self.parse_foreach(),
            TokenTag::KwSwitch => self.parse_switch(),
            TokenTag::KwDefer => {
                self.stream.advance();
                let block = if self.stream.current() == TokenTag::LBrace {
                    self.parse_code_block()?
                } else {
                    // `defer f();` - wrap the single statement in a block
                    let stmt = self.parse_statement()?;
                    let range = self.stream.range_from(start);
                    self.ast.push(
                        NodeKind::CodeBlock {
                            statements: vec![stmt],
                        },
                        range,
                    )
                };
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::DeferStatement { block }, range))
            }
            TokenTag::KwReturn => {
                self.stream.advance();
                let value = if self.stream.current() == TokenTag::Semicolon {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenTag::Semicolon, "after return");
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::ReturnStatement { value }, range))
            }
            TokenTag::KwBreak => {
                self.stream.advance();
                self.expect(TokenTag::Semicolon, "after break");
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::BreakStatement, range))
            }
            TokenTag::KwContinue => {
                self.stream.advance();
                self.expect(TokenTag::Semicolon, "after continue");
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::ContinueStatement, range))
            }
            // `name :` / `name ::` starts a local definition
            TokenTag::Identifier
                if matches!(
                    self.stream.peek(1),
                    TokenTag::Colon | TokenTag::ColonColon
                ) =>
            {
                self.parse_definition()
            }
            _ => {
                let expr = self.parse_expression()?;
                if self.stream.eat(TokenTag::Assign) {
                    let value = self.parse_expression()?;
                    self.expect(TokenTag::Semicolon, "after assignment");
                    let range = self.stream.range_from(start);
                    return Some(self.ast.push(
                        NodeKind::Assignment {
                            target: expr,
                            value,
                        },
                        range,
                    ));
                }
                self.expect(TokenTag::Semicolon, "after expression statement");
                let range = self.stream.range_from(start);
                Some(self.ast.push(NodeKind::ExpressionStatement { expr }, range))
            }
        }
    }

    fn parse_if(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // if
        let condition = self.parse_expression()?;
        let then_block = self.parse_code_block()?;
        let else_block = if self.stream.eat(TokenTag::KwElse) {
            if self.stream.current() == TokenTag::KwIf {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_code_block()?)
            }
        } else {
            None
        };
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::IfStatement {
                condition,
                then_block,
                else_block,
            },
            range,
        ))
    }

    /// `for it in expr { }` / `for it, idx in expr { }`
    fn parse_foreach(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // for
        let loop_variable = self.expect_identifier("as loop variable")?;
        let index_variable = if self.stream.eat(TokenTag::Comma) {
            Some(self.expect_identifier("as index variable")?)
        } else {
            None
        };
        self.expect(TokenTag::KwIn, "in foreach loop");
        let iterable = self.parse_expression()?;
        let block = self.parse_code_block()?;
        let range = self.stream.range_from(start);
        Some(self.ast.push(
            NodeKind::ForeachStatement {
                loop_variable,
                index_variable,
                iterable,
                block,
            },
            range,
        ))
    }

    fn parse_switch(&mut self) -> Option<NodeId> {
        let start = self.stream.current_index();
        self.stream.advance(); // switch
        let value = self.parse_expression()?;
        self.expect(TokenTag::LBrace, "to open switch body");

        let mut cases = Vec::new();
        while self.stream.current() != TokenTag::RBrace && !self.stream.is_at_end() {
            let case_start = self.stream.current_index();
            let case_value = match self.stream.current() {
                TokenTag::KwCase => {
                    self.stream.advance();
                    Some(self.parse_expression()?)
                }
                TokenTag::KwDefault => {
                    self.stream.advance();
                    None
                }
                _ => {
                    self.error_here("expected 'case' or 'default' in switch");
                    return None;
                }
            };
            let block = self.parse_code_block()?;
            let range = self.stream.range_from(case_start);
            cases.push(self.ast.push(
                NodeKind::SwitchCase {
                    value: case_value,
                    block,
                },
                range,
            ));
        }
        self.expect(TokenTag::RBrace, "to close switch body");

        let range = self.stream.range_from(start);
        Some(self.ast.push(NodeKind::SwitchStatement { value, cases }, range))
    }
}
