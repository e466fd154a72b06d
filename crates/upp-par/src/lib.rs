//! upp-par - AST Model & Parser
//!
//! Parses the token stream of one compilation unit into an immutable tree
//! of AST nodes. Nodes live in a per-unit arena ([`ast::Ast`]) and are
//! addressed by [`ast::NodeId`]; every node carries the token range it
//! covers so later stages and the editor layer can map analysis facts back
//! to source positions.
//!
//! The parser is a plain recursive-descent parser with precedence climbing
//! for binary expressions. Parse errors are reported to the shared
//! diagnostic handler and recovery skips to the next plausible
//! synchronization token, so one malformed definition doesn't take the
//! rest of the unit down with it.

pub mod ast;
mod expr;
mod items;
mod parser;
mod stmt;
mod stream;
mod types;

pub use ast::{Ast, Node, NodeId, NodeKind};
pub use parser::parse_unit;
