//! Semantic error taxonomy.
//!
//! The set of error kinds is closed; diagnostics rendering and the editor
//! layer match over it exhaustively. Errors never unwind analysis: they
//! bump the current workload's error counter and analysis continues with
//! `Unknown` so dependents report their own downgraded errors instead of
//! deadlocking.

use upp_util::{Identifier, TextIndex, UnitId};

use crate::types::TypeId;

/// Closed set of semantic error kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum SemanticErrorKind {
    UnresolvedSymbol { id: Identifier },
    SymbolRedefined { id: Identifier },
    InvalidTypeForOperation { given: TypeId },
    TypeMismatch { expected: TypeId, given: TypeId },
    ArgumentCountMismatch { expected: usize, given: usize },
    MissingReturn,
    NoMainFunction,
    MainHasWrongSignature,
    CyclicDependency,
    InvalidCast { from: TypeId, to: TypeId, reason: &'static str },
    StructMemberNotFound { id: Identifier },
    DeferContainsReturn,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    TemplateArgumentCountMismatch { expected: usize, given: usize },
    TemplateArgumentsOnNonTemplate,
    TemplateArgumentsRequired,
    ExternHeaderParseFailed { header: String },
    ExternHeaderMissingSymbol { id: Identifier },
    UnreachableStatement,
    WhileLoopTriviallyTerminating,
    WhileLoopNonTerminating,
    WhileLoopAlwaysReturns,
    SwitchOnEmptyEnum,
    InvalidSwitchCase,
    ExpectedTypeGotValue,
    ExpectedValueGotType,
    ComptimeEvaluationFailed { message: &'static str },
    ConstantPoolRejected { message: String },
    /// Non-integer array size (not implemented in the source language yet)
    NonIntegerArraySize,
    /// Nested defer (not implemented)
    NestedDefer,
    /// Global template (not implemented)
    GlobalTemplate,
    /// Extern inside template (not implemented)
    ExternInsideTemplate,
}

impl SemanticErrorKind {
    /// Short machine-readable name, used by diagnostics and tests.
    pub fn name(&self) -> &'static str {
        match self {
            SemanticErrorKind::UnresolvedSymbol { .. } => "unresolved symbol",
            SemanticErrorKind::SymbolRedefined { .. } => "symbol redefined",
            SemanticErrorKind::InvalidTypeForOperation { .. } => "invalid type for operation",
            SemanticErrorKind::TypeMismatch { .. } => "type mismatch",
            SemanticErrorKind::ArgumentCountMismatch { .. } => "argument count mismatch",
            SemanticErrorKind::MissingReturn => "missing return",
            SemanticErrorKind::NoMainFunction => "no main",
            SemanticErrorKind::MainHasWrongSignature => "main has wrong signature",
            SemanticErrorKind::CyclicDependency => "cyclic unbreakable dependency",
            SemanticErrorKind::InvalidCast { .. } => "invalid cast",
            SemanticErrorKind::StructMemberNotFound { .. } => "struct member not found",
            SemanticErrorKind::DeferContainsReturn => "defer contains return",
            SemanticErrorKind::BreakOutsideLoop => "break outside loop",
            SemanticErrorKind::ContinueOutsideLoop => "continue outside loop",
            SemanticErrorKind::TemplateArgumentCountMismatch { .. } => {
                "template argument count mismatch"
            }
            SemanticErrorKind::TemplateArgumentsOnNonTemplate => {
                "template arguments on non-template"
            }
            SemanticErrorKind::TemplateArgumentsRequired => "template arguments required",
            SemanticErrorKind::ExternHeaderParseFailed { .. } => "extern header parse failed",
            SemanticErrorKind::ExternHeaderMissingSymbol { .. } => "extern header missing symbol",
            SemanticErrorKind::UnreachableStatement => "unreachable statement",
            SemanticErrorKind::WhileLoopTriviallyTerminating => {
                "while loop trivially terminating"
            }
            SemanticErrorKind::WhileLoopNonTerminating => "while loop non-terminating",
            SemanticErrorKind::WhileLoopAlwaysReturns => "while loop always returns",
            SemanticErrorKind::SwitchOnEmptyEnum => "switch on empty enum",
            SemanticErrorKind::InvalidSwitchCase => "invalid switch case",
            SemanticErrorKind::ExpectedTypeGotValue => "expected type",
            SemanticErrorKind::ExpectedValueGotType => "expected value",
            SemanticErrorKind::ComptimeEvaluationFailed { .. } => "comptime evaluation failed",
            SemanticErrorKind::ConstantPoolRejected { .. } => "constant rejected",
            SemanticErrorKind::NonIntegerArraySize => "non-integer array size",
            SemanticErrorKind::NestedDefer => "nested defer",
            SemanticErrorKind::GlobalTemplate => "global template",
            SemanticErrorKind::ExternInsideTemplate => "extern inside template",
        }
    }
}

/// A recorded semantic error with its source anchor.
#[derive(Clone, Debug)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub unit: UnitId,
    pub node: upp_par::NodeId,
    /// Position of the error's anchor token
    pub text_index: TextIndex,
    /// Errors caused by an upstream `Unknown` are counted separately so the
    /// top-level list stays de-duplicated
    pub due_to_unknown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        let pool = upp_util::IdentifierPool::new();
        let id = {
            let lock = pool.lock();
            pool.add(&lock, "x")
        };
        let kind = SemanticErrorKind::UnresolvedSymbol { id };
        assert_eq!(kind.name(), "unresolved symbol");
        assert_eq!(SemanticErrorKind::NoMainFunction.name(), "no main");
    }
}
