//! Diagnostic module - error and warning reporting infrastructure.
//!
//! The [`Handler`] collects diagnostics from every compiler phase. Phases
//! never unwind on user errors; they report here and continue with
//! best-effort recovery so one broken definition doesn't hide the rest of
//! the unit's problems.

use crate::source::{TextRange, UnitId};
use std::cell::RefCell;
use std::fmt;

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// An error that prevents the program from running
    Error,
    /// A warning that doesn't prevent compilation
    Warning,
    /// Additional information about a diagnostic
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
            Level::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with severity and location
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub unit: UnitId,
    pub range: TextRange,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, unit: UnitId, range: TextRange) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            unit,
            range,
        }
    }

    pub fn warning(message: impl Into<String>, unit: UnitId, range: TextRange) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
            unit,
            range,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}:{}..{}:{})",
            self.level,
            self.message,
            self.range.start.line,
            self.range.start.character,
            self.range.end.line,
            self.range.end.character
        )
    }
}

/// Collector for diagnostics emitted during compilation.
///
/// Interior mutability so a shared handler can be threaded through phases
/// that only hold `&self` borrows of the compiler context.
#[derive(Default)]
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn error(&self, message: impl Into<String>, unit: UnitId, range: TextRange) {
        self.emit(Diagnostic::error(message, unit, range));
    }

    pub fn warning(&self, message: impl Into<String>, unit: UnitId, range: TextRange) {
        self.emit(Diagnostic::warning(message, unit, range));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count()
    }

    /// Take all collected diagnostics, leaving the handler empty.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }

    /// Snapshot of collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TextIndex;

    #[test]
    fn collects_and_counts() {
        let handler = Handler::new();
        assert!(!handler.has_errors());
        handler.error("bad token", UnitId(0), TextRange::default());
        handler.warning("unused", UnitId(0), TextRange::default());
        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.diagnostics().len(), 2);
    }

    #[test]
    fn take_drains() {
        let handler = Handler::new();
        handler.error(
            "oops",
            UnitId(1),
            TextRange::point(TextIndex::new(3, 7)),
        );
        let taken = handler.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].range.start.line, 3);
        assert!(handler.diagnostics().is_empty());
    }

    #[test]
    fn display_formats() {
        let diag = Diagnostic::error("unexpected token", UnitId(0), TextRange::default());
        assert!(format!("{diag}").starts_with("error: unexpected token"));
    }
}
