//! Core error types for the upp-util crate.

use thiserror::Error;

/// Error type for identifier pool operations
#[derive(Debug, Error)]
pub enum IdentPoolError {
    /// Handle not found in the pool
    #[error("identifier not found: index {index}")]
    NotFound { index: u32 },
}

/// Error type for source buffer operations
#[derive(Debug, Error)]
pub enum SourceError {
    /// Invalid line number
    #[error("invalid line number: {line} (buffer has {max_lines} lines)")]
    InvalidLine { line: usize, max_lines: usize },

    /// Invalid range
    #[error("invalid range: start {start:?} is past end {end:?}")]
    InvalidRange {
        start: crate::source::TextIndex,
        end: crate::source::TextIndex,
    },
}
