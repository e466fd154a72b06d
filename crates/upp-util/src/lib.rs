//! upp-util - Core Utilities and Foundation Types
//!
//! Foundation crate for the Upp compiler. Everything here is a zero-cost
//! abstraction shared by every later phase:
//!
//! - [`ident`]: the identifier pool. Every name the compiler ever touches is
//!   interned once and handled as a stable, pointer-identity [`Identifier`].
//! - [`index_vec`]: typed index vectors. All compiler graphs (types, symbols,
//!   workloads, AST nodes) are stored in arenas indexed by newtype ids, so
//!   mixing up id spaces is a compile error instead of a runtime bug.
//! - [`source`]: immutable line-indexed source buffers plus the
//!   text-position and token-position range types later stages attach to
//!   every node and error.
//! - [`diagnostic`]: the error/warning reporting surface shared by the
//!   lexer, parser, and semantic analyser.

pub mod diagnostic;
pub mod error;
pub mod ident;
pub mod index_vec;
pub mod source;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use error::{IdentPoolError, SourceError};
pub use ident::{Identifier, IdentifierPool, PoolLock};
pub use index_vec::{Idx, IndexVec};
pub use source::{SourceBuffer, SourceUnit, TextIndex, TextRange, TokenIndex, TokenRange, UnitId};

// Re-export commonly used hash collections
pub use rustc_hash::{FxHashMap, FxHashSet};
