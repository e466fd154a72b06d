//! Identifier pool - string interning for compiler names.
//!
//! Every name the compiler handles (source identifiers, fabricated names,
//! hardcoded function names) is interned into an [`IdentifierPool`] exactly
//! once. The returned [`Identifier`] handle is a compact 4-byte value whose
//! equality and hash are identity operations, so symbol tables and operator
//! contexts never compare string bytes after lexing.
//!
//! # Memory Layout
//!
//! Interned strings are allocated on the heap and leaked (intentionally) to
//! obtain `'static` lifetime references. This is safe because:
//! 1. The pool lives for the entire compilation
//! 2. Interned strings are never removed
//! 3. This avoids lifetime tracking overhead
//!
//! # Locking
//!
//! Handle reads are non-locking; handles are stable for the pool's life.
//! Mutation is gated behind a cooperative [`PoolLock`] acquired with
//! [`IdentifierPool::lock`]. Acquire/release must pair; acquiring twice is
//! an invariant violation and panics.

use ahash::AHasher;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// An interned name.
///
/// Equality is pointer identity: two `Identifier`s compare equal exactly
/// when they were interned from equal strings in the same pool. Hashing is
/// identity hashing over the handle value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    index: u32,
}

impl Identifier {
    /// Get the raw index value (serialization and debugging)
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.index
    }

    /// Returns true if this is a predefined identifier
    #[inline]
    pub fn is_predefined(self) -> bool {
        self.index < PREDEFINED_END
    }
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identifier({})", self.index)
    }
}

// ----------------------------------------------------------------------------
// Predefined identifiers
// ----------------------------------------------------------------------------
//
// Allocated eagerly at pool creation so they have stable, predictable
// handles. The order here must match PREDEFINED_NAMES below.

/// `main` entry point name
pub const ID_MAIN: Identifier = Identifier { index: 0 };
/// `tag` member of subtype structs
pub const ID_TAG: Identifier = Identifier { index: 1 };
/// `size` member of slices
pub const ID_SIZE: Identifier = Identifier { index: 2 };
/// `data` member of slices
pub const ID_DATA: Identifier = Identifier { index: 3 };
/// `value` member of optionals
pub const ID_VALUE: Identifier = Identifier { index: 4 };
/// `is_available` member of optionals
pub const ID_IS_AVAILABLE: Identifier = Identifier { index: 5 };
/// `bytes` member of c_string
pub const ID_BYTES: Identifier = Identifier { index: 6 };
/// Fabricated name for bake functions
pub const ID_BAKE_FUNCTION: Identifier = Identifier { index: 7 };
/// Fabricated name for lambda functions
pub const ID_LAMBDA_FUNCTION: Identifier = Identifier { index: 8 };
/// `it` foreach loop variable
pub const ID_IT: Identifier = Identifier { index: 9 };
/// `it_index` foreach index variable
pub const ID_IT_INDEX: Identifier = Identifier { index: 10 };

// Hardcoded function names, pre-bound in the builtin module.
pub const ID_PRINT_BOOL: Identifier = Identifier { index: 11 };
pub const ID_PRINT_I32: Identifier = Identifier { index: 12 };
pub const ID_PRINT_F32: Identifier = Identifier { index: 13 };
pub const ID_PRINT_STRING: Identifier = Identifier { index: 14 };
pub const ID_PRINT_LINE: Identifier = Identifier { index: 15 };
pub const ID_READ_I32: Identifier = Identifier { index: 16 };
pub const ID_READ_F32: Identifier = Identifier { index: 17 };
pub const ID_READ_BOOL: Identifier = Identifier { index: 18 };
pub const ID_MEMORY_COPY: Identifier = Identifier { index: 19 };
pub const ID_MEMORY_ZERO: Identifier = Identifier { index: 20 };
pub const ID_MEMORY_COMPARE: Identifier = Identifier { index: 21 };
pub const ID_TYPE_OF: Identifier = Identifier { index: 22 };
pub const ID_TYPE_INFO: Identifier = Identifier { index: 23 };
pub const ID_ASSERT: Identifier = Identifier { index: 24 };
pub const ID_PANIC: Identifier = Identifier { index: 25 };
pub const ID_SIZE_OF: Identifier = Identifier { index: 26 };
pub const ID_ALIGN_OF: Identifier = Identifier { index: 27 };
pub const ID_RETURN_TYPE: Identifier = Identifier { index: 28 };
pub const ID_STRUCT_TAG: Identifier = Identifier { index: 29 };
pub const ID_BITWISE_NOT: Identifier = Identifier { index: 30 };
pub const ID_BITWISE_AND: Identifier = Identifier { index: 31 };
pub const ID_BITWISE_OR: Identifier = Identifier { index: 32 };
pub const ID_BITWISE_XOR: Identifier = Identifier { index: 33 };
pub const ID_BITWISE_SHIFT_LEFT: Identifier = Identifier { index: 34 };
pub const ID_BITWISE_SHIFT_RIGHT: Identifier = Identifier { index: 35 };

const PREDEFINED_NAMES: &[&str] = &[
    "main",
    "tag",
    "size",
    "data",
    "value",
    "is_available",
    "bytes",
    "bake_function",
    "lambda_function",
    "it",
    "it_index",
    "print_bool",
    "print_i32",
    "print_f32",
    "print_string",
    "print_line",
    "read_i32",
    "read_f32",
    "read_bool",
    "memory_copy",
    "memory_zero",
    "memory_compare",
    "type_of",
    "type_info",
    "assert",
    "panic",
    "size_of",
    "align_of",
    "return_type",
    "struct_tag",
    "bitwise_not",
    "bitwise_and",
    "bitwise_or",
    "bitwise_xor",
    "bitwise_shift_left",
    "bitwise_shift_right",
];

const PREDEFINED_END: u32 = PREDEFINED_NAMES.len() as u32;

/// Cooperative lock handle gating pool mutation.
///
/// Obtained from [`IdentifierPool::lock`]; released on drop. APIs that may
/// mutate the pool take `&PoolLock` so the pairing is enforced by the type
/// system rather than by convention.
pub struct PoolLock<'a> {
    pool: &'a IdentifierPool,
}

impl Drop for PoolLock<'_> {
    fn drop(&mut self) {
        self.pool.locked.store(false, Ordering::Release);
    }
}

/// String interning pool with stable handles.
///
/// Uses a hash-keyed map with linear probing for collisions; handle reads
/// never block interning.
pub struct IdentifierPool {
    /// Maps string hash to (string, handle index)
    by_hash: DashMap<u64, (&'static str, u32)>,
    /// Maps handle index back to the string
    by_index: DashMap<u32, &'static str>,
    /// Counter for the next handle index
    next_index: AtomicU32,
    /// Cooperative mutation gate
    locked: AtomicBool,
}

impl IdentifierPool {
    /// Create a pool with all predefined identifiers inserted.
    pub fn new() -> Self {
        let pool = Self {
            by_hash: DashMap::with_capacity(256),
            by_index: DashMap::with_capacity(256),
            next_index: AtomicU32::new(PREDEFINED_END),
            locked: AtomicBool::new(false),
        };
        for (idx, name) in PREDEFINED_NAMES.iter().enumerate() {
            let interned: &'static str = Box::leak(name.to_string().into_boxed_str());
            let hash = Self::hash_string(name);
            pool.by_hash.insert(hash, (interned, idx as u32));
            pool.by_index.insert(idx as u32, interned);
        }
        pool
    }

    /// Acquire the cooperative mutation lock.
    ///
    /// # Panics
    ///
    /// Panics if the lock is already held; acquire/release must pair.
    pub fn lock(&self) -> PoolLock<'_> {
        let was_locked = self.locked.swap(true, Ordering::Acquire);
        assert!(!was_locked, "identifier pool lock acquired twice");
        PoolLock { pool: self }
    }

    /// Intern a string, returning its handle.
    ///
    /// Idempotent: equal input yields the same handle regardless of source
    /// allocation. Requires the pool lock since a miss mutates the pool.
    pub fn add(&self, _lock: &PoolLock<'_>, string: &str) -> Identifier {
        let hash = Self::hash_string(string);

        if let Some(entry) = self.by_hash.get(&hash) {
            if entry.value().0 == string {
                return Identifier {
                    index: entry.value().1,
                };
            }
            // Hash collision, probe for the real slot
            return self.add_with_probing(string, hash);
        }

        let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        self.by_hash.insert(hash, (interned, index));
        self.by_index.insert(index, interned);
        Identifier { index }
    }

    /// Probe with a prime-based offset until the string or a free slot is
    /// found.
    fn add_with_probing(&self, string: &str, original_hash: u64) -> Identifier {
        const MAX_PROBES: u64 = 32;
        const PROBE_PRIME: u64 = 0x9e3779b97f4a7c15;

        for i in 1u64..=MAX_PROBES {
            let probe_hash = original_hash.wrapping_add(i.wrapping_mul(PROBE_PRIME));
            if let Some(entry) = self.by_hash.get(&probe_hash) {
                if entry.value().0 == string {
                    return Identifier {
                        index: entry.value().1,
                    };
                }
            } else {
                let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
                let index = self.next_index.fetch_add(1, Ordering::Relaxed);
                self.by_hash.insert(probe_hash, (interned, index));
                self.by_index.insert(index, interned);
                return Identifier { index };
            }
        }

        unreachable!("identifier pool exceeded {MAX_PROBES} hash collisions for one bucket");
    }

    /// Get the string for a handle. Non-locking; handles are stable.
    #[inline]
    pub fn get(&self, id: Identifier) -> &'static str {
        self.by_index
            .get(&id.index)
            .map(|entry| *entry.value())
            .unwrap_or("")
    }

    /// Number of interned strings
    #[inline]
    pub fn len(&self) -> usize {
        self.next_index.load(Ordering::Relaxed) as usize
    }

    /// Returns true if only predefined identifiers are present
    #[inline]
    pub fn is_empty(&self) -> bool {
        false // predefined identifiers are always present
    }

    #[inline]
    fn hash_string(string: &str) -> u64 {
        let mut hasher = AHasher::default();
        string.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for IdentifierPool {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_eq_size!(Identifier, u32);
static_assertions::assert_impl_all!(Identifier: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        let a = pool.add(&lock, "hello");
        let b = pool.add(&lock, "hello");
        let c = pool.add(&lock, "world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.get(a), "hello");
        assert_eq!(pool.get(c), "world");
    }

    #[test]
    fn predefined_identifiers_are_stable() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        assert_eq!(pool.add(&lock, "main"), ID_MAIN);
        assert_eq!(pool.add(&lock, "tag"), ID_TAG);
        assert_eq!(pool.add(&lock, "is_available"), ID_IS_AVAILABLE);
        assert_eq!(pool.add(&lock, "bitwise_shift_right"), ID_BITWISE_SHIFT_RIGHT);
        assert!(ID_MAIN.is_predefined());
    }

    #[test]
    fn lock_pairs() {
        let pool = IdentifierPool::new();
        {
            let _lock = pool.lock();
        }
        // Released on drop, can re-acquire
        let _lock = pool.lock();
    }

    #[test]
    #[should_panic(expected = "acquired twice")]
    fn double_lock_panics() {
        let pool = IdentifierPool::new();
        let _a = pool.lock();
        let _b = pool.lock();
    }

    #[test]
    fn unicode_and_empty_strings() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        for text in ["", "🦀", "你好", "a_very_long_identifier_name"] {
            let id = pool.add(&lock, text);
            assert_eq!(pool.get(id), text);
        }
    }

    #[test]
    fn many_identifiers_stay_unique() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        let mut ids = Vec::new();
        for i in 0..1000 {
            ids.push(pool.add(&lock, &format!("ident_{i}")));
        }
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(pool.get(*id), format!("ident_{i}"));
        }
    }
}
