//! Ordered key-value store contract.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// A single operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put {
        /// Key to write.
        key: String,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove a key. Deleting a missing key is not an error.
    Delete {
        /// Key to remove.
        key: String,
    },
}

impl BatchOp {
    /// Creates a put operation.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a delete operation.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Returns `true` for deletes.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Key bounds for a range scan.
///
/// Keys compare as byte strings, which for UTF-8 `String`s is the same as
/// comparing by code point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Lower bound (`gte` or `gt`).
    pub lower: Bound<String>,
    /// Upper bound (`lte` or `lt`).
    pub upper: Bound<String>,
}

impl ScanRange {
    /// A range covering the whole key space.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Creates a range from explicit bounds.
    #[must_use]
    pub const fn new(lower: Bound<String>, upper: Bound<String>) -> Self {
        Self { lower, upper }
    }

    /// Half-open range `[start, end)`.
    pub fn half_open(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::new(Bound::Included(start.into()), Bound::Excluded(end.into()))
    }

    /// Closed range `[start, end]`.
    pub fn closed(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::new(Bound::Included(start.into()), Bound::Included(end.into()))
    }

    /// Returns `true` if `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(lo) => key >= lo.as_str(),
            Bound::Excluded(lo) => key > lo.as_str(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(hi) => key <= hi.as_str(),
            Bound::Excluded(hi) => key < hi.as_str(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Returns `true` if no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::all()
    }
}

/// A pull-based cursor over `(key, value)` pairs in ascending key order.
///
/// Dropping the cursor stops the scan.
pub type KvCursor<'a> = Box<dyn Iterator<Item = StorageResult<(String, Vec<u8>)>> + Send + 'a>;

/// An ordered key-value store.
///
/// # Invariants
///
/// - `batch` applies every operation or none of them
/// - `scan` yields keys in ascending byte order, each at most once
/// - Implementations must be `Send + Sync`; all methods take `&self`
///
/// # Implementors
///
/// - [`super::MemoryStore`] - ordered map, for tests and ephemeral use
/// - [`super::LogStore`] - durable append-only log
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Commits all operations atomically, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable; in that
    /// case none of its operations are visible.
    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()>;

    /// Opens a cursor over every key inside `range`.
    ///
    /// The cursor is not a snapshot: writes committed while it is being
    /// consumed may or may not be observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be started.
    fn scan(&self, range: &ScanRange) -> StorageResult<KvCursor<'_>>;

    /// Writes a single key.
    ///
    /// # Errors
    ///
    /// See [`KvStore::batch`].
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.batch(vec![BatchOp::put(key, value)])
    }

    /// Removes a single key.
    ///
    /// # Errors
    ///
    /// See [`KvStore::batch`].
    fn delete(&self, key: &str) -> StorageResult<()> {
        self.batch(vec![BatchOp::delete(key)])
    }
}
