//! Indexer contract.

use crate::document::Document;
use crate::error::CoreResult;
use crate::schema::IndexSpec;
use std::fmt;

/// Which filter comparators an index can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFamily {
    /// Ordered typed values: `eq`, `neq`, `gt`, `gte`, `lt`, `lte`,
    /// `within`, `without`, `in`.
    Equality,
    /// Analyzed terms: `search`.
    FullText,
    /// Relationship edges; not used by filter planning.
    Graph,
}

/// A key-value pair written into the shared key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Full key.
    pub key: String,
    /// Document id, or an edge payload for graph entries.
    pub value: Vec<u8>,
}

impl IndexEntry {
    /// Creates an entry.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What an indexer knows about the index it is building.
#[derive(Debug, Clone, Copy)]
pub struct IndexContext<'a> {
    /// Table the document belongs to.
    pub table: &'a str,
    /// Index name.
    pub name: &'a str,
    /// Index declaration.
    pub spec: &'a IndexSpec,
}

/// A pluggable index builder.
///
/// Implementations are stateless: the entries for a document depend only
/// on the document and the context. Registering an indexer under a type
/// name makes that name usable in schemas.
pub trait Indexer: Send + Sync + fmt::Debug {
    /// Comparator family this indexer serves.
    fn family(&self) -> IndexFamily;

    /// Computes every entry `doc` contributes to the index.
    ///
    /// `doc` always carries its `_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document's indexed fields are unusable.
    fn index(&self, ctx: &IndexContext<'_>, doc: &Document) -> CoreResult<Vec<IndexEntry>>;

    /// Keys outside the index range that belong to an entry with `value`.
    ///
    /// Dropping an index deletes these along with the entry itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be decoded.
    fn owned_keys(&self, _value: &[u8]) -> CoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}
