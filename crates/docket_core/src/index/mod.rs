//! Pluggable secondary indexes.
//!
//! An index is declared in a table's schema by type name. The type name is
//! looked up in an [`IndexerRegistry`], and the resulting [`Indexer`]
//! derives the index entries of each document. Entries live in the same
//! ordered key space as the documents and are written in the same batch,
//! so every index can be rebuilt from the latest documents alone.
//!
//! # Built-in types
//!
//! - [`EQUALITY`]: typed field values, optionally compound and unique
//! - [`INVERTED`]: stemmed terms for `search`
//! - [`LINK`]: graph edges from reference fields

mod equality;
mod inverted;
mod link;
mod registry;
pub mod text;
mod traits;

pub use equality::EqualityIndexer;
pub use inverted::InvertedIndexer;
pub use link::LinkIndexer;
pub use registry::IndexerRegistry;
pub use traits::{IndexContext, IndexEntry, IndexFamily, Indexer};

/// Type name of the equality indexer.
pub const EQUALITY: &str = "equality";

/// Type name of the full-text indexer.
pub const INVERTED: &str = "inverted";

/// Type name of the link indexer.
pub const LINK: &str = "link";
