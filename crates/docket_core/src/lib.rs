//! # docket core
//!
//! Document store with pluggable secondary indexes and graph links, built
//! on the ordered key-value stores of `docket_storage`.
//!
//! This crate provides:
//! - A key codec that lays documents, versions, index entries and links
//!   out in one ordered key space
//! - Schemas declaring per-table indexes, applied by migrations that drop
//!   and backfill indexes atomically
//! - Equality, full-text and link indexers behind the [`Indexer`] trait
//! - Filter queries planned onto index range scans
//! - Triple-pattern graph queries over six-way permuted link keys
//!
//! ## Example
//!
//! ```rust
//! use docket_core::{Database, Filter, IndexSpec, Query, QueryResult, Schema};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory().unwrap();
//! db.migrate(
//!     Schema::new("User")
//!         .with_index("email", IndexSpec::equality(["email"]).unique())
//!         .with_index("bio", IndexSpec::inverted(["bio"])),
//! )
//! .unwrap();
//!
//! let doc = json!({ "email": "j@example.com", "bio": "cat dog" });
//! db.put("User", doc.as_object().cloned().unwrap()).unwrap();
//!
//! let query = Query::new("User").filter(Filter::search("bio", "dogs")).count();
//! assert_eq!(db.query(&query).unwrap(), QueryResult::Count(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod database;
mod document;
mod error;
pub mod graph;
pub mod index;
pub mod keys;
mod migration;
pub mod query;
mod schema;
mod store;

pub use catalog::{Catalog, Metadata};
pub use config::Config;
pub use database::{Database, DatabaseBuilder, Request, Response};
pub use document::{
    document_id, document_version, generate_id, resolve, validate_id, validate_name, Document,
    DocumentVersion, VersionClock, ID_FIELD, LINKS_FIELD, VERSION_FIELD,
};
pub use error::{CoreError, CoreResult};
pub use graph::{Binding, EntityRef, GraphQuery, GraphResult, Link, PatternNode};
pub use index::{IndexContext, IndexEntry, IndexFamily, Indexer, IndexerRegistry};
pub use migration::{MigrationReport, Migrator, SchemaDiff};
pub use query::{Direction, Filter, Order, Projection, Query, QueryPlan, QueryResult};
pub use schema::{IndexSpec, Schema};
pub use store::{compute_entries, load_latest, DocumentStore, NamedEntry};
