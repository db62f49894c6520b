//! # docket storage
//!
//! Ordered key-value store contract and implementations for docket.
//!
//! This crate is the lowest layer of docket. Stores are **opaque ordered
//! maps** from string keys to byte values: they know nothing about
//! documents, indexes, or links. The document layer encodes everything it
//! needs into the key space.
//!
//! ## Design Principles
//!
//! - Keys sort by their bytes; range scans iterate ascending
//! - A batch commits atomically or not at all
//! - Scans are pull-based cursors; dropping one stops the scan
//! - Stores must be `Send + Sync` and are used through `&self`
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral storage
//! - [`LogStore`] - Durable, replayed from an append-only log file
//!
//! ## Example
//!
//! ```rust
//! use docket_storage::{BatchOp, KvStore, MemoryStore, ScanRange};
//!
//! let store = MemoryStore::new();
//! store
//!     .batch(vec![
//!         BatchOp::put("user:1", b"alice".to_vec()),
//!         BatchOp::put("user:2", b"bob".to_vec()),
//!     ])
//!     .unwrap();
//!
//! let users: Vec<_> = store
//!     .scan(&ScanRange::half_open("user:", "user;"))
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(users.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod log;
mod memory;
pub mod record;
mod store;

pub use error::{StorageError, StorageResult};
pub use log::{CompactionStats, LogStore, LogStoreConfig};
pub use memory::{MemoryStore, DEFAULT_CHUNK_SIZE};
pub use store::{BatchOp, KvCursor, KvStore, ScanRange};
