//! # docket testkit
//!
//! Test utilities for docket.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use docket_testkit::prelude::*;
//! use serde_json::json;
//!
//! with_temp_db(|db| {
//!     db.migrate(scenarios::user_schema()).unwrap();
//!     let id = db.put("User", doc(json!({ "name": "James" }))).unwrap();
//!     assert!(db.get("User", &id).unwrap().is_some());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
