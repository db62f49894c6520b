//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use docket_core::{Config, Database, Document};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name of the log inside a file-based test database's directory.
pub const LOG_FILE: &str = "docket.log";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates a new in-memory test database with `config`.
    pub fn memory_with(config: Config) -> Self {
        Self {
            db: Database::builder()
                .config(config)
                .open_in_memory()
                .expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_path(temp_dir.path().join(LOG_FILE), Config::default())
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Closes and reopens a file-based database, replaying its log.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which have nothing to replay.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        drop(db);
        let temp_dir = temp_dir.expect("Only file databases can be reopened");
        let db = Database::open_path(temp_dir.path().join(LOG_FILE), Config::default())
            .expect("Failed to reopen file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl std::ops::DerefMut for TestDatabase {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Converts a JSON object literal into a [`Document`].
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use docket_core::{IndexSpec, Schema};
    use serde_json::json;

    /// `User` with equality indexes on `name` and `age`, a unique one on
    /// `email`, a compound one on `name` and `age`, and a full-text index
    /// on `bio`.
    pub fn user_schema() -> Schema {
        Schema::new("User")
            .with_index("name", IndexSpec::equality(["name"]))
            .with_index("email", IndexSpec::equality(["email"]).unique())
            .with_index("age", IndexSpec::equality(["age"]))
            .with_index("name_age", IndexSpec::equality(["name", "age"]))
            .with_index("bio", IndexSpec::inverted(["bio"]))
    }

    /// `Person` with a `friends` link index into `Person`.
    pub fn person_schema() -> Schema {
        Schema::new("Person").with_index("friends", IndexSpec::link(["friends"]).linked_to("Person"))
    }

    /// Creates a database with `count` users named `user{i}`, aged `20 + i % 5`.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .migrate(user_schema())
            .expect("Failed to migrate User");
        for i in 0..count {
            test_db
                .put(
                    "User",
                    doc(json!({
                        "_id": format!("{i:04}"),
                        "name": format!("user{i}"),
                        "email": format!("user{i}@example.com"),
                        "age": 20 + i % 5,
                    })),
                )
                .expect("Failed to put user");
        }
        test_db
    }
}
