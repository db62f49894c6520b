//! Error types for docket core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docket core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error, surfaced verbatim.
    #[error("storage error: {0}")]
    Storage(#[from] docket_storage::StorageError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A unique index already maps the key to another document.
    #[error("duplicate key in {table}.{index}: {key}")]
    DuplicateKey {
        /// Table owning the index.
        table: String,
        /// Name of the unique index.
        index: String,
        /// Printable form of the conflicting key.
        key: String,
    },

    /// The table has never been migrated.
    #[error("schema not found: {table}")]
    SchemaNotFound {
        /// Name of the table.
        table: String,
    },

    /// A schema names an index type with no registered indexer.
    #[error("unknown index type {kind:?} for index {index}")]
    UnknownIndexType {
        /// Name of the index declaring the type.
        index: String,
        /// The unregistered type name.
        kind: String,
    },

    /// The document is missing or tombstoned.
    #[error("document absent: {table}:{id}")]
    DocumentAbsent {
        /// Table searched.
        table: String,
        /// Document id.
        id: String,
    },

    /// A migration could not be committed; the previous schema is still current.
    #[error("migration of {table} failed: {source}")]
    MigrationFailed {
        /// Table being migrated.
        table: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A table, index, or document id is not usable as a key component.
    #[error("invalid {kind} name: {name:?}")]
    InvalidName {
        /// What was being named.
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// A document is structurally invalid.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// A filter or graph query is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// The plan needs a full table scan and full scans are disabled.
    #[error("query on {table} requires a full scan")]
    FullScanForbidden {
        /// Table the query targets.
        table: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupted value at {key:?}: {message}")]
    Corrupted {
        /// Key holding the value.
        key: String,
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(
        table: impl Into<String>,
        index: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::DuplicateKey {
            table: table.into(),
            index: index.into(),
            key: key.into(),
        }
    }

    /// Creates a schema not found error.
    pub fn schema_not_found(table: impl Into<String>) -> Self {
        Self::SchemaNotFound {
            table: table.into(),
        }
    }

    /// Creates a document absent error.
    pub fn document_absent(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DocumentAbsent {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Wraps a failure that happened while migrating `table`.
    pub fn migration_failed(table: impl Into<String>, source: CoreError) -> Self {
        Self::MigrationFailed {
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a corrupted value error.
    pub fn corrupted(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors that mean "the document is not there".
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::DocumentAbsent { .. })
    }
}
