//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log file is structurally invalid.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A log record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Byte offset of the record in the log file.
        offset: u64,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// A batch could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An append failed and the partial record could not be removed.
    #[error("append failed ({source}) and rolling back the log failed: {rollback}")]
    RollbackFailed {
        /// Error of the append.
        #[source]
        source: io::Error,
        /// Error of the truncation that followed.
        rollback: io::Error,
    },

    /// Another process holds the log file lock.
    #[error("store is locked by another process")]
    Locked,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates an encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }
}
