//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reject queries whose plan has no index access.
    pub forbid_full_scans: bool,

    /// Log a warning once a full table scan has visited this many documents.
    pub scan_warning_threshold: usize,

    /// Entries fetched per chunk by stores this crate creates.
    pub scan_chunk_size: usize,

    /// Whether the durable store syncs on every commit (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forbid_full_scans: false,
            scan_warning_threshold: 10_000,
            scan_chunk_size: docket_storage::DEFAULT_CHUNK_SIZE,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether plans without index access are rejected.
    #[must_use]
    pub const fn forbid_full_scans(mut self, value: bool) -> Self {
        self.forbid_full_scans = value;
        self
    }

    /// Sets the full scan warning threshold.
    #[must_use]
    pub const fn scan_warning_threshold(mut self, value: usize) -> Self {
        self.scan_warning_threshold = value;
        self
    }

    /// Sets the scan chunk size.
    #[must_use]
    pub const fn scan_chunk_size(mut self, value: usize) -> Self {
        self.scan_chunk_size = value;
        self
    }

    /// Sets whether the durable store syncs on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}
