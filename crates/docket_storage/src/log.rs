//! Durable append-only log store.

use crate::error::{StorageError, StorageResult};
use crate::memory::{MemoryStore, DEFAULT_CHUNK_SIZE};
use crate::record::{LogRecord, ReadOutcome, RecordKind};
use crate::store::{BatchOp, KvCursor, KvStore, ScanRange};
use fs2::FileExt;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Configuration for [`LogStore`].
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Whether to fsync the log after every committed batch.
    pub sync_on_commit: bool,
    /// Whether to create the file (and parent directories) if missing.
    pub create_if_missing: bool,
    /// Number of entries a cursor fetches per chunk.
    pub chunk_size: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            create_if_missing: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl LogStoreConfig {
    /// Sets whether every commit is fsynced.
    #[must_use]
    pub const fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets whether a missing file is created.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets the cursor chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }
}

/// Sizes reported by [`LogStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction, in bytes.
    pub bytes_before: u64,
    /// Log size after compaction, in bytes.
    pub bytes_after: u64,
    /// Number of live keys written to the snapshot.
    pub keys: usize,
}

#[derive(Debug)]
struct LogFile {
    file: File,
    size: u64,
}

/// A durable ordered store backed by a single append-only file.
///
/// Every batch is framed as one log record (see [`crate::record`]) and
/// appended before it becomes visible. Reads are served from an in-memory
/// image rebuilt by replaying the log on [`LogStore::open`].
///
/// # Recovery
///
/// - A record cut short at the end of the file is a torn write; it is
///   discarded and the file truncated to the last complete record
/// - A checksum mismatch on a complete record is reported as corruption
///
/// # Locking
///
/// An advisory lock on `<path>.lock` keeps a second process from opening
/// the same log.
///
/// # Example
///
/// ```no_run
/// use docket_storage::{KvStore, LogStore, LogStoreConfig};
/// use std::path::Path;
///
/// let store = LogStore::open(Path::new("data/docket.log"), LogStoreConfig::default()).unwrap();
/// store.put("#metadata", br#"{"tables":[]}"#).unwrap();
/// ```
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    image: MemoryStore,
    log: Mutex<LogFile>,
    config: LogStoreConfig,
    _lock_file: File,
}

impl LogStore {
    /// Opens or creates a log store at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing and `create_if_missing` is false
    /// - Another process holds the lock (`Locked`)
    /// - A complete record is corrupted
    /// - I/O errors occur
    pub fn open(path: &Path, config: LogStoreConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let image = MemoryStore::with_chunk_size(config.chunk_size);
        let mut offset = 0usize;
        let mut records = 0usize;
        while offset < data.len() {
            match LogRecord::read(&data, offset)? {
                ReadOutcome::Record(record, len) => {
                    if record.kind == RecordKind::Snapshot {
                        image.clear();
                    }
                    image.apply(record.ops);
                    offset += len;
                    records += 1;
                }
                ReadOutcome::Torn => {
                    warn!(
                        path = %path.display(),
                        offset,
                        discarded = data.len() - offset,
                        "discarding torn record at end of log"
                    );
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
            }
        }
        let size = offset as u64;
        file.seek(SeekFrom::Start(size))?;

        debug!(path = %path.display(), records, keys = image.len(), "replayed log");

        Ok(Self {
            path: path.to_path_buf(),
            image,
            log: Mutex::new(LogFile { file, size }),
            config,
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current log size in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.log.lock().size
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Rewrites the log as a single snapshot record of the live keys.
    ///
    /// The snapshot is written to a temporary file, synced, and renamed over
    /// the log, so a crash leaves either the old or the new log in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written or renamed.
    pub fn compact(&self) -> StorageResult<CompactionStats> {
        let mut log = self.log.lock();
        let snapshot = self.image.snapshot();
        let keys = snapshot.len();
        let record = LogRecord {
            kind: RecordKind::Snapshot,
            ops: snapshot
                .into_iter()
                .map(|(key, value)| BatchOp::Put { key, value })
                .collect(),
        };
        let bytes = record.encode()?;

        let temp = sibling_path(&self.path, ".compact");
        {
            let mut out = File::create(&temp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.seek(SeekFrom::End(0))?;

        let stats = CompactionStats {
            bytes_before: log.size,
            bytes_after: bytes.len() as u64,
            keys,
        };
        *log = LogFile {
            file,
            size: bytes.len() as u64,
        };
        info!(
            path = %self.path.display(),
            before = stats.bytes_before,
            after = stats.bytes_after,
            keys,
            "compacted log"
        );
        Ok(stats)
    }
}

impl KvStore for LogStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.image.get(key)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let record = LogRecord {
            kind: RecordKind::Batch,
            ops,
        };
        let bytes = record.encode()?;

        let mut log = self.log.lock();
        let before = log.size;
        if let Err(err) = append(&mut log.file, &bytes, self.config.sync_on_commit) {
            return Err(abort_append(&mut log.file, before, err));
        }
        log.size += bytes.len() as u64;

        debug!(ops = record.ops.len(), bytes = bytes.len(), "committed batch");
        self.image.apply(record.ops);
        Ok(())
    }

    fn scan(&self, range: &ScanRange) -> StorageResult<KvCursor<'_>> {
        self.image.scan(range)
    }
}

fn append(file: &mut File, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    file.write_all(bytes)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Drops whatever part of a failed record reached the file.
fn abort_append(file: &mut File, before: u64, err: std::io::Error) -> StorageError {
    let rollback = file
        .set_len(before)
        .and_then(|()| file.seek(SeekFrom::Start(before)).map(drop));
    match rollback {
        Ok(()) => err.into(),
        Err(rollback) => {
            error!(
                offset = before,
                error = %err,
                rollback_error = %rollback,
                "failed to roll back a partial append"
            );
            StorageError::RollbackFailed {
                source: err,
                rollback,
            }
        }
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn lock_path(path: &Path) -> PathBuf {
    sibling_path(path, ".lock")
}
