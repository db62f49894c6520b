//! In-memory ordered store.

use crate::error::StorageResult;
use crate::store::{BatchOp, KvCursor, KvStore, ScanRange};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

/// Number of entries a cursor copies out per lock acquisition.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// An in-memory ordered key-value store.
///
/// This store keeps all data in a `BTreeMap` and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// It is also the in-memory image behind [`crate::LogStore`].
///
/// # Thread Safety
///
/// Writers take the write lock for the duration of one batch, so a batch is
/// observed entirely or not at all. Cursors take the read lock once per
/// chunk and never hold it between calls to `next`.
///
/// # Example
///
/// ```rust
/// use docket_storage::{KvStore, MemoryStore, ScanRange};
///
/// let store = MemoryStore::new();
/// store.put("a:1", b"one").unwrap();
/// store.put("a:2", b"two").unwrap();
/// store.put("b:1", b"other").unwrap();
///
/// let keys: Vec<String> = store
///     .scan(&ScanRange::half_open("a:", "a;"))
///     .unwrap()
///     .map(|entry| entry.unwrap().0)
///     .collect();
/// assert_eq!(keys, vec!["a:1", "a:2"]);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose cursors fetch `chunk_size` entries at a time.
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Creates a store with pre-existing contents.
    #[must_use]
    pub fn with_data(data: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(data),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns a copy of all data in the store.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.data.read().clone()
    }

    /// Applies operations under a single write lock.
    pub(crate) fn apply(&self, ops: Vec<BatchOp>) {
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.data.write().clear();
    }

    fn read_chunk(
        &self,
        lower: &Bound<String>,
        upper: &Bound<String>,
    ) -> Vec<(String, Vec<u8>)> {
        let range = ScanRange::new(lower.clone(), upper.clone());
        if range.is_empty() {
            return Vec::new();
        }
        let data = self.data.read();
        data.range::<str, _>((as_str_bound(lower), as_str_bound(upper)))
            .take(self.chunk_size)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_str()),
        Bound::Excluded(key) => Bound::Excluded(key.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        self.apply(ops);
        Ok(())
    }

    fn scan(&self, range: &ScanRange) -> StorageResult<KvCursor<'_>> {
        Ok(Box::new(ChunkCursor {
            store: self,
            next_lower: range.lower.clone(),
            upper: range.upper.clone(),
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }
}

/// Cursor that refills from the map one chunk at a time.
struct ChunkCursor<'a> {
    store: &'a MemoryStore,
    next_lower: Bound<String>,
    upper: Bound<String>,
    buffer: VecDeque<(String, Vec<u8>)>,
    exhausted: bool,
}

impl Iterator for ChunkCursor<'_> {
    type Item = StorageResult<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let chunk = self.store.read_chunk(&self.next_lower, &self.upper);
            if chunk.len() < self.store.chunk_size {
                self.exhausted = true;
            }
            if let Some((last, _)) = chunk.last() {
                self.next_lower = Bound::Excluded(last.clone());
            }
            self.buffer.extend(chunk);
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(store: &MemoryStore, range: &ScanRange) -> Vec<String> {
        store
            .scan(range)
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect()
    }

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_put_get_delete() {
        let store = MemoryStore::new();
        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.delete("k").unwrap();
    }

    #[test]
    fn memory_batch_applies_in_order() {
        let store = MemoryStore::new();
        store
            .batch(vec![
                BatchOp::put("a", b"1".to_vec()),
                BatchOp::put("b", b"2".to_vec()),
                BatchOp::delete("a"),
                BatchOp::put("b", b"3".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_scan_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        for key in ["c", "a", "e", "b", "d"] {
            store.put(key, key.as_bytes()).unwrap();
        }

        assert_eq!(keys(&store, &ScanRange::all()), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(keys(&store, &ScanRange::half_open("b", "d")), vec!["b", "c"]);
        assert_eq!(keys(&store, &ScanRange::closed("b", "d")), vec!["b", "c", "d"]);
        assert_eq!(
            keys(
                &store,
                &ScanRange::new(Bound::Excluded("b".into()), Bound::Unbounded)
            ),
            vec!["c", "d", "e"]
        );
    }

    #[test]
    fn memory_scan_empty_range_yields_nothing() {
        let store = MemoryStore::new();
        store.put("a", b"1").unwrap();
        assert!(keys(&store, &ScanRange::half_open("a", "a")).is_empty());
        assert!(keys(&store, &ScanRange::closed("z", "a")).is_empty());
    }

    #[test]
    fn memory_scan_crosses_chunk_boundaries() {
        let store = MemoryStore::with_chunk_size(3);
        for i in 0..10 {
            store.put(&format!("k{i:02}"), b"x").unwrap();
        }
        let all = keys(&store, &ScanRange::all());
        assert_eq!(all.len(), 10);
        assert_eq!(all.first().map(String::as_str), Some("k00"));
        assert_eq!(all.last().map(String::as_str), Some("k09"));
    }

    #[test]
    fn memory_cursor_sees_writes_between_chunks() {
        let store = MemoryStore::with_chunk_size(2);
        for key in ["a", "b", "c"] {
            store.put(key, b"x").unwrap();
        }
        let mut cursor = store.scan(&ScanRange::all()).unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().0, "a");
        assert_eq!(cursor.next().unwrap().unwrap().0, "b");
        store.put("bb", b"late").unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().0, "bb");
        assert_eq!(cursor.next().unwrap().unwrap().0, "c");
        assert!(cursor.next().is_none());
    }

    #[test]
    fn memory_with_data() {
        let mut data = BTreeMap::new();
        data.insert("preloaded".to_string(), b"yes".to_vec());
        let store = MemoryStore::with_data(data);
        assert_eq!(store.get("preloaded").unwrap(), Some(b"yes".to_vec()));
        assert_eq!(store.snapshot().len(), 1);
    }
}
