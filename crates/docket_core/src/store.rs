//! Document storage: latest pointers, immutable versions and index upkeep.
//!
//! Every mutation is one store batch holding the document write and all
//! index and link changes it implies. Validation (ids, unique probes) runs
//! before the batch is built, so a rejected write changes nothing.

use crate::document::{
    document_version, generate_id, validate_id, Document, DocumentVersion, VersionClock,
    ID_FIELD, LINKS_FIELD, VERSION_FIELD,
};
use crate::error::{CoreError, CoreResult};
use crate::graph::{EntityRef, Link, LinkOps, Permutation};
use crate::index::{IndexContext, IndexEntry, IndexFamily, IndexerRegistry};
use crate::keys::{self, latest_key, link_prefix, prefix_range, version_key, version_prefix};
use crate::schema::Schema;
use docket_storage::{BatchOp, KvStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// An index entry tagged with the index that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    /// Index name.
    pub index: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// The entry.
    pub entry: IndexEntry,
}

/// Computes the entries `doc` contributes to the indexes of `schema`
/// selected by `include`.
///
/// # Errors
///
/// Returns `UnknownIndexType` for unregistered types and any indexer error.
pub fn compute_entries(
    registry: &IndexerRegistry,
    schema: &Schema,
    doc: &Document,
    include: impl Fn(&str) -> bool,
) -> CoreResult<Vec<NamedEntry>> {
    let mut out = Vec::new();
    for (name, spec) in schema.indexes.iter().filter(|(name, _)| include(name)) {
        let indexer = registry.require(name, spec)?;
        let ctx = IndexContext {
            table: &schema.name,
            name,
            spec,
        };
        let unique = spec.unique && indexer.family() == IndexFamily::Equality;
        out.extend(indexer.index(&ctx, doc)?.into_iter().map(|entry| NamedEntry {
            index: name.clone(),
            unique,
            entry,
        }));
    }
    Ok(out)
}

/// Decodes a stored document value; `null` is a tombstone.
fn decode(key: &str, bytes: &[u8]) -> CoreResult<Option<Document>> {
    match serde_json::from_slice(bytes) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(doc)) => Ok(Some(doc)),
        Ok(other) => Err(CoreError::corrupted(
            keys::printable(key),
            format!("expected an object or null, found {other}"),
        )),
        Err(e) => Err(CoreError::corrupted(keys::printable(key), e.to_string())),
    }
}

/// Reads the latest state of a document; tombstones read as `None`.
///
/// # Errors
///
/// Returns storage errors and `Corrupted` for undecodable values.
pub fn load_latest(store: &dyn KvStore, table: &str, id: &str) -> CoreResult<Option<Document>> {
    let key = latest_key(table, id);
    match store.get(&key)? {
        Some(bytes) => decode(&key, &bytes),
        None => Ok(None),
    }
}

/// Document operations over one store.
#[derive(Clone, Copy)]
pub struct DocumentStore<'a> {
    store: &'a dyn KvStore,
    registry: &'a IndexerRegistry,
    clock: &'a VersionClock,
}

impl<'a> DocumentStore<'a> {
    /// Creates a document store view.
    #[must_use]
    pub fn new(store: &'a dyn KvStore, registry: &'a IndexerRegistry, clock: &'a VersionClock) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    /// Reads the latest version of a document.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn get(&self, table: &str, id: &str) -> CoreResult<Option<Document>> {
        load_latest(self.store, table, id)
    }

    /// Reads one specific version of a document.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn get_version(&self, table: &str, id: &str, version: &str) -> CoreResult<Option<Document>> {
        let key = version_key(table, id, version);
        match self.store.get(&key)? {
            Some(bytes) => decode(&key, &bytes),
            None => Ok(None),
        }
    }

    /// Lists every stored version of a document, oldest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn history(&self, table: &str, id: &str) -> CoreResult<Vec<DocumentVersion>> {
        let prefix = version_prefix(table, id);
        self.store
            .scan(&prefix_range(&prefix))?
            .map(|item| {
                let (key, bytes) = item?;
                Ok(DocumentVersion {
                    version: key[prefix.len()..].to_string(),
                    document: decode(&key, &bytes)?,
                })
            })
            .collect()
    }

    /// Writes a new version of a document and returns its id.
    ///
    /// Assigns `_id` when missing and always stamps a fresh `_v`. `_links`
    /// is applied to the link store and not kept in the document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`/`InvalidDocument` for bad ids or links,
    /// `DuplicateKey` when a unique index already holds a value for another
    /// document, and storage errors from the commit.
    pub fn put(&self, schema: &Schema, mut doc: Document) -> CoreResult<String> {
        let table = schema.name.as_str();
        let id = match doc.get(ID_FIELD) {
            None | Some(Value::Null) => generate_id(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(CoreError::invalid_document(format!(
                    "{ID_FIELD} must be a string, got {other}"
                )))
            }
        };
        validate_id(&id)?;

        let previous = self.get(table, &id)?;
        if let Some(version) = previous.as_ref().and_then(document_version) {
            self.clock.observe(version);
        }
        let version = self.clock.next();

        let subject = EntityRef::new(table, id.as_str());
        let links = LinkOps::from_document(&doc, &subject)?;
        doc.remove(LINKS_FIELD);
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        doc.insert(VERSION_FIELD.to_string(), Value::String(version.clone()));

        let entries = compute_entries(self.registry, schema, &doc, |_| true)?;
        self.check_unique(table, &id, &entries)?;

        let fresh: BTreeSet<&str> = entries.iter().map(|e| e.entry.key.as_str()).collect();
        let mut ops = Vec::new();
        if let Some(previous) = &previous {
            for old in compute_entries(self.registry, schema, previous, |_| true)? {
                if !fresh.contains(old.entry.key.as_str()) {
                    ops.push(BatchOp::delete(old.entry.key));
                }
            }
        }
        let stale = ops.len();
        ops.extend(
            entries
                .into_iter()
                .map(|e| BatchOp::put(e.entry.key, e.entry.value)),
        );
        push_link_ops(&mut ops, &links)?;

        let bytes = serde_json::to_vec(&doc)?;
        ops.push(BatchOp::put(version_key(table, &id, &version), bytes.clone()));
        ops.push(BatchOp::put(latest_key(table, &id), bytes));

        debug!(table, id = %id, ops = ops.len(), stale, "committing put");
        self.store.batch(ops)?;
        Ok(id)
    }

    /// Deletes a document: removes its index entries and every link that
    /// touches it, and writes a tombstone.
    ///
    /// # Errors
    ///
    /// Returns `DocumentAbsent` if the document is missing or already
    /// deleted, and storage errors from the commit.
    pub fn del(&self, schema: &Schema, id: &str) -> CoreResult<()> {
        let table = schema.name.as_str();
        let doc = self
            .get(table, id)?
            .ok_or_else(|| CoreError::document_absent(table, id))?;
        if let Some(version) = document_version(&doc) {
            self.clock.observe(version);
        }
        let version = self.clock.next();

        let mut deletes: BTreeSet<String> = compute_entries(self.registry, schema, &doc, |_| true)?
            .into_iter()
            .map(|e| e.entry.key)
            .collect();
        for link in self.links_touching(&EntityRef::new(table, id))? {
            deletes.extend(link.keys());
        }

        let mut ops: Vec<BatchOp> = deletes.into_iter().map(BatchOp::delete).collect();
        let tombstone = serde_json::to_vec(&Value::Null)?;
        ops.push(BatchOp::put(version_key(table, id, &version), tombstone.clone()));
        ops.push(BatchOp::put(latest_key(table, id), tombstone));

        debug!(table, id, ops = ops.len(), "committing delete");
        self.store.batch(ops)?;
        Ok(())
    }

    /// Every stored link whose subject or object is `entity`.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable payloads.
    pub fn links_touching(&self, entity: &EntityRef) -> CoreResult<Vec<Link>> {
        let mut found = BTreeMap::new();
        for (perm, outgoing) in [(Permutation::Spo, true), (Permutation::Ops, false)] {
            let prefix = link_prefix(perm.name(), &[entity.table.as_str()]);
            for item in self.store.scan(&prefix_range(&prefix))? {
                let (key, bytes) = item?;
                let link = Link::from_payload(&bytes)
                    .map_err(|e| CoreError::corrupted(keys::printable(&key), e.to_string()))?;
                let end = if outgoing { &link.subject } else { &link.object };
                if end == entity {
                    found.insert(link.key(Permutation::Spo), link);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    fn check_unique(&self, table: &str, id: &str, entries: &[NamedEntry]) -> CoreResult<()> {
        for named in entries.iter().filter(|e| e.unique) {
            if let Some(owner) = self.store.get(&named.entry.key)? {
                if owner != id.as_bytes() {
                    return Err(CoreError::duplicate_key(
                        table,
                        named.index.as_str(),
                        keys::printable(&named.entry.key),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn push_link_ops(ops: &mut Vec<BatchOp>, links: &LinkOps) -> CoreResult<()> {
    for link in &links.del {
        ops.extend(link.keys().into_iter().map(BatchOp::delete));
    }
    for link in &links.put {
        let payload = link.to_payload()?;
        ops.extend(
            link.keys()
                .into_iter()
                .map(|key| BatchOp::put(key, payload.clone())),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexSpec;
    use docket_storage::MemoryStore;
    use serde_json::json;

    struct Fixture {
        store: MemoryStore,
        registry: IndexerRegistry,
        clock: VersionClock,
        schema: Schema,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                registry: IndexerRegistry::with_builtins(),
                clock: VersionClock::new(),
                schema: Schema::new("User")
                    .with_index("name", IndexSpec::equality(["name"]))
                    .with_index("email", IndexSpec::equality(["email"]).unique()),
            }
        }

        fn docs(&self) -> DocumentStore<'_> {
            DocumentStore::new(&self.store, &self.registry, &self.clock)
        }

        fn put(&self, value: Value) -> CoreResult<String> {
            self.docs()
                .put(&self.schema, value.as_object().cloned().unwrap())
        }

        fn keys_with(&self, prefix: &str) -> Vec<String> {
            self.store
                .snapshot()
                .into_keys()
                .filter(|k| k.starts_with(prefix))
                .collect()
        }
    }

    #[test]
    fn put_assigns_id_and_version() {
        let fx = Fixture::new();
        let id = fx.put(json!({ "name": "James" })).unwrap();
        let doc = fx.docs().get("User", &id).unwrap().unwrap();
        assert_eq!(doc["_id"], json!(id));
        assert!(doc["_v"].is_string());
        assert_eq!(doc["name"], json!("James"));
    }

    #[test]
    fn update_replaces_stale_index_entries() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "name": "A", "email": "a@x" })).unwrap();
        fx.put(json!({ "_id": "1", "name": "B", "email": "b@x" })).unwrap();
        let keys = fx.keys_with("%User/$i/");
        assert_eq!(
            keys,
            vec!["%User/$i/email:sb@x\u{0}", "%User/$i/name:sB\u{0}1"]
        );
        // freed unique value can be taken by another document
        fx.put(json!({ "_id": "2", "email": "a@x" })).unwrap();
    }

    #[test]
    fn unique_conflict_aborts_the_write() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "email": "a@x" })).unwrap();
        let err = fx.put(json!({ "_id": "2", "email": "a@x" })).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { ref index, .. } if index == "email"));
        assert!(fx.docs().get("User", "2").unwrap().is_none());
        // same document may keep its value
        fx.put(json!({ "_id": "1", "email": "a@x", "name": "x" })).unwrap();
    }

    #[test]
    fn del_writes_tombstones_and_clears_entries() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "name": "A" })).unwrap();
        fx.docs().del(&fx.schema, "1").unwrap();
        assert!(fx.docs().get("User", "1").unwrap().is_none());
        assert!(fx.keys_with("%User/$i/").is_empty());
        let err = fx.docs().del(&fx.schema, "1").unwrap_err();
        assert!(err.is_absent());

        let history = fx.docs().history("User", "1").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].document.is_some());
        assert!(history[1].document.is_none());
        assert!(history[0].version < history[1].version);
    }

    #[test]
    fn versions_are_kept() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "name": "A" })).unwrap();
        fx.put(json!({ "_id": "1", "name": "B" })).unwrap();
        let history = fx.docs().history("User", "1").unwrap();
        let first = fx
            .docs()
            .get_version("User", "1", &history[0].version)
            .unwrap()
            .unwrap();
        assert_eq!(first["name"], json!("A"));
    }

    #[test]
    fn links_are_written_and_removed_with_the_document() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "_links": { "put": [["likes", "User:2"]] } }))
            .unwrap();
        fx.put(json!({ "_id": "3", "_links": { "put": [["likes", "User:1"]] } }))
            .unwrap();
        assert_eq!(fx.keys_with("@").len(), 12);
        let stored = fx.docs().get("User", "1").unwrap().unwrap();
        assert!(!stored.contains_key("_links"));

        let touching = fx.docs().links_touching(&EntityRef::new("User", "1")).unwrap();
        assert_eq!(touching.len(), 2);

        fx.docs().del(&fx.schema, "1").unwrap();
        assert!(fx.keys_with("@").is_empty());
    }

    #[test]
    fn link_del_removes_edge() {
        let fx = Fixture::new();
        fx.put(json!({ "_id": "1", "_links": { "put": [["likes", "User:2"]] } }))
            .unwrap();
        fx.put(json!({ "_id": "1", "_links": { "del": [["likes", "User:2"]] } }))
            .unwrap();
        assert!(fx.keys_with("@").is_empty());
    }

    #[test]
    fn bad_ids_are_rejected() {
        let fx = Fixture::new();
        assert!(fx.put(json!({ "_id": 5 })).is_err());
        assert!(fx.put(json!({ "_id": "" })).is_err());
    }
}
