//! Schema migrations.
//!
//! Migrating a table compares the candidate schema with the current one
//! index by index. Indexes that disappeared or changed are dropped by
//! deleting their key range; indexes that appeared or changed are created
//! by backfilling every live document through the new indexers only. The
//! drops, the backfill and the new schema pointers are committed as one
//! batch, so a failed migration leaves the previous schema fully in place.
//!
//! ## Usage
//!
//! ```rust
//! use docket_core::{Database, IndexSpec, Schema};
//!
//! let db = Database::open_in_memory().unwrap();
//! let report = db
//!     .migrate(Schema::new("User").with_index("name", IndexSpec::equality(["name"])))
//!     .unwrap();
//! assert_eq!(report.created, vec!["name"]);
//! ```

use crate::catalog::{read_metadata, Catalog};
use crate::document::{document_id, VersionClock};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexerRegistry;
use crate::keys::{
    self, index_prefix, latest_prefix, prefix_range, schema_latest_key, schema_version_key, METADATA_KEY,
};
use crate::schema::Schema;
use crate::store::compute_entries;
use docket_storage::{BatchOp, KvStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Index-level difference between two schemas of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Indexes to remove, by name.
    pub drop: Vec<String>,
    /// Indexes to build, by name.
    pub create: Vec<String>,
}

impl SchemaDiff {
    /// Diffs `candidate` against `current` (absent means no indexes).
    ///
    /// An index whose spec changed appears in both lists.
    #[must_use]
    pub fn between(current: Option<&Schema>, candidate: &Schema) -> Self {
        let mut diff = Self::default();
        if let Some(current) = current {
            for (name, spec) in &current.indexes {
                if candidate.indexes.get(name) != Some(spec) {
                    diff.drop.push(name.clone());
                }
            }
        }
        for (name, spec) in &candidate.indexes {
            if current.and_then(|c| c.indexes.get(name)) != Some(spec) {
                diff.create.push(name.clone());
            }
        }
        diff
    }

    /// Returns `true` if no index changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty() && self.create.is_empty()
    }
}

/// Summary of a committed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Migrated table.
    pub table: String,
    /// Version stamped on the new schema.
    pub version: String,
    /// Dropped indexes.
    pub dropped: Vec<String>,
    /// Created indexes.
    pub created: Vec<String>,
    /// Keys deleted by the drops.
    pub deleted_entries: usize,
    /// Entries written by the backfill.
    pub written_entries: usize,
}

/// Applies schemas to a store.
pub struct Migrator<'a> {
    store: &'a dyn KvStore,
    registry: &'a IndexerRegistry,
    clock: &'a VersionClock,
    catalog: &'a Catalog,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator.
    #[must_use]
    pub fn new(
        store: &'a dyn KvStore,
        registry: &'a IndexerRegistry,
        clock: &'a VersionClock,
        catalog: &'a Catalog,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            catalog,
        }
    }

    /// Makes `schema` the current schema of its table.
    ///
    /// The caller must hold the database write lock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`/`InvalidDocument`/`UnknownIndexType` for an
    /// invalid schema, and `MigrationFailed` wrapping any failure while
    /// dropping, backfilling or committing.
    pub fn migrate(&self, mut schema: Schema) -> CoreResult<MigrationReport> {
        schema.validate()?;
        self.registry.check(&schema)?;

        let table = schema.name.clone();
        let current = self.catalog.get(&table);
        let diff = SchemaDiff::between(current.as_deref(), &schema);

        let mut ops = Vec::new();
        let deleted_entries = match &current {
            Some(current) => self
                .drop_ops(current, &diff.drop, &mut ops)
                .map_err(|e| CoreError::migration_failed(&table, e))?,
            None => 0,
        };
        let written_entries = self
            .create_ops(&schema, &diff.create, &mut ops)
            .map_err(|e| CoreError::migration_failed(&table, e))?;

        if let Some(previous) = current.as_ref().and_then(|c| c.version.as_deref()) {
            self.clock.observe(previous);
        }
        let version = self.clock.next();
        schema.version = Some(version.clone());
        self.commit(&schema, &version, ops)
            .map_err(|e| CoreError::migration_failed(&table, e))?;

        info!(
            table = %table,
            version = %version,
            dropped = ?diff.drop,
            created = ?diff.create,
            deleted_entries,
            written_entries,
            "migrated table"
        );
        self.catalog.install(schema);

        Ok(MigrationReport {
            table,
            version,
            dropped: diff.drop,
            created: diff.create,
            deleted_entries,
            written_entries,
        })
    }

    fn drop_ops(&self, current: &Schema, names: &[String], ops: &mut Vec<BatchOp>) -> CoreResult<usize> {
        let mut deleted = 0;
        for name in names {
            let indexer = current
                .indexes
                .get(name)
                .and_then(|spec| self.registry.get(&spec.kind));
            for item in self.store.scan(&prefix_range(&index_prefix(&current.name, name)))? {
                let (key, value) = item?;
                if let Some(indexer) = indexer {
                    for owned in indexer.owned_keys(&value)? {
                        ops.push(BatchOp::delete(owned));
                        deleted += 1;
                    }
                }
                ops.push(BatchOp::delete(key));
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn create_ops(&self, schema: &Schema, names: &[String], ops: &mut Vec<BatchOp>) -> CoreResult<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        let selected: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut written = 0;
        for item in self.store.scan(&prefix_range(&latest_prefix(&schema.name)))? {
            let (key, bytes) = item?;
            let doc = match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(doc)) => doc,
                Ok(Value::Null) => continue,
                Ok(_) | Err(_) => {
                    return Err(CoreError::corrupted(
                        keys::printable(&key),
                        "latest pointer is not a document",
                    ))
                }
            };
            let id = document_id(&doc).unwrap_or_default().to_string();
            for named in compute_entries(self.registry, schema, &doc, |n| selected.contains(n))? {
                if named.unique {
                    if let Some(owner) = owners.insert(named.entry.key.clone(), id.clone()) {
                        if owner != id {
                            return Err(CoreError::duplicate_key(
                                &schema.name,
                                named.index,
                                keys::printable(&named.entry.key),
                            ));
                        }
                    }
                }
                ops.push(BatchOp::put(named.entry.key, named.entry.value));
                written += 1;
            }
        }
        Ok(written)
    }

    fn commit(&self, schema: &Schema, version: &str, mut ops: Vec<BatchOp>) -> CoreResult<()> {
        let encoded = serde_json::to_vec(schema)?;
        ops.push(BatchOp::put(schema_version_key(&schema.name, version), encoded.clone()));
        ops.push(BatchOp::put(schema_latest_key(&schema.name), encoded));

        let mut metadata = read_metadata(self.store)?;
        if metadata.tables.insert(schema.name.clone()) {
            ops.push(BatchOp::put(METADATA_KEY, serde_json::to_vec(&metadata)?));
        }
        self.store.batch(ops)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexSpec;
    use docket_storage::MemoryStore;

    #[test]
    fn diff_lists_drops_and_creates() {
        let old = Schema::new("User")
            .with_index("a", IndexSpec::equality(["a"]))
            .with_index("b", IndexSpec::equality(["b"]))
            .with_index("c", IndexSpec::equality(["c"]));
        let new = Schema::new("User")
            .with_index("a", IndexSpec::equality(["a"]))
            .with_index("b", IndexSpec::equality(["b"]).unique())
            .with_index("d", IndexSpec::inverted(["d"]));

        let diff = SchemaDiff::between(Some(&old), &new);
        assert_eq!(diff.drop, vec!["b", "c"]);
        assert_eq!(diff.create, vec!["b", "d"]);
        assert!(SchemaDiff::between(Some(&new), &new).is_empty());
    }

    #[test]
    fn first_migration_creates_everything() {
        let schema = Schema::new("User").with_index("a", IndexSpec::equality(["a"]));
        let diff = SchemaDiff::between(None, &schema);
        assert!(diff.drop.is_empty());
        assert_eq!(diff.create, vec!["a"]);
    }

    #[test]
    fn schema_versions_sort_after_the_stored_one() {
        let store = MemoryStore::new();
        let registry = IndexerRegistry::with_builtins();
        let catalog = Catalog::load(&store).unwrap();
        let mut ahead = Schema::new("User");
        ahead.version = Some(format!("{:020}", u64::MAX / 2));
        catalog.install(ahead.clone());

        let clock = VersionClock::new();
        let report = Migrator::new(&store, &registry, &clock, &catalog)
            .migrate(Schema::new("User").with_index("a", IndexSpec::equality(["a"])))
            .unwrap();
        assert!(Some(report.version) > ahead.version);
    }
}
