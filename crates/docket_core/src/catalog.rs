//! Registered tables and their current schemas.

use crate::error::{CoreError, CoreResult};
use crate::keys::{self, prefix_range, schema_history_prefix, schema_latest_key, schema_version_key, METADATA_KEY};
use crate::schema::Schema;
use docket_storage::KvStore;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Contents of the metadata key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Every migrated table.
    #[serde(default)]
    pub tables: BTreeSet<String>,
}

fn read_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> CoreResult<Option<T>> {
    match store.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CoreError::corrupted(keys::printable(key), e.to_string())),
        None => Ok(None),
    }
}

/// Reads the metadata key; a fresh store has no tables.
///
/// # Errors
///
/// Returns storage errors and `Corrupted` for an undecodable value.
pub fn read_metadata(store: &dyn KvStore) -> CoreResult<Metadata> {
    Ok(read_json(store, METADATA_KEY)?.unwrap_or_default())
}

/// Reads a table's current schema.
///
/// # Errors
///
/// Returns storage errors and `Corrupted` for an undecodable value.
pub fn read_schema(store: &dyn KvStore, table: &str) -> CoreResult<Option<Schema>> {
    read_json(store, &schema_latest_key(table))
}

/// Reads one recorded schema version.
///
/// # Errors
///
/// Returns storage errors and `Corrupted` for an undecodable value.
pub fn read_schema_version(store: &dyn KvStore, table: &str, version: &str) -> CoreResult<Option<Schema>> {
    read_json(store, &schema_version_key(table, version))
}

/// Every recorded schema of a table, oldest first.
///
/// # Errors
///
/// Returns storage errors and `Corrupted` for undecodable values.
pub fn read_schema_history(store: &dyn KvStore, table: &str) -> CoreResult<Vec<Schema>> {
    store
        .scan(&prefix_range(&schema_history_prefix(table)))?
        .map(|item| {
            let (key, bytes) = item?;
            serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::corrupted(keys::printable(&key), e.to_string()))
        })
        .collect()
}

/// In-memory view of the registered schemas.
///
/// Loaded when the database opens and updated after each committed
/// migration; readers never touch the store for schema lookups.
#[derive(Debug, Default)]
pub struct Catalog {
    schemas: RwLock<BTreeMap<String, Arc<Schema>>>,
}

impl Catalog {
    /// Loads every table listed in the metadata key.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn load(store: &dyn KvStore) -> CoreResult<Self> {
        let metadata = read_metadata(store)?;
        let mut schemas = BTreeMap::new();
        for table in metadata.tables {
            let schema = read_schema(store, &table)?.ok_or_else(|| {
                CoreError::corrupted(
                    schema_latest_key(&table),
                    "table is registered but has no schema",
                )
            })?;
            schemas.insert(table, Arc::new(schema));
        }
        Ok(Self {
            schemas: RwLock::new(schemas),
        })
    }

    /// Current schema of a table.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(table).cloned()
    }

    /// Current schema of a table.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` if the table was never migrated.
    pub fn require(&self, table: &str) -> CoreResult<Arc<Schema>> {
        self.get(table)
            .ok_or_else(|| CoreError::schema_not_found(table))
    }

    /// Names of every registered table.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    /// Makes `schema` the current schema of its table.
    pub fn install(&self, schema: Schema) {
        self.schemas
            .write()
            .insert(schema.name.clone(), Arc::new(schema));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_storage::{BatchOp, MemoryStore};

    #[test]
    fn empty_store_has_no_tables() {
        let store = MemoryStore::new();
        let catalog = Catalog::load(&store).unwrap();
        assert!(catalog.tables().is_empty());
        assert!(matches!(
            catalog.require("User"),
            Err(CoreError::SchemaNotFound { .. })
        ));
    }

    #[test]
    fn loads_registered_schemas() {
        let store = MemoryStore::new();
        let schema = Schema::new("User");
        let metadata = Metadata {
            tables: ["User".to_string()].into(),
        };
        store
            .batch(vec![
                BatchOp::put(METADATA_KEY, serde_json::to_vec(&metadata).unwrap()),
                BatchOp::put(schema_latest_key("User"), serde_json::to_vec(&schema).unwrap()),
                BatchOp::put(schema_version_key("User", "1"), serde_json::to_vec(&schema).unwrap()),
            ])
            .unwrap();

        let catalog = Catalog::load(&store).unwrap();
        assert_eq!(catalog.tables(), vec!["User"]);
        assert_eq!(*catalog.require("User").unwrap(), schema);
        assert_eq!(read_schema_history(&store, "User").unwrap().len(), 1);
        assert!(read_schema_version(&store, "User", "1").unwrap().is_some());
    }

    #[test]
    fn missing_schema_is_corruption() {
        let store = MemoryStore::new();
        store
            .put(METADATA_KEY, br#"{"tables":["Ghost"]}"#)
            .unwrap();
        assert!(matches!(
            Catalog::load(&store),
            Err(CoreError::Corrupted { .. })
        ));
    }
}
