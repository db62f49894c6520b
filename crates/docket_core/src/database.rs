//! Database facade.

use crate::catalog::{read_schema_history, read_schema_version, Catalog};
use crate::config::Config;
use crate::document::{document_id, Document, DocumentVersion, VersionClock};
use crate::error::{CoreError, CoreResult};
use crate::graph::{Binding, Bindings, EntityRef, GraphExecutor, GraphQuery, GraphResult};
use crate::index::{IndexContext, Indexer, IndexerRegistry, LinkIndexer, LINK};
use crate::migration::{MigrationReport, Migrator};
use crate::query::{Candidates, Executor, Filter, Planner, Projection, Query, QueryPlan, QueryResult};
use crate::schema::Schema;
use crate::store::{load_latest, DocumentStore};
use docket_storage::{KvStore, LogStore, LogStoreConfig, MemoryStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Either kind of read request.
///
/// Deserialized untagged: a body with `match` is a graph query, a body
/// with `table` is a table query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Request {
    /// Graph pattern query.
    Graph(GraphQuery),
    /// Table query.
    Query(Query),
}

/// Result of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Bindings per output tag.
    Graph(GraphResult),
    /// Documents or a count.
    Query(QueryResult),
}

/// The main database handle.
///
/// `Database` owns the key-value store, the indexer registry and the
/// schema catalog. All methods take `&self`; share a database across
/// threads with `Arc`. Writes (`put`, `del`, `migrate`) are serialized by
/// a single writer lock, reads never wait for it.
///
/// # Example
///
/// ```rust
/// use docket_core::{Database, Filter, IndexSpec, Schema};
/// use serde_json::json;
///
/// let db = Database::open_in_memory().unwrap();
/// db.migrate(Schema::new("User").with_index("name", IndexSpec::equality(["name"])))
///     .unwrap();
///
/// let doc = json!({ "name": "James" }).as_object().cloned().unwrap();
/// let id = db.put("User", doc).unwrap();
///
/// let found = db.find("User", Filter::eq("name", "James")).unwrap();
/// assert_eq!(found[0]["_id"], json!(id));
/// ```
pub struct Database {
    store: Arc<dyn KvStore>,
    registry: IndexerRegistry,
    config: Config,
    clock: VersionClock,
    catalog: Catalog,
    write_lock: Mutex<()>,
}

impl Database {
    /// Opens a database over an existing store with the built-in indexers.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` if the stored catalog cannot
    /// be read.
    pub fn open(store: Arc<dyn KvStore>, config: Config) -> CoreResult<Self> {
        Self::builder().config(config).open(store)
    }

    /// Opens an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other openers.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::builder().open_in_memory()
    }

    /// Opens (or creates) a durable database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process holds the file, and storage or
    /// catalog errors from replay.
    pub fn open_path(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::builder().config(config).open_path(path)
    }

    /// Starts a builder, for custom indexers or configuration.
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// The configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// The indexer registry.
    #[must_use]
    pub fn registry(&self) -> &IndexerRegistry {
        &self.registry
    }

    /// Mutable access to the registry, for registering indexers before use.
    pub fn registry_mut(&mut self) -> &mut IndexerRegistry {
        &mut self.registry
    }

    fn documents(&self) -> DocumentStore<'_> {
        DocumentStore::new(self.store.as_ref(), &self.registry, &self.clock)
    }

    // -- schemas --

    /// Registers or replaces a table's schema, dropping and backfilling
    /// indexes as needed.
    ///
    /// # Errors
    ///
    /// See [`Migrator::migrate`].
    pub fn migrate(&self, schema: Schema) -> CoreResult<MigrationReport> {
        let _guard = self.write_lock.lock();
        Migrator::new(self.store.as_ref(), &self.registry, &self.clock, &self.catalog).migrate(schema)
    }

    /// Current schema of a table.
    #[must_use]
    pub fn schema(&self, table: &str) -> Option<Schema> {
        self.catalog.get(table).map(|schema| schema.as_ref().clone())
    }

    /// The schema a table had at `version`.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn schema_at(&self, table: &str, version: &str) -> CoreResult<Option<Schema>> {
        read_schema_version(self.store.as_ref(), table, version)
    }

    /// Every schema a table has had, oldest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for undecodable values.
    pub fn schema_history(&self, table: &str) -> CoreResult<Vec<Schema>> {
        read_schema_history(self.store.as_ref(), table)
    }

    /// Names of every migrated table.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.catalog.tables()
    }

    // -- documents --

    /// Writes a document and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` for unmigrated tables and see
    /// [`DocumentStore::put`].
    pub fn put(&self, table: &str, document: Document) -> CoreResult<String> {
        let _guard = self.write_lock.lock();
        let schema = self.catalog.require(table)?;
        self.documents().put(&schema, document)
    }

    /// Reads the latest version of a document; `None` if missing or deleted.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` for unmigrated tables and storage errors.
    pub fn get(&self, table: &str, id: &str) -> CoreResult<Option<Document>> {
        self.catalog.require(table)?;
        self.documents().get(table, id)
    }

    /// Like [`Database::get`], but a missing document is an error.
    ///
    /// # Errors
    ///
    /// Returns `DocumentAbsent` if the document is missing or deleted.
    pub fn get_required(&self, table: &str, id: &str) -> CoreResult<Document> {
        self.get(table, id)?
            .ok_or_else(|| CoreError::document_absent(table, id))
    }

    /// Reads one specific version of a document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` for unmigrated tables and storage errors.
    pub fn get_version(&self, table: &str, id: &str, version: &str) -> CoreResult<Option<Document>> {
        self.catalog.require(table)?;
        self.documents().get_version(table, id, version)
    }

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` for unmigrated tables and `DocumentAbsent`
    /// if there is nothing to delete.
    pub fn del(&self, table: &str, id: &str) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let schema = self.catalog.require(table)?;
        self.documents().del(&schema, id)
    }

    /// Every stored version of a document, oldest first; deletions appear
    /// with no document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` for unmigrated tables and storage errors.
    pub fn history(&self, table: &str, id: &str) -> CoreResult<Vec<DocumentVersion>> {
        self.catalog.require(table)?;
        self.documents().history(table, id)
    }

    // -- queries --

    /// Plans a filter without running it.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` and `InvalidQuery`.
    pub fn explain(&self, table: &str, filter: Option<&Filter>) -> CoreResult<QueryPlan> {
        let schema = self.catalog.require(table)?;
        Planner::new(&schema, &self.registry).plan(filter)
    }

    /// Runs a table query, then its projections.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound`, `InvalidQuery`, `FullScanForbidden` and
    /// storage errors.
    pub fn query(&self, query: &Query) -> CoreResult<QueryResult> {
        let plan = self.explain(&query.table, query.filter.as_ref())?;
        debug!(table = %query.table, full_scan = plan.is_full_scan(), "running query");
        let result = Executor::new(self.store.as_ref(), &self.config).execute(&plan, query)?;
        self.project(&query.table, &query.projections, result)
    }

    /// Writes each projection's nested result into every document.
    fn project(
        &self,
        table: &str,
        projections: &[Projection],
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        let QueryResult::Documents(mut docs) = result else {
            return Ok(result);
        };
        if projections.is_empty() {
            return Ok(QueryResult::Documents(docs));
        }
        let schema = self.catalog.require(table)?;
        let mut prepared = Vec::with_capacity(projections.len());
        for projection in projections {
            let target = projection.query.table.as_str();
            let spec = schema.indexes.get(&projection.index).ok_or_else(|| {
                CoreError::invalid_query(format!("{table} has no index {}", projection.index))
            })?;
            if spec.kind != LINK || spec.linked_table.as_deref() != Some(target) {
                return Err(CoreError::invalid_query(format!(
                    "projection {} needs a link index of {table} into {target}",
                    projection.name
                )));
            }
            if projection.name.starts_with('_') {
                return Err(CoreError::invalid_query(format!(
                    "projection name {} is reserved",
                    projection.name
                )));
            }
            let target_schema = self.catalog.require(target)?;
            let plan = Planner::new(&target_schema, &self.registry)
                .plan(projection.query.filter.as_ref())?;
            prepared.push((projection, spec, plan));
        }

        // Targets are read from the document as stored, before any
        // projection is written into it.
        for doc in &mut docs {
            let mut joined = Vec::with_capacity(prepared.len());
            for (projection, spec, plan) in &prepared {
                let ctx = IndexContext {
                    table,
                    name: &projection.index,
                    spec,
                };
                let mut seen = HashSet::new();
                let ids: Vec<String> = LinkIndexer::links(&ctx, doc)?
                    .into_iter()
                    .map(|link| link.object.id)
                    .filter(|id| seen.insert(id.clone()))
                    .collect();
                let target = projection.query.table.as_str();
                let nested = Executor::finish(self.linked(target, ids, plan), &projection.query)?;
                let nested = match self.project(target, &projection.query.projections, nested)? {
                    QueryResult::Documents(found) => {
                        Value::Array(found.into_iter().map(Value::Object).collect())
                    }
                    QueryResult::Count(count) => Value::from(count),
                };
                joined.push((projection.name.clone(), nested));
            }
            doc.extend(joined);
        }
        Ok(QueryResult::Documents(docs))
    }

    /// Latest documents of `ids` in `table` that pass the plan's predicate.
    fn linked<'a>(&'a self, table: &'a str, ids: Vec<String>, plan: &'a QueryPlan) -> Candidates<'a> {
        let store = self.store.as_ref();
        Box::new(ids.into_iter().filter_map(move |id| {
            match load_latest(store, table, &id) {
                Ok(Some(doc)) if plan.predicate.as_ref().map_or(true, |p| p.matches(&doc)) => {
                    Some(Ok(doc))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Documents of `table` matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`Database::query`].
    pub fn find(&self, table: &str, filter: Filter) -> CoreResult<Vec<Document>> {
        Ok(self
            .query(&Query::new(table).filter(filter))?
            .into_documents())
    }

    /// Runs a graph pattern query.
    ///
    /// A single-node pattern selects the node's table through its filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for malformed patterns and storage errors.
    pub fn query_graph(&self, query: &GraphQuery) -> CoreResult<GraphResult> {
        query.validate()?;
        let [node] = query.pattern.as_slice() else {
            return GraphExecutor::new(self.store.as_ref()).run(query);
        };
        let table = node
            .bound()
            .ok_or_else(|| CoreError::invalid_query("a single-node pattern needs a type"))?;
        let mut bindings = Bindings::new(&query.output);
        if !bindings.wants(node.tag.as_deref()) {
            return Ok(bindings.finish());
        }
        let mut table_query = Query::new(table);
        table_query.filter = node.filter.clone();
        for doc in self.query(&table_query)?.into_documents() {
            let Some(id) = document_id(&doc).map(str::to_string) else {
                continue;
            };
            bindings.record(
                node.tag.as_deref(),
                Binding::Entity {
                    reference: EntityRef::new(table, id),
                    document: Some(doc),
                },
            );
        }
        Ok(bindings.finish())
    }

    /// Runs either kind of request.
    ///
    /// # Errors
    ///
    /// See [`Database::query`] and [`Database::query_graph`].
    pub fn execute(&self, request: &Request) -> CoreResult<Response> {
        match request {
            Request::Graph(query) => self.query_graph(query).map(Response::Graph),
            Request::Query(query) => self.query(query).map(Response::Query),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.tables())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Configures and opens a [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    config: Config,
    registry: IndexerRegistry,
}

impl DatabaseBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers a custom indexer under `name`.
    #[must_use]
    pub fn indexer(mut self, name: impl Into<String>, indexer: impl Indexer + 'static) -> Self {
        self.registry.register(name, indexer);
        self
    }

    /// Opens over an existing store.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `Corrupted` for an unreadable catalog.
    pub fn open(self, store: Arc<dyn KvStore>) -> CoreResult<Database> {
        let catalog = Catalog::load(store.as_ref())?;
        debug!(tables = catalog.tables().len(), "opened database");
        Ok(Database {
            store,
            registry: self.registry,
            config: self.config,
            clock: VersionClock::new(),
            catalog,
            write_lock: Mutex::new(()),
        })
    }

    /// Opens over a fresh [`MemoryStore`].
    ///
    /// # Errors
    ///
    /// See [`DatabaseBuilder::open`].
    pub fn open_in_memory(self) -> CoreResult<Database> {
        let store = MemoryStore::with_chunk_size(self.config.scan_chunk_size);
        self.open(Arc::new(store))
    }

    /// Opens over a [`LogStore`] at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Locked`, I/O and replay errors from the store.
    pub fn open_path(self, path: impl AsRef<Path>) -> CoreResult<Database> {
        let store_config = LogStoreConfig::default()
            .sync_on_commit(self.config.sync_on_commit)
            .chunk_size(self.config.scan_chunk_size);
        let store = LogStore::open(path.as_ref(), store_config)?;
        self.open(Arc::new(store))
    }
}
