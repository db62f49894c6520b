//! Triple-pattern graph queries.

use super::link::{EntityRef, Link, Permutation, Position};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::keys::{self, link_prefix, prefix_range};
use crate::query::{Filter, Predicate};
use crate::store::load_latest;
use docket_storage::KvStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// Type wildcard: a node or edge that binds any type.
pub const ANY: &str = "*";

/// One node or edge of a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternNode {
    /// Name bindings are reported under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Table (for nodes) or predicate (for edges); absent or `*` is unbound.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Filter over the node's document or the edge's data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl PatternNode {
    /// A pattern element binding `kind` under `tag`.
    pub fn new(tag: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            kind: Some(kind.into()),
            filter: None,
        }
    }

    /// An untyped pattern element.
    pub fn any(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            kind: None,
            filter: None,
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The bound type, if any.
    #[must_use]
    pub fn bound(&self) -> Option<&str> {
        self.kind.as_deref().filter(|kind| *kind != ANY)
    }
}

/// A chain `node, edge, node, edge, node, ...` and the tags to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Alternating nodes and edges, starting and ending with a node.
    #[serde(rename = "match")]
    pub pattern: Vec<PatternNode>,
    /// Tags whose bindings are returned.
    #[serde(default)]
    pub output: Vec<String>,
}

impl GraphQuery {
    /// Creates a query.
    #[must_use]
    pub fn new(pattern: Vec<PatternNode>, output: Vec<String>) -> Self {
        Self { pattern, output }
    }

    /// Checks the pattern has odd length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for an empty or even-length pattern.
    pub fn validate(&self) -> CoreResult<()> {
        if self.pattern.len() % 2 == 0 {
            return Err(CoreError::invalid_query(format!(
                "a graph pattern alternates nodes and edges, got {} elements",
                self.pattern.len()
            )));
        }
        Ok(())
    }

    /// The `(node, edge, node)` windows of the pattern.
    pub fn triples(&self) -> impl Iterator<Item = Triple<'_>> {
        self.pattern
            .windows(3)
            .step_by(2)
            .map(|w| Triple {
                subject: &w[0],
                edge: &w[1],
                object: &w[2],
            })
    }
}

/// One `(node, edge, node)` window.
#[derive(Debug, Clone, Copy)]
pub struct Triple<'q> {
    /// Subject node.
    pub subject: &'q PatternNode,
    /// Edge.
    pub edge: &'q PatternNode,
    /// Object node.
    pub object: &'q PatternNode,
}

impl Triple<'_> {
    fn element(&self, position: Position) -> &PatternNode {
        match position {
            Position::Subject => self.subject,
            Position::Predicate => self.edge,
            Position::Object => self.object,
        }
    }

    /// The permutation and prefix that enumerate candidate edges.
    #[must_use]
    pub fn scan_prefix(&self) -> (Permutation, String) {
        let permutation = Permutation::for_bound(
            self.subject.bound().is_some(),
            self.edge.bound().is_some(),
            self.object.bound().is_some(),
        );
        let bound: Vec<&str> = permutation
            .order()
            .iter()
            .map_while(|p| self.element(*p).bound())
            .collect();
        (permutation, link_prefix(permutation.name(), &bound))
    }
}

/// A value bound to a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Binding {
    /// A document, with its latest state when it exists.
    Entity {
        /// The document reference.
        reference: EntityRef,
        /// Latest state, `None` if missing or deleted.
        document: Option<Document>,
    },
    /// An edge.
    Edge {
        /// The edge.
        link: Link,
    },
}

impl Binding {
    fn identity(&self) -> String {
        match self {
            Self::Entity { reference, .. } => reference.to_string(),
            Self::Edge { link } => link.key(Permutation::Spo),
        }
    }
}

/// Bindings per output tag.
pub type GraphResult = BTreeMap<String, Vec<Binding>>;

/// Collects bindings per tag, dropping duplicates.
#[derive(Debug, Default)]
pub struct Bindings {
    output: BTreeSet<String>,
    seen: BTreeSet<(String, String)>,
    result: GraphResult,
}

impl Bindings {
    /// Creates a collector for the given output tags.
    #[must_use]
    pub fn new(output: &[String]) -> Self {
        Self {
            output: output.iter().cloned().collect(),
            seen: BTreeSet::new(),
            result: output.iter().map(|tag| (tag.clone(), Vec::new())).collect(),
        }
    }

    /// Returns `true` if `tag` is reported.
    #[must_use]
    pub fn wants(&self, tag: Option<&str>) -> bool {
        tag.is_some_and(|tag| self.output.contains(tag))
    }

    /// Records a binding under `tag` unless it is already there.
    pub fn record(&mut self, tag: Option<&str>, binding: Binding) {
        let Some(tag) = tag.filter(|tag| self.output.contains(*tag)) else {
            return;
        };
        if self.seen.insert((tag.to_string(), binding.identity())) {
            self.result.entry(tag.to_string()).or_default().push(binding);
        }
    }

    /// Finishes collection.
    #[must_use]
    pub fn finish(self) -> GraphResult {
        self.result
    }
}

/// Runs multi-element graph patterns against the link store.
pub struct GraphExecutor<'a> {
    store: &'a dyn KvStore,
    documents: HashMap<EntityRef, Option<Document>>,
}

impl<'a> GraphExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            documents: HashMap::new(),
        }
    }

    /// Evaluates every triple of the query independently and unions the
    /// bindings per tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for malformed patterns or filters and storage
    /// errors from scans.
    pub fn run(&mut self, query: &GraphQuery) -> CoreResult<GraphResult> {
        query.validate()?;
        let mut bindings = Bindings::new(&query.output);
        for triple in query.triples() {
            self.run_triple(&triple, &mut bindings)?;
        }
        Ok(bindings.finish())
    }

    fn run_triple(&mut self, triple: &Triple<'_>, bindings: &mut Bindings) -> CoreResult<()> {
        let compile = |node: &PatternNode| node.filter.as_ref().map(Predicate::compile).transpose();
        let subject_filter = compile(triple.subject)?;
        let edge_filter = compile(triple.edge)?;
        let object_filter = compile(triple.object)?;

        let (permutation, prefix) = triple.scan_prefix();
        trace!(permutation = permutation.name(), prefix = %keys::printable(&prefix), "scanning links");

        let store = self.store;
        for item in store.scan(&prefix_range(&prefix))? {
            let (key, bytes) = item?;
            let link = Link::from_payload(&bytes)
                .map_err(|e| CoreError::corrupted(keys::printable(&key), e.to_string()))?;

            if let Some(predicate) = &edge_filter {
                let data = match &link.data {
                    Value::Object(data) => data.clone(),
                    _ => Document::new(),
                };
                if !predicate.matches(&data) {
                    continue;
                }
            }
            if !self.node_passes(&link.subject, subject_filter.as_ref())?
                || !self.node_passes(&link.object, object_filter.as_ref())?
            {
                continue;
            }

            let subject_tag = triple.subject.tag.as_deref();
            if bindings.wants(subject_tag) {
                let binding = self.entity(&link.subject)?;
                bindings.record(subject_tag, binding);
            }
            let object_tag = triple.object.tag.as_deref();
            if bindings.wants(object_tag) {
                let binding = self.entity(&link.object)?;
                bindings.record(object_tag, binding);
            }
            bindings.record(triple.edge.tag.as_deref(), Binding::Edge { link });
        }
        Ok(())
    }

    fn document(&mut self, reference: &EntityRef) -> CoreResult<Option<&Document>> {
        if !self.documents.contains_key(reference) {
            let doc = load_latest(self.store, &reference.table, &reference.id)?;
            self.documents.insert(reference.clone(), doc);
        }
        Ok(self.documents.get(reference).and_then(Option::as_ref))
    }

    fn node_passes(&mut self, reference: &EntityRef, filter: Option<&Predicate>) -> CoreResult<bool> {
        let Some(filter) = filter else {
            return Ok(true);
        };
        Ok(self.document(reference)?.is_some_and(|doc| filter.matches(doc)))
    }

    fn entity(&mut self, reference: &EntityRef) -> CoreResult<Binding> {
        Ok(Binding::Entity {
            reference: reference.clone(),
            document: self.document(reference)?.cloned(),
        })
    }
}
