//! Name to indexer mapping.

use super::equality::EqualityIndexer;
use super::inverted::InvertedIndexer;
use super::link::LinkIndexer;
use super::traits::{IndexFamily, Indexer};
use super::{EQUALITY, INVERTED, LINK};
use crate::error::{CoreError, CoreResult};
use crate::schema::{IndexSpec, Schema};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Indexers available to schemas, keyed by type name.
///
/// Built once when a database is opened. A schema may only declare index
/// types present here.
#[derive(Debug, Clone)]
pub struct IndexerRegistry {
    indexers: BTreeMap<String, Arc<dyn Indexer>>,
}

impl IndexerRegistry {
    /// Creates a registry with no indexers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            indexers: BTreeMap::new(),
        }
    }

    /// Creates a registry with `equality`, `inverted` and `link`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(EQUALITY, EqualityIndexer);
        registry.register(INVERTED, InvertedIndexer);
        registry.register(LINK, LinkIndexer);
        registry
    }

    /// Registers `indexer` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, indexer: impl Indexer + 'static) {
        self.indexers.insert(name.into(), Arc::new(indexer));
    }

    /// Looks up an indexer by type name.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Indexer>> {
        self.indexers.get(kind)
    }

    /// Looks up the indexer for a declared index.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndexType` if the type is not registered.
    pub fn require(&self, index: &str, spec: &IndexSpec) -> CoreResult<&Arc<dyn Indexer>> {
        self.get(&spec.kind).ok_or_else(|| CoreError::UnknownIndexType {
            index: index.to_string(),
            kind: spec.kind.clone(),
        })
    }

    /// Family of a declared index, if its type is registered.
    #[must_use]
    pub fn family(&self, spec: &IndexSpec) -> Option<IndexFamily> {
        self.get(&spec.kind).map(|indexer| indexer.family())
    }

    /// Checks that every index of `schema` has a registered type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndexType` for the first unregistered type.
    pub fn check(&self, schema: &Schema) -> CoreResult<()> {
        for (name, spec) in &schema.indexes {
            self.require(name, spec)?;
        }
        Ok(())
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indexers.keys().map(String::as_str)
    }
}

impl Default for IndexerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::index::{IndexContext, IndexEntry};

    #[derive(Debug)]
    struct LengthIndexer;

    impl Indexer for LengthIndexer {
        fn family(&self) -> IndexFamily {
            IndexFamily::Equality
        }

        fn index(&self, _ctx: &IndexContext<'_>, _doc: &Document) -> CoreResult<Vec<IndexEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = IndexerRegistry::with_builtins();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["equality", "inverted", "link"]
        );
        assert_eq!(
            registry.family(&IndexSpec::inverted(["bio"])),
            Some(IndexFamily::FullText)
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        let registry = IndexerRegistry::with_builtins();
        let schema = Schema::new("User").with_index("geo", IndexSpec::new("geohash", ["loc"]));
        let err = registry.check(&schema).unwrap_err();
        assert!(matches!(err, CoreError::UnknownIndexType { kind, .. } if kind == "geohash"));
    }

    #[test]
    fn custom_indexers_can_be_added() {
        let mut registry = IndexerRegistry::empty();
        registry.register("length", LengthIndexer);
        let schema = Schema::new("User").with_index("len", IndexSpec::new("length", ["name"]));
        assert!(registry.check(&schema).is_ok());
        assert!(registry.get(EQUALITY).is_none());
    }
}
