//! Equality (and compound) indexer.

use super::traits::{IndexContext, IndexEntry, IndexFamily, Indexer};
use crate::document::{document_id, resolve, Document};
use crate::error::{CoreError, CoreResult};
use crate::keys;

/// Indexes the typed values of one or more fields.
///
/// The entry key is the index prefix, each field's encoded value in
/// declaration order, then the document id. Unique indexes leave the id
/// out, so two documents with the same values collide on one key. Missing
/// fields encode as `NULL`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EqualityIndexer;

impl EqualityIndexer {
    /// Encodes the indexed value of `doc` for `fields`.
    #[must_use]
    pub fn encode(fields: &[String], doc: &Document) -> String {
        fields
            .iter()
            .map(|field| keys::encode_value(resolve(doc, field)))
            .collect()
    }
}

impl Indexer for EqualityIndexer {
    fn family(&self) -> IndexFamily {
        IndexFamily::Equality
    }

    fn index(&self, ctx: &IndexContext<'_>, doc: &Document) -> CoreResult<Vec<IndexEntry>> {
        let id = document_id(doc).ok_or_else(|| CoreError::invalid_document("missing _id"))?;
        let value = Self::encode(&ctx.spec.fields, doc);
        let key = keys::index_key(
            ctx.table,
            ctx.name,
            &value,
            (!ctx.spec.unique).then_some(id),
        );
        Ok(vec![IndexEntry::new(key, id.as_bytes())])
    }
}
