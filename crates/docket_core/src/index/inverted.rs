//! Full-text indexer.

use super::text::analyze_value;
use super::traits::{IndexContext, IndexEntry, IndexFamily, Indexer};
use crate::document::{document_id, resolve, Document};
use crate::error::{CoreError, CoreResult};
use crate::keys;
use std::collections::BTreeSet;

/// Writes one entry per distinct analyzed term of the declared fields.
///
/// Keys are `index prefix + term + id`; the value is the document id.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvertedIndexer;

impl InvertedIndexer {
    /// Distinct terms of `doc` across `fields`.
    #[must_use]
    pub fn terms(fields: &[String], doc: &Document) -> BTreeSet<String> {
        fields
            .iter()
            .flat_map(|field| analyze_value(resolve(doc, field)))
            .collect()
    }
}

impl Indexer for InvertedIndexer {
    fn family(&self) -> IndexFamily {
        IndexFamily::FullText
    }

    fn index(&self, ctx: &IndexContext<'_>, doc: &Document) -> CoreResult<Vec<IndexEntry>> {
        let id = document_id(doc).ok_or_else(|| CoreError::invalid_document("missing _id"))?;
        Ok(Self::terms(&ctx.spec.fields, doc)
            .iter()
            .map(|term| {
                let key = keys::index_key(ctx.table, ctx.name, &keys::encode_term(term), Some(id));
                IndexEntry::new(key, id.as_bytes())
            })
            .collect())
    }
}
