//! Link indexer: turns reference fields into graph edges.

use super::traits::{IndexContext, IndexEntry, IndexFamily, Indexer};
use crate::document::{document_id, resolve, validate_id, Document};
use crate::error::{CoreError, CoreResult};
use crate::graph::{EntityRef, Link};
use crate::keys;
use serde_json::Value;

/// Materializes an edge `(doc, field, target)` for every reference held by
/// a declared field.
///
/// A field holds a reference or an array of references. With
/// `linkedTable` set a reference is a bare id in that table; without it a
/// reference is `Table:id`. Each edge is written under its six permutation
/// keys plus one entry in the index's own range whose value is the edge
/// payload, which is how dropping the index finds the permutation keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkIndexer;

impl LinkIndexer {
    fn target(ctx: &IndexContext<'_>, field: &str, value: &Value) -> CoreResult<EntityRef> {
        let Value::String(raw) = value else {
            return Err(CoreError::invalid_document(format!(
                "link field {field} must hold strings, got {value}"
            )));
        };
        match &ctx.spec.linked_table {
            Some(table) => {
                validate_id(raw)?;
                Ok(EntityRef::new(table.as_str(), raw.as_str()))
            }
            None => raw.parse(),
        }
    }

    /// Edges `doc` declares through the index's fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` for values that are not references.
    pub fn links(ctx: &IndexContext<'_>, doc: &Document) -> CoreResult<Vec<Link>> {
        let id = document_id(doc).ok_or_else(|| CoreError::invalid_document("missing _id"))?;
        let subject = EntityRef::new(ctx.table, id);
        let mut links = Vec::new();
        for field in &ctx.spec.fields {
            let targets = match resolve(doc, field) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items.iter().collect(),
                Some(single) => vec![single],
            };
            for value in targets {
                let object = Self::target(ctx, field, value)?;
                links.push(Link::new(subject.clone(), field.as_str(), object));
            }
        }
        Ok(links)
    }
}

impl Indexer for LinkIndexer {
    fn family(&self) -> IndexFamily {
        IndexFamily::Graph
    }

    fn index(&self, ctx: &IndexContext<'_>, doc: &Document) -> CoreResult<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        for link in Self::links(ctx, doc)? {
            let payload = link.to_payload()?;
            let value = Value::String(link.object.to_string());
            let own = keys::index_key(
                ctx.table,
                ctx.name,
                &keys::encode_value(Some(&value)),
                Some(&link.subject.id),
            );
            entries.extend(
                link.keys()
                    .into_iter()
                    .map(|key| IndexEntry::new(key, payload.clone())),
            );
            entries.push(IndexEntry::new(own, payload));
        }
        Ok(entries)
    }

    fn owned_keys(&self, value: &[u8]) -> CoreResult<Vec<String>> {
        Ok(Link::from_payload(value)?.keys())
    }
}
