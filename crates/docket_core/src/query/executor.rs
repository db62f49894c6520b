//! Plan execution.
//!
//! Candidates are produced lazily: index ranges are scanned one after the
//! other, ids are deduplicated in first-seen order, each latest document is
//! fetched and the full predicate is applied again. Without index access
//! the table's latest documents are scanned instead.

use super::planner::{Access, QueryPlan};
use super::predicate::{sort_order, Predicate};
use super::{Direction, Query, QueryResult};
use crate::config::Config;
use crate::document::{resolve, Document};
use crate::error::{CoreError, CoreResult};
use crate::keys::{self, encode_value, latest_prefix, prefix_range};
use crate::store::load_latest;
use docket_storage::{KvCursor, KvStore, ScanRange};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// Documents produced by a plan, in candidate order.
pub type Candidates<'a> = Box<dyn Iterator<Item = CoreResult<Document>> + 'a>;

fn accepts(predicate: Option<&Predicate>, doc: &Document) -> bool {
    predicate.map_or(true, |p| p.matches(doc))
}

/// Walks index ranges and yields each matching document once.
pub struct IndexCandidates<'a> {
    store: &'a dyn KvStore,
    table: &'a str,
    predicate: Option<&'a Predicate>,
    ranges: VecDeque<ScanRange>,
    cursor: Option<KvCursor<'a>>,
    seen: HashSet<String>,
}

impl<'a> IndexCandidates<'a> {
    /// Creates the iterator over `ranges`.
    #[must_use]
    pub fn new(
        store: &'a dyn KvStore,
        table: &'a str,
        predicate: Option<&'a Predicate>,
        ranges: impl IntoIterator<Item = ScanRange>,
    ) -> Self {
        Self {
            store,
            table,
            predicate,
            ranges: ranges.into_iter().collect(),
            cursor: None,
            seen: HashSet::new(),
        }
    }

    fn next_id(&mut self) -> Option<CoreResult<String>> {
        loop {
            if self.cursor.is_none() {
                let range = self.ranges.pop_front()?;
                match self.store.scan(&range) {
                    Ok(cursor) => self.cursor = Some(cursor),
                    Err(e) => return Some(Err(e.into())),
                }
            }
            let cursor = self.cursor.as_mut()?;
            match cursor.next() {
                None => self.cursor = None,
                Some(Err(e)) => return Some(Err(e.into())),
                Some(Ok((key, value))) => {
                    let id = match String::from_utf8(value) {
                        Ok(id) => id,
                        Err(e) => {
                            return Some(Err(CoreError::corrupted(
                                keys::printable(&key),
                                e.to_string(),
                            )))
                        }
                    };
                    if self.seen.insert(id.clone()) {
                        return Some(Ok(id));
                    }
                }
            }
        }
    }
}

impl Iterator for IndexCandidates<'_> {
    type Item = CoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = match self.next_id()? {
                Ok(id) => id,
                Err(e) => return Some(Err(e)),
            };
            match load_latest(self.store, self.table, &id) {
                Ok(Some(doc)) if accepts(self.predicate, &doc) => return Some(Ok(doc)),
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Visits every live document of a table.
pub struct TableScan<'a> {
    table: &'a str,
    predicate: Option<&'a Predicate>,
    cursor: KvCursor<'a>,
    visited: usize,
    warn_after: usize,
}

impl<'a> TableScan<'a> {
    /// Opens a scan over the table's latest documents.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the scan cannot be started.
    pub fn new(
        store: &'a dyn KvStore,
        table: &'a str,
        predicate: Option<&'a Predicate>,
        warn_after: usize,
    ) -> CoreResult<Self> {
        let cursor = store.scan(&prefix_range(&latest_prefix(table)))?;
        Ok(Self {
            table,
            predicate,
            cursor,
            visited: 0,
            warn_after,
        })
    }
}

impl Iterator for TableScan<'_> {
    type Item = CoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, bytes) = match self.cursor.next()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e.into())),
            };
            let doc = match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(doc)) => doc,
                Ok(Value::Null) => continue,
                Ok(other) => {
                    return Some(Err(CoreError::corrupted(
                        keys::printable(&key),
                        format!("expected an object or null, found {other}"),
                    )))
                }
                Err(e) => return Some(Err(CoreError::corrupted(keys::printable(&key), e.to_string()))),
            };
            self.visited += 1;
            if self.visited == self.warn_after + 1 {
                warn!(
                    table = self.table,
                    threshold = self.warn_after,
                    "full table scan exceeded the warning threshold"
                );
            }
            if accepts(self.predicate, &doc) {
                return Some(Ok(doc));
            }
        }
    }
}

/// Runs plans against a store.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    store: &'a dyn KvStore,
    config: &'a Config,
}

impl<'a> Executor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(store: &'a dyn KvStore, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Opens the candidate stream of a plan.
    ///
    /// # Errors
    ///
    /// Returns `FullScanForbidden` when the plan needs a full scan and the
    /// configuration disallows it, and storage errors.
    pub fn candidates(&self, plan: &'a QueryPlan) -> CoreResult<Candidates<'a>> {
        let predicate = plan.predicate.as_ref();
        match &plan.access {
            Access::FullScan => {
                if self.config.forbid_full_scans {
                    return Err(CoreError::FullScanForbidden {
                        table: plan.table.clone(),
                    });
                }
                Ok(Box::new(TableScan::new(
                    self.store,
                    &plan.table,
                    predicate,
                    self.config.scan_warning_threshold,
                )?))
            }
            Access::Index(scans) => Ok(Box::new(IndexCandidates::new(
                self.store,
                &plan.table,
                predicate,
                scans.iter().flat_map(|scan| scan.ranges.iter().cloned()),
            ))),
        }
    }

    /// Runs a query's plan and applies ordering, paging and counting.
    ///
    /// # Errors
    ///
    /// See [`Executor::candidates`].
    pub fn execute(&self, plan: &'a QueryPlan, query: &Query) -> CoreResult<QueryResult> {
        Self::finish(self.candidates(plan)?, query)
    }

    /// Applies a query's ordering, `distinct`, paging and counting to a
    /// candidate stream.
    ///
    /// `distinct` keeps the first document per value of its field, after
    /// ordering and before offset, limit and count.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `candidates`.
    pub fn finish(candidates: Candidates<'_>, query: &Query) -> CoreResult<QueryResult> {
        let mut distinct = Distinct::new(query.distinct.as_deref());
        if query.count {
            let mut count = 0;
            for doc in candidates {
                if distinct.admit(&doc?) {
                    count += 1;
                }
            }
            return Ok(QueryResult::Count(count));
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let Some(order) = &query.order else {
            let mut docs = Vec::new();
            let mut skipped = 0;
            for doc in candidates {
                if docs.len() >= limit {
                    break;
                }
                let doc = doc?;
                if !distinct.admit(&doc) {
                    continue;
                }
                if skipped < query.offset {
                    skipped += 1;
                } else {
                    docs.push(doc);
                }
            }
            return Ok(QueryResult::Documents(docs));
        };

        let mut docs = candidates.collect::<CoreResult<Vec<_>>>()?;
        docs.sort_by(|a, b| {
            let ordering = sort_order(resolve(a, &order.field), resolve(b, &order.field));
            match order.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        });
        Ok(QueryResult::Documents(
            docs.into_iter()
                .filter(|doc| distinct.admit(doc))
                .skip(query.offset)
                .take(limit)
                .collect(),
        ))
    }
}

/// First-seen filter on one field's encoded value.
struct Distinct<'q> {
    field: Option<&'q str>,
    seen: HashSet<String>,
}

impl<'q> Distinct<'q> {
    fn new(field: Option<&'q str>) -> Self {
        Self {
            field,
            seen: HashSet::new(),
        }
    }

    fn admit(&mut self, doc: &Document) -> bool {
        self.field
            .map_or(true, |field| self.seen.insert(encode_value(resolve(doc, field))))
    }
}
