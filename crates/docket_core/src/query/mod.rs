//! Filter queries over one table.
//!
//! A [`Query`] names a table and an optional [`Filter`]. The [`Planner`]
//! picks index ranges that cover every possible match, and the
//! [`Executor`] scans them, fetches the documents and re-checks the
//! compiled [`Predicate`]. [`Projection`]s join linked documents into
//! each result.

mod executor;
mod filter;
mod planner;
mod predicate;

pub use executor::{Candidates, Executor, IndexCandidates, TableScan};
pub use filter::Filter;
pub use planner::{Access, IndexScan, Planner, QueryPlan};
pub use predicate::{compare, equals, sort_order, Comparison, Predicate};

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Field path to sort by.
    pub field: String,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
}

impl Order {
    /// Ascending by `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending by `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// A table query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Target table.
    pub table: String,
    /// Filter; `None` selects every document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Sort order; unordered results come in candidate order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    /// Number of results to skip.
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Return the number of matches instead of the documents.
    #[serde(default)]
    pub count: bool,
    /// Keep only the first document per value of this field path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<String>,
    /// Linked documents joined into each result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projections: Vec<Projection>,
}

/// A nested query over the targets of a link index.
///
/// For every result document the targets of `index` are queried with
/// `query`, whose table must be the index's `linkedTable`, and the nested
/// result (documents or count) is stored under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Attribute the nested result is written to.
    pub name: String,
    /// Link index of the outer table.
    pub index: String,
    /// Query over the linked documents.
    pub query: Query,
}

impl Projection {
    /// Projects the targets of `index` through `query` into `name`.
    pub fn new(name: impl Into<String>, index: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            query,
        }
    }
}

impl Query {
    /// Selects every document of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order: None,
            offset: 0,
            limit: None,
            count: false,
            distinct: None,
            projections: Vec::new(),
        }
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keeps one document per value of `field`.
    #[must_use]
    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.distinct = Some(field.into());
        self
    }

    /// Adds a projection.
    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    /// Asks for a count; offset and limit are ignored.
    #[must_use]
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Outcome of a table query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryResult {
    /// Matching documents.
    Documents(Vec<Document>),
    /// Number of matching documents.
    Count(usize),
}

impl QueryResult {
    /// The documents, or an empty list for a count.
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Documents(docs) => docs,
            Self::Count(_) => Vec::new(),
        }
    }
}
