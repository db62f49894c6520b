//! In-memory evaluation of filters.

use super::filter::Filter;
use crate::document::{resolve, Document};
use crate::error::{CoreError, CoreResult};
use crate::index::text::{analyze, analyze_value};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Comparison applied by a single-value leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `eq`
    Eq,
    /// `neq`
    Neq,
    /// `gt`
    Gt,
    /// `gte`
    Gte,
    /// `lt`
    Lt,
    /// `lte`
    Lte,
}

/// A filter compiled for evaluation against documents.
///
/// Regular expressions and search terms are prepared once, so a predicate
/// can be applied to many documents cheaply.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Single-value comparison.
    Compare {
        /// Field path.
        field: String,
        /// Operator.
        op: Comparison,
        /// Literal.
        value: Value,
    },
    /// Inclusive interval membership.
    Within {
        /// Field path.
        field: String,
        /// Lower bound.
        start: Value,
        /// Upper bound.
        end: Value,
    },
    /// Outside an inclusive interval.
    Without {
        /// Field path.
        field: String,
        /// Lower bound.
        start: Value,
        /// Upper bound.
        end: Value,
    },
    /// Membership in a literal set.
    In {
        /// Field path.
        field: String,
        /// Literals.
        values: Vec<Value>,
    },
    /// Regular expression search over a string field.
    Match {
        /// Field path.
        field: String,
        /// Compiled expression.
        regex: Regex,
    },
    /// Every term present in the field's analyzed text.
    Search {
        /// Field path.
        field: String,
        /// Analyzed query terms.
        terms: BTreeSet<String>,
    },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Compiles a filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for an invalid regular expression.
    pub fn compile(filter: &Filter) -> CoreResult<Self> {
        let compare = |field: &String, op, value: &Value| Self::Compare {
            field: field.clone(),
            op,
            value: value.clone(),
        };
        Ok(match filter {
            Filter::Eq { field, value } => compare(field, Comparison::Eq, value),
            Filter::Neq { field, value } => compare(field, Comparison::Neq, value),
            Filter::Gt { field, value } => compare(field, Comparison::Gt, value),
            Filter::Gte { field, value } => compare(field, Comparison::Gte, value),
            Filter::Lt { field, value } => compare(field, Comparison::Lt, value),
            Filter::Lte { field, value } => compare(field, Comparison::Lte, value),
            Filter::Within { field, start, end } => Self::Within {
                field: field.clone(),
                start: start.clone(),
                end: end.clone(),
            },
            Filter::Without { field, start, end } => Self::Without {
                field: field.clone(),
                start: start.clone(),
                end: end.clone(),
            },
            Filter::In { field, values } => Self::In {
                field: field.clone(),
                values: values.clone(),
            },
            Filter::Match { field, value } => Self::Match {
                field: field.clone(),
                regex: Regex::new(value).map_err(|e| {
                    CoreError::invalid_query(format!("bad pattern for {field}: {e}"))
                })?,
            },
            Filter::Search { field, value } => Self::Search {
                field: field.clone(),
                terms: analyze(value),
            },
            Filter::And { expressions } => {
                Self::And(expressions.iter().map(Self::compile).collect::<CoreResult<_>>()?)
            }
            Filter::Or { expressions } => {
                Self::Or(expressions.iter().map(Self::compile).collect::<CoreResult<_>>()?)
            }
        })
    }

    /// Evaluates the predicate against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Compare { field, op, value } => {
                let actual = resolve(doc, field);
                match op {
                    Comparison::Eq => equals(actual, value),
                    Comparison::Neq => !equals(actual, value),
                    Comparison::Gt => compare(actual, value) == Some(Ordering::Greater),
                    Comparison::Gte => compare(actual, value).is_some_and(Ordering::is_ge),
                    Comparison::Lt => compare(actual, value) == Some(Ordering::Less),
                    Comparison::Lte => compare(actual, value).is_some_and(Ordering::is_le),
                }
            }
            Self::Within { field, start, end } => {
                let actual = resolve(doc, field);
                compare(actual, start).is_some_and(Ordering::is_ge)
                    && compare(actual, end).is_some_and(Ordering::is_le)
            }
            Self::Without { field, start, end } => {
                let actual = resolve(doc, field);
                compare(actual, start) == Some(Ordering::Less)
                    || compare(actual, end) == Some(Ordering::Greater)
            }
            Self::In { field, values } => {
                let actual = resolve(doc, field);
                values.iter().any(|value| equals(actual, value))
            }
            Self::Match { field, regex } => match resolve(doc, field) {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Self::Search { field, terms } => {
                !terms.is_empty() && terms.is_subset(&analyze_value(resolve(doc, field)))
            }
            Self::And(children) => children.iter().all(|p| p.matches(doc)),
            Self::Or(children) => children.iter().any(|p| p.matches(doc)),
        }
    }
}

/// Orders a field value against a literal of the same JSON type.
///
/// Returns `None` when the types differ or are arrays/objects. A missing
/// field behaves like `null`.
#[must_use]
pub fn compare(actual: Option<&Value>, literal: &Value) -> Option<Ordering> {
    match (actual.unwrap_or(&Value::Null), literal) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

/// JSON equality, with numbers compared numerically.
#[must_use]
pub fn equals(actual: Option<&Value>, literal: &Value) -> bool {
    match compare(actual, literal) {
        Some(ordering) => ordering.is_eq(),
        None => actual.is_some_and(|a| a == literal),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting results: by JSON type first
/// (null, bool, number, string, array, object), then by value.
#[must_use]
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| compare(Some(a), b).unwrap_or_else(|| a.to_string().cmp(&b.to_string())))
}
