//! Turns a filter into index range scans.
//!
//! Every plan carries the compiled predicate; index access only narrows
//! the candidate set and is always re-checked, so a range only has to be a
//! superset of the matching entries.

use super::filter::Filter;
use super::predicate::Predicate;
use crate::error::CoreResult;
use crate::index::text::analyze;
use crate::index::{IndexFamily, IndexerRegistry};
use crate::keys::{self, encode_term, encode_value, index_prefix, type_tag, upper_bound};
use crate::schema::Schema;
use docket_storage::ScanRange;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::ops::Bound;
use tracing::trace;

/// Range scans over one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexScan {
    /// Index name.
    pub index: String,
    /// Key ranges to scan, in order.
    pub ranges: Vec<ScanRange>,
}

/// How candidate documents are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Visit every live document of the table.
    FullScan,
    /// Union of the ids found by these scans.
    Index(Vec<IndexScan>),
}

/// An executable query plan.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Target table.
    pub table: String,
    /// Source filter, if any.
    pub filter: Option<Filter>,
    /// Predicate every result must satisfy.
    pub predicate: Option<Predicate>,
    /// Candidate access path.
    pub access: Access,
}

impl QueryPlan {
    /// Returns `true` if the plan visits every document.
    #[must_use]
    pub fn is_full_scan(&self) -> bool {
        self.access == Access::FullScan
    }

    /// Renders the plan for `explain`.
    #[must_use]
    pub fn describe(&self) -> Value {
        let access = match &self.access {
            Access::FullScan => json!("full_scan"),
            Access::Index(scans) => json!({
                "index": scans
                    .iter()
                    .map(|scan| json!({
                        "index": scan.index,
                        "ranges": scan.ranges.iter().map(describe_range).collect::<Vec<_>>(),
                    }))
                    .collect::<Vec<_>>()
            }),
        };
        json!({
            "table": self.table,
            "filter": self.filter,
            "access": access,
        })
    }
}

fn describe_bound(bound: &Bound<String>) -> Value {
    match bound {
        Bound::Included(key) => json!({ "gte": keys::printable(key) }),
        Bound::Excluded(key) => json!({ "gt": keys::printable(key) }),
        Bound::Unbounded => Value::Null,
    }
}

fn describe_range(range: &ScanRange) -> Value {
    let upper = match &range.upper {
        Bound::Included(key) => json!({ "lte": keys::printable(key) }),
        Bound::Excluded(key) => json!({ "lt": keys::printable(key) }),
        Bound::Unbounded => Value::Null,
    };
    json!({ "lower": describe_bound(&range.lower), "upper": upper })
}

/// Chooses access paths for filters against one schema.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    schema: &'a Schema,
    registry: &'a IndexerRegistry,
}

impl<'a> Planner<'a> {
    /// Creates a planner.
    #[must_use]
    pub fn new(schema: &'a Schema, registry: &'a IndexerRegistry) -> Self {
        Self { schema, registry }
    }

    /// Plans a query over the schema's table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the filter cannot be compiled.
    pub fn plan(&self, filter: Option<&Filter>) -> CoreResult<QueryPlan> {
        let predicate = filter.map(Predicate::compile).transpose()?;
        let access = filter
            .and_then(|f| self.access(f))
            .map_or(Access::FullScan, Access::Index);
        let plan = QueryPlan {
            table: self.schema.name.clone(),
            filter: filter.cloned(),
            predicate,
            access,
        };
        trace!(table = %plan.table, full_scan = plan.is_full_scan(), "planned query");
        Ok(plan)
    }

    fn access(&self, filter: &Filter) -> Option<Vec<IndexScan>> {
        match filter {
            Filter::And { expressions } => self
                .compound(expressions)
                .map(|scan| vec![scan])
                .or_else(|| expressions.iter().find_map(|child| self.access(child))),
            Filter::Or { expressions } => {
                let mut scans = Vec::new();
                for child in expressions {
                    scans.extend(self.access(child)?);
                }
                Some(scans)
            }
            leaf => self.leaf(leaf).map(|scan| vec![scan]),
        }
    }

    /// The single-field index of `family` on `field`, if exactly one exists.
    fn single_index(&self, field: &str, family: IndexFamily) -> Option<&'a str> {
        let mut found = self.schema.indexes.iter().filter(|(_, spec)| {
            spec.single_field() == Some(field) && self.registry.family(spec) == Some(family)
        });
        match (found.next(), found.next()) {
            (Some((name, _)), None) => Some(name.as_str()),
            _ => None,
        }
    }

    fn leaf(&self, filter: &Filter) -> Option<IndexScan> {
        let family = match filter {
            Filter::Search { .. } => IndexFamily::FullText,
            Filter::Match { .. } | Filter::And { .. } | Filter::Or { .. } => return None,
            _ => IndexFamily::Equality,
        };
        let index = self.single_index(filter.field()?, family)?;
        let base = index_prefix(&self.schema.name, index);
        let at = |value: &Value| format!("{base}{}", encode_value(Some(value)));
        let region = |value: &Value| format!("{base}{}", type_tag(Some(value)));

        let ranges = match filter {
            Filter::Eq { value, .. } => vec![keys::prefix_range(&at(value))],
            Filter::Neq { value, .. } => vec![
                ScanRange::half_open(base.as_str(), at(value)),
                ScanRange::half_open(upper_bound(&at(value)), upper_bound(&base)),
            ],
            Filter::Gt { value, .. } => vec![ScanRange::half_open(
                upper_bound(&at(value)),
                upper_bound(&region(value)),
            )],
            Filter::Gte { value, .. } => {
                vec![ScanRange::half_open(at(value), upper_bound(&region(value)))]
            }
            Filter::Lt { value, .. } => vec![ScanRange::half_open(region(value), at(value))],
            Filter::Lte { value, .. } => {
                vec![ScanRange::half_open(region(value), upper_bound(&at(value)))]
            }
            Filter::Within { start, end, .. } => {
                vec![ScanRange::half_open(at(start), upper_bound(&at(end)))]
            }
            Filter::Without { start, end, .. } => vec![
                ScanRange::half_open(base.as_str(), at(start)),
                ScanRange::half_open(upper_bound(&at(end)), upper_bound(&base)),
            ],
            Filter::In { values, .. } => values
                .iter()
                .map(|value| keys::prefix_range(&at(value)))
                .collect(),
            Filter::Search { value, .. } => analyze(value)
                .iter()
                .map(|term| keys::prefix_range(&format!("{base}{}", encode_term(term))))
                .collect(),
            Filter::Match { .. } | Filter::And { .. } | Filter::Or { .. } => return None,
        };
        Some(IndexScan {
            index: index.to_string(),
            ranges: ranges.into_iter().filter(|r| !r.is_empty()).collect(),
        })
    }

    /// A compound equality index covering exactly the `eq` children.
    fn compound(&self, expressions: &[Filter]) -> Option<IndexScan> {
        let eqs: Vec<(&str, &Value)> = expressions
            .iter()
            .filter_map(|child| match child {
                Filter::Eq { field, value } => Some((field.as_str(), value)),
                _ => None,
            })
            .collect();
        let fields: BTreeSet<&str> = eqs.iter().map(|(field, _)| *field).collect();
        if eqs.len() < 2 || fields.len() != eqs.len() {
            return None;
        }
        let (name, spec) = self.schema.indexes.iter().find(|(_, spec)| {
            self.registry.family(spec) == Some(IndexFamily::Equality)
                && spec.fields.len() == fields.len()
                && spec.fields.iter().all(|f| fields.contains(f.as_str()))
        })?;
        let mut prefix = index_prefix(&self.schema.name, name);
        for field in &spec.fields {
            let (_, value) = eqs.iter().find(|(f, _)| *f == field.as_str())?;
            prefix.push_str(&encode_value(Some(value)));
        }
        Some(IndexScan {
            index: name.clone(),
            ranges: vec![keys::prefix_range(&prefix)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexSpec;

    fn schema() -> Schema {
        Schema::new("User")
            .with_index("name", IndexSpec::equality(["name"]))
            .with_index("age", IndexSpec::equality(["age"]))
            .with_index("email", IndexSpec::equality(["email"]).unique())
            .with_index("full", IndexSpec::equality(["last", "first"]))
            .with_index("bio", IndexSpec::inverted(["bio"]))
    }

    fn plan(filter: Filter) -> QueryPlan {
        let schema = schema();
        let registry = IndexerRegistry::with_builtins();
        Planner::new(&schema, &registry).plan(Some(&filter)).unwrap()
    }

    fn scans(plan: &QueryPlan) -> &[IndexScan] {
        match &plan.access {
            Access::Index(scans) => scans,
            Access::FullScan => panic!("expected index access"),
        }
    }

    #[test]
    fn eq_uses_exact_range() {
        let plan = plan(Filter::eq("name", "James"));
        let scans = scans(&plan);
        assert_eq!(scans[0].index, "name");
        assert_eq!(scans[0].ranges, vec![keys::prefix_range("%User/$i/name:sJames\u{0}")]);
    }

    #[test]
    fn range_operators_stay_in_type_region() {
        let plan = plan(Filter::gt("age", 30));
        let range = &scans(&plan)[0].ranges[0];
        let entry = |v: Value| keys::index_key("User", "age", &encode_value(Some(&v)), Some("1"));
        assert!(range.contains(&entry(json!(31))));
        assert!(!range.contains(&entry(json!(30))));
        assert!(!range.contains(&entry(json!("31"))));
        assert!(!range.contains(&entry(Value::Null)));
    }

    #[test]
    fn neq_and_without_use_two_ranges() {
        assert_eq!(scans(&plan(Filter::neq("age", 1)))[0].ranges.len(), 2);
        assert_eq!(scans(&plan(Filter::without("age", 1, 5)))[0].ranges.len(), 2);
    }

    #[test]
    fn unique_index_entries_fall_in_eq_range() {
        let plan = plan(Filter::eq("email", "a@x.com"));
        let key = keys::index_key("User", "email", &encode_value(Some(&json!("a@x.com"))), None);
        assert!(scans(&plan)[0].ranges[0].contains(&key));
    }

    #[test]
    fn search_uses_one_range_per_term() {
        let plan = plan(Filter::search("bio", "cats and dogs"));
        assert_eq!(scans(&plan)[0].ranges.len(), 3);
    }

    #[test]
    fn match_and_unindexed_fields_fall_back_to_full_scan() {
        assert!(plan(Filter::matches("name", "J")).is_full_scan());
        assert!(plan(Filter::eq("city", "Leeds")).is_full_scan());
        assert!(plan(Filter::search("name", "J")).is_full_scan());
    }

    #[test]
    fn and_prefers_compound_index() {
        let plan = plan(Filter::and(vec![
            Filter::eq("first", "James"),
            Filter::eq("last", "Gunn"),
        ]));
        let scans = scans(&plan);
        assert_eq!(scans[0].index, "full");
        assert_eq!(
            scans[0].ranges,
            vec![keys::prefix_range("%User/$i/full:sGunn\u{0}sJames\u{0}")]
        );
    }

    #[test]
    fn and_falls_back_to_first_indexed_child() {
        let plan = plan(Filter::and(vec![
            Filter::eq("city", "Leeds"),
            Filter::gt("age", 3),
        ]));
        assert_eq!(scans(&plan)[0].index, "age");
    }

    #[test]
    fn or_needs_every_child_indexed() {
        let indexed = plan(Filter::or(vec![
            Filter::eq("name", "A"),
            Filter::eq("age", 3),
        ]));
        assert_eq!(scans(&indexed).len(), 2);
        let mixed = plan(Filter::or(vec![
            Filter::eq("name", "A"),
            Filter::eq("city", "B"),
        ]));
        assert!(mixed.is_full_scan());
    }

    #[test]
    fn describe_names_the_access_path() {
        let described = plan(Filter::eq("name", "J")).describe();
        assert_eq!(described["table"], "User");
        assert_eq!(described["access"]["index"][0]["index"], "name");
        let full = plan(Filter::eq("city", "x")).describe();
        assert_eq!(full["access"], "full_scan");
    }
}
