//! Property-based test generators using proptest.
//!
//! Documents are drawn from small value pools so that generated filters
//! hit something often enough to be interesting. The indexed `User` fields
//! mix every scalar type, so plans cross type regions and null entries.

use docket_core::{Document, Filter, IndexSpec, Schema};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Names the document and filter strategies draw from.
pub const NAMES: [&str; 4] = ["ann", "bob", "cat", "dan"];

/// Words the `bio` strategy draws from.
pub const WORDS: [&str; 6] = ["dog", "dogs", "fish", "cat", "running", "runs"];

/// Ids of the `Group` documents a user's `groups` field refers to.
pub const GROUPS: [&str; 3] = ["g1", "g2", "g3"];

/// Strategy for generating valid document ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,6}").expect("Invalid regex")
}

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for a scalar JSON value of any indexable type.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::from),
        // Quarters survive a JSON round-trip exactly.
        (-4000i32..4000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

/// Strategy for the value of an indexed `User` field.
///
/// Nulls, booleans, integers, floats and strings share one small pool, so
/// one field holds several types across documents.
pub fn indexed_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        1 => any::<bool>().prop_map(Value::Bool),
        3 => (18i64..24).prop_map(Value::from),
        2 => (72i32..96).prop_map(|n| Value::from(f64::from(n) / 4.0)),
        3 => prop::sample::select(NAMES.to_vec()).prop_map(Value::from),
    ]
}

/// Strategy for a `User`-shaped document without `_id`.
///
/// `name` and `age` are sometimes missing; `email` is always present.
pub fn user_document_strategy() -> impl Strategy<Value = Document> {
    (
        prop::option::of(indexed_value_strategy()),
        prop::option::of(indexed_value_strategy()),
        "[a-z]{1,4}",
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 0..4),
        prop::collection::vec(prop::sample::select(GROUPS.to_vec()), 0..3),
        scalar_strategy(),
    )
        .prop_map(|(name, age, local, bio, groups, extra)| {
            let mut doc = Document::new();
            if let Some(name) = name {
                doc.insert("name".into(), name);
            }
            if let Some(age) = age {
                doc.insert("age".into(), age);
            }
            doc.insert("email".into(), json!(format!("{local}@example.com")));
            doc.insert("bio".into(), json!(bio.join(" ")));
            doc.insert("groups".into(), json!(groups));
            doc.insert("extra".into(), extra);
            doc
        })
}

/// Strategy for a leaf filter over the `User` fields.
///
/// `extra` is never indexed, so filters on it force a table scan.
pub fn leaf_filter_strategy() -> impl Strategy<Value = Filter> {
    let field = prop::sample::select(vec!["name", "age", "extra"]);
    let value = indexed_value_strategy;
    prop_oneof![
        (field.clone(), value()).prop_map(|(f, v)| Filter::eq(f, v)),
        (field.clone(), value()).prop_map(|(f, v)| Filter::neq(f, v)),
        (0u8..4, field.clone(), value()).prop_map(|(op, f, v)| match op {
            0 => Filter::gt(f, v),
            1 => Filter::gte(f, v),
            2 => Filter::lt(f, v),
            _ => Filter::lte(f, v),
        }),
        (field.clone(), value(), value()).prop_map(|(f, a, b)| Filter::within(f, a, b)),
        (field.clone(), value(), value()).prop_map(|(f, a, b)| Filter::without(f, a, b)),
        (field, prop::collection::vec(value(), 1..3)).prop_map(|(f, vs)| Filter::one_of(f, vs)),
        prop::sample::select(WORDS.to_vec()).prop_map(|w| Filter::search("bio", w)),
        Just(Filter::matches("name", "^[ab]")),
    ]
}

/// Strategy for an `and` of equalities on `name` and `age`, the fields of
/// the fixture's compound index.
pub fn compound_filter_strategy() -> impl Strategy<Value = Filter> {
    (indexed_value_strategy(), indexed_value_strategy())
        .prop_map(|(name, age)| Filter::and(vec![Filter::eq("age", age), Filter::eq("name", name)]))
}

/// Strategy for a filter tree up to `depth` levels of `and`/`or`.
pub fn filter_strategy(depth: u32) -> impl Strategy<Value = Filter> {
    prop_oneof![
        4 => leaf_filter_strategy(),
        1 => compound_filter_strategy(),
    ]
    .prop_recursive(depth, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Filter::and),
            prop::collection::vec(inner, 1..4).prop_map(Filter::or),
        ]
    })
}

fn index_slot(
    name: &'static str,
    specs: Vec<IndexSpec>,
) -> impl Strategy<Value = Option<(String, IndexSpec)>> {
    prop::option::of(prop::sample::select(specs))
        .prop_map(move |spec| spec.map(|spec| (name.to_string(), spec)))
}

/// Strategy for a `User` schema over the fields of
/// [`user_document_strategy`].
///
/// Each index name is absent or holds one of two specs of different
/// shape or kind, so two draws add, drop and change indexes. `email` is
/// unique in every draw, so all schemas accept the same writes.
pub fn user_schema_strategy() -> impl Strategy<Value = Schema> {
    (
        index_slot("name", vec![IndexSpec::equality(["name"]), IndexSpec::inverted(["name"])]),
        index_slot(
            "age",
            vec![IndexSpec::equality(["age"]), IndexSpec::equality(["name", "age"])],
        ),
        index_slot("bio", vec![IndexSpec::inverted(["bio"]), IndexSpec::equality(["bio"])]),
        index_slot(
            "groups",
            vec![IndexSpec::link(["groups"]).linked_to("Group"), IndexSpec::equality(["groups"])],
        ),
    )
        .prop_map(|(name, age, bio, groups)| {
            [name, age, bio, groups].into_iter().flatten().fold(
                Schema::new("User").with_index("email", IndexSpec::equality(["email"]).unique()),
                |schema, (name, spec)| schema.with_index(name, spec),
            )
        })
}

/// Strategy for the source and target schemas of a migration.
pub fn schema_pair_strategy() -> impl Strategy<Value = (Schema, Schema)> {
    (user_schema_strategy(), user_schema_strategy())
}

/// A document-level operation.
#[derive(Debug, Clone)]
pub enum DocumentOperation {
    /// Put a document under `id`
    Put {
        /// Document id
        id: String,
        /// Document body
        doc: Document,
    },
    /// Delete a document
    Delete {
        /// Document id
        id: String,
    },
}

/// Strategy for document operations over a small id space.
pub fn document_operation_strategy() -> impl Strategy<Value = DocumentOperation> {
    let id = prop::sample::select(vec!["1", "2", "3", "4", "5"]).prop_map(String::from);
    prop_oneof![
        3 => (id.clone(), user_document_strategy())
            .prop_map(|(id, doc)| DocumentOperation::Put { id, doc }),
        1 => id.prop_map(|id| DocumentOperation::Delete { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocumentOperation>> {
    prop::collection::vec(document_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
