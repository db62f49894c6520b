//! Property tests: document round-trips, tombstones, uniqueness, migration
//! convergence and agreement between indexed and scanned queries.

use docket_core::keys::{index_prefix, prefix_range, table_prefix};
use docket_core::query::Predicate;
use docket_core::{CoreError, Database, Document, Schema};
use docket_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Applies `ops` to `db`, returning the live documents by id.
///
/// Writes rejected for a duplicate email are skipped; any other failure
/// fails the test.
fn apply(db: &Database, ops: &[DocumentOperation]) -> (BTreeMap<String, Document>, Vec<DocumentOperation>) {
    let mut live = BTreeMap::new();
    let mut accepted = Vec::new();
    for op in ops {
        match op {
            DocumentOperation::Put { id, doc } => {
                let mut doc = doc.clone();
                doc.insert("_id".into(), json!(id));
                match db.put("User", doc.clone()) {
                    Ok(_) => {
                        live.insert(id.clone(), doc);
                        accepted.push(op.clone());
                    }
                    Err(CoreError::DuplicateKey { .. }) => {}
                    Err(e) => panic!("put failed: {e}"),
                }
            }
            DocumentOperation::Delete { id } => match db.del("User", id) {
                Ok(()) => {
                    live.remove(id);
                    accepted.push(op.clone());
                }
                Err(e) if e.is_absent() => assert!(!live.contains_key(id)),
                Err(e) => panic!("del failed: {e}"),
            },
        }
    }
    (live, accepted)
}

fn without_version(mut doc: Document) -> Document {
    doc.remove("_v");
    doc
}

fn index_entries(db: &Database, schema: &Schema) -> Vec<(String, Vec<u8>)> {
    schema
        .indexes
        .keys()
        .flat_map(|name| {
            db.store()
                .scan(&prefix_range(&index_prefix(&schema.name, name)))
                .unwrap()
                .map(Result::unwrap)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Every index entry of `User` and every link permutation key.
fn derived_entries(db: &Database) -> Vec<(String, Vec<u8>)> {
    let indexes = prefix_range(&format!("{}$i/", table_prefix("User")));
    [indexes, prefix_range("@")]
        .iter()
        .flat_map(|range| {
            db.store()
                .scan(range)
                .unwrap()
                .map(Result::unwrap)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn ids(docs: &[Document]) -> BTreeSet<String> {
    docs.iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn latest_reads_match_last_write(ops in operation_sequence_strategy(1, 30)) {
        let db = TestDatabase::memory();
        db.migrate(scenarios::user_schema()).unwrap();
        let (live, _) = apply(&db, &ops);

        for id in ["1", "2", "3", "4", "5"] {
            let stored = db.get("User", id).unwrap().map(without_version);
            prop_assert_eq!(stored, live.get(id).cloned());
        }
    }

    #[test]
    fn tombstones_hide_documents_but_keep_history(ops in operation_sequence_strategy(1, 30)) {
        let db = TestDatabase::memory();
        db.migrate(scenarios::user_schema()).unwrap();
        let (live, accepted) = apply(&db, &ops);

        let everything = db.query(&docket_core::Query::new("User")).unwrap().into_documents();
        prop_assert_eq!(ids(&everything), live.keys().cloned().collect::<BTreeSet<_>>());

        for id in ["1", "2", "3", "4", "5"] {
            let writes = accepted
                .iter()
                .filter(|op| match op {
                    DocumentOperation::Put { id: i, .. } | DocumentOperation::Delete { id: i } => i == id,
                })
                .count();
            let history = db.history("User", id).unwrap();
            prop_assert_eq!(history.len(), writes);
            if let Some(last) = history.last() {
                prop_assert_eq!(last.document.is_some(), live.contains_key(id));
            }
            let versions: Vec<&str> = history.iter().map(|v| v.version.as_str()).collect();
            prop_assert!(versions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn unique_values_have_one_live_owner(ops in operation_sequence_strategy(1, 30)) {
        let db = TestDatabase::memory();
        db.migrate(scenarios::user_schema()).unwrap();
        let (live, _) = apply(&db, &ops);

        let emails: Vec<&Value> = live.values().map(|d| &d["email"]).collect();
        let distinct: BTreeSet<String> = emails.iter().map(|e| e.to_string()).collect();
        prop_assert_eq!(distinct.len(), emails.len());

        for doc in live.values() {
            let found = db
                .find("User", docket_core::Filter::eq("email", doc["email"].clone()))
                .unwrap();
            prop_assert_eq!(found.len(), 1);
        }
    }

    #[test]
    fn migration_converges_with_upfront_schema(ops in operation_sequence_strategy(1, 30)) {
        let upfront = TestDatabase::memory();
        upfront.migrate(scenarios::user_schema()).unwrap();
        let (_, accepted) = apply(&upfront, &ops);

        let later = TestDatabase::memory();
        later.migrate(Schema::new("User")).unwrap();
        apply(&later, &accepted);
        later.migrate(scenarios::user_schema()).unwrap();

        let schema = scenarios::user_schema();
        prop_assert_eq!(index_entries(&upfront, &schema), index_entries(&later, &schema));
    }

    #[test]
    fn migration_between_schemas_matches_direct_writes(
        (from, to) in schema_pair_strategy(),
        ops in operation_sequence_strategy(1, 30),
    ) {
        let direct = TestDatabase::memory();
        direct.migrate(to.clone()).unwrap();
        let (_, accepted) = apply(&direct, &ops);

        let migrated = TestDatabase::memory();
        migrated.migrate(from.clone()).unwrap();
        apply(&migrated, &accepted);
        migrated.migrate(to.clone()).unwrap();

        prop_assert_eq!(derived_entries(&direct), derived_entries(&migrated));
        for name in from.indexes.keys().filter(|name| !to.indexes.contains_key(*name)) {
            let left = migrated
                .store()
                .scan(&prefix_range(&index_prefix("User", name)))
                .unwrap()
                .count();
            prop_assert_eq!(left, 0, "dropped index {} kept entries", name);
        }
    }

    #[test]
    fn indexed_queries_agree_with_scans(
        ops in operation_sequence_strategy(1, 30),
        filter in filter_strategy(2),
    ) {
        let db = TestDatabase::memory();
        db.migrate(scenarios::user_schema()).unwrap();
        let (live, _) = apply(&db, &ops);

        let predicate = Predicate::compile(&filter).unwrap();
        let expected: BTreeSet<String> = live
            .iter()
            .filter(|(_, doc)| predicate.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();

        let found = db.find("User", filter).unwrap();
        prop_assert_eq!(found.len(), expected.len());
        prop_assert_eq!(ids(&found), expected);
    }
}
