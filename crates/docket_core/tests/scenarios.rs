//! End-to-end scenarios over the public database API.

use docket_core::graph::ANY;
use docket_core::{
    Binding, Config, CoreError, Database, EntityRef, Filter, GraphQuery, IndexSpec, Order,
    PatternNode, Projection, Query, QueryResult, Schema,
};
use docket_testkit::prelude::*;
use serde_json::json;

fn names(docs: &[docket_core::Document]) -> Vec<&str> {
    docs.iter().filter_map(|d| d["name"].as_str()).collect()
}

#[test]
fn unique_email_rejects_second_writer() {
    let db = TestDatabase::memory();
    db.migrate(
        Schema::new("User")
            .with_index("name", IndexSpec::equality(["name"]))
            .with_index("email", IndexSpec::equality(["email"]).unique()),
    )
    .unwrap();

    db.put("User", doc(json!({ "name": "J", "email": "a@x.com" })))
        .unwrap();
    let err = db
        .put("User", doc(json!({ "name": "K", "email": "a@x.com" })))
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { .. }));

    let found = db.find("User", Filter::eq("name", "J")).unwrap();
    assert_eq!(names(&found), vec!["J"]);
    assert!(db.find("User", Filter::eq("name", "K")).unwrap().is_empty());
}

#[test]
fn rewriting_own_unique_value_is_allowed() {
    let db = TestDatabase::memory();
    db.migrate(scenarios::user_schema()).unwrap();
    let id = db
        .put("User", doc(json!({ "name": "J", "email": "a@x.com" })))
        .unwrap();
    db.put("User", doc(json!({ "_id": &id, "name": "J2", "email": "a@x.com" })))
        .unwrap();

    // The stale name entry is gone, the new one is in place.
    assert!(db.find("User", Filter::eq("name", "J")).unwrap().is_empty());
    assert_eq!(db.find("User", Filter::eq("name", "J2")).unwrap().len(), 1);
    assert_eq!(db.history("User", &id).unwrap().len(), 2);
}

#[test]
fn deleting_frees_the_unique_value() {
    let db = TestDatabase::memory();
    db.migrate(scenarios::user_schema()).unwrap();
    let id = db.put("User", doc(json!({ "email": "a@x.com" }))).unwrap();
    db.del("User", &id).unwrap();
    db.put("User", doc(json!({ "email": "a@x.com" }))).unwrap();

    let history = db.history("User", &id).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].document.is_none());
    assert!(db.del("User", &id).unwrap_err().is_absent());
}

#[test]
fn search_finds_words_of_the_bio() {
    let db = TestDatabase::memory();
    db.migrate(scenarios::user_schema()).unwrap();
    db.put("User", doc(json!({ "email": "a@x.com", "bio": "cat dog" })))
        .unwrap();
    assert_eq!(db.find("User", Filter::search("bio", "dog")).unwrap().len(), 1);
    assert!(db.find("User", Filter::search("bio", "fish")).unwrap().is_empty());
}

#[test]
fn full_text_search_stems_terms() {
    let db = TestDatabase::memory();
    db.migrate(Schema::new("Pet").with_index("bio", IndexSpec::inverted(["bio"])))
        .unwrap();
    db.put("Pet", doc(json!({ "name": "a", "bio": "Dogs running" })))
        .unwrap();
    db.put("Pet", doc(json!({ "name": "b", "bio": "fish, and a dog" })))
        .unwrap();
    db.put("Pet", doc(json!({ "name": "c", "bio": "just fish" })))
        .unwrap();

    let order = |filter| {
        Query::new("Pet")
            .filter(filter)
            .order(Order::asc("name"))
    };
    let dogs = db.query(&order(Filter::search("bio", "dog"))).unwrap().into_documents();
    assert_eq!(names(&dogs), vec!["a", "b"]);

    let both = db
        .query(&order(Filter::search("bio", "dog fish")))
        .unwrap()
        .into_documents();
    assert_eq!(names(&both), vec!["b"]);

    let plan = db.explain("Pet", Some(&Filter::search("bio", "runs"))).unwrap();
    assert!(!plan.is_full_scan());
    let runs = db.find("Pet", Filter::search("bio", "runs")).unwrap();
    assert_eq!(names(&runs), vec!["a"]);
}

#[test]
fn graph_links_from_documents() {
    let db = TestDatabase::memory();
    db.migrate(Schema::new("Person")).unwrap();
    db.put("Person", doc(json!({ "_id": "2", "name": "Bo" })))
        .unwrap();
    db.put(
        "Person",
        doc(json!({
            "_id": "1",
            "name": "Al",
            "_links": { "put": [["likes", "Person:2", { "since": 2020 }]] }
        })),
    )
    .unwrap();

    // `_links` is not stored on the document.
    assert!(!db.get_required("Person", "1").unwrap().contains_key("_links"));

    let query = GraphQuery::new(
        vec![
            PatternNode::new("a", "Person").with_filter(Filter::eq("name", "Al")),
            PatternNode::new("e", "likes"),
            PatternNode::any("b"),
        ],
        vec!["b".into(), "e".into()],
    );
    let result = db.query_graph(&query).unwrap();
    assert_eq!(result["b"].len(), 1);
    match &result["b"][0] {
        Binding::Entity { reference, document } => {
            assert_eq!(reference, &EntityRef::new("Person", "2"));
            assert_eq!(document.as_ref().unwrap()["name"], json!("Bo"));
        }
        other => panic!("unexpected {other:?}"),
    }
    match &result["e"][0] {
        Binding::Edge { link } => assert_eq!(link.data["since"], json!(2020)),
        other => panic!("unexpected {other:?}"),
    }

    // Removing the edge through `_links.del`.
    db.put(
        "Person",
        doc(json!({
            "_id": "1",
            "name": "Al",
            "_links": { "del": [["likes", "Person:2"]] }
        })),
    )
    .unwrap();
    assert!(db.query_graph(&query).unwrap()["b"].is_empty());
}

#[test]
fn deleting_a_document_removes_its_edges() {
    let db = TestDatabase::memory();
    db.migrate(scenarios::person_schema()).unwrap();
    db.put("Person", doc(json!({ "_id": "2" }))).unwrap();
    db.put("Person", doc(json!({ "_id": "3" }))).unwrap();
    db.put("Person", doc(json!({ "_id": "1", "friends": ["2", "3"] })))
        .unwrap();

    let query = GraphQuery::new(
        vec![
            PatternNode::new("a", "Person"),
            PatternNode::new("e", "friends"),
            PatternNode::new("b", ANY),
        ],
        vec!["b".into()],
    );
    assert_eq!(db.query_graph(&query).unwrap()["b"].len(), 2);

    // Deleting an object removes edges pointing at it.
    db.del("Person", "3").unwrap();
    assert_eq!(db.query_graph(&query).unwrap()["b"].len(), 1);

    // Dropping a friend from the field removes that edge on rewrite.
    db.put("Person", doc(json!({ "_id": "1", "friends": [] })))
        .unwrap();
    assert!(db.query_graph(&query).unwrap()["b"].is_empty());
}

#[test]
fn migration_backfills_and_drops() {
    let db = scenarios::populated_database(10);
    let report = db
        .migrate(
            Schema::new("User")
                .with_index("email", IndexSpec::equality(["email"]).unique())
                .with_index("by_name_age", IndexSpec::equality(["name", "age"])),
        )
        .unwrap();
    assert_eq!(report.dropped, vec!["age", "bio", "name", "name_age"]);
    assert_eq!(report.created, vec!["by_name_age"]);
    assert_eq!(report.written_entries, 10);

    let filter = Filter::and(vec![Filter::eq("name", "user3"), Filter::eq("age", 23)]);
    let plan = db.explain("User", Some(&filter)).unwrap();
    assert!(!plan.is_full_scan());
    assert_eq!(db.find("User", filter).unwrap().len(), 1);

    assert_eq!(db.schema_history("User").unwrap().len(), 2);
}

#[test]
fn failed_migration_keeps_previous_schema() {
    let db = TestDatabase::memory();
    db.migrate(Schema::new("User")).unwrap();
    db.put("User", doc(json!({ "email": "a@x.com" }))).unwrap();
    db.put("User", doc(json!({ "email": "a@x.com" }))).unwrap();

    let err = db
        .migrate(Schema::new("User").with_index("email", IndexSpec::equality(["email"]).unique()))
        .unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { .. }));
    assert!(db.schema("User").unwrap().indexes.is_empty());
    assert_eq!(db.schema_history("User").unwrap().len(), 1);
}

#[test]
fn unknown_index_type_is_rejected() {
    let db = TestDatabase::memory();
    let err = db
        .migrate(Schema::new("User").with_index("geo", IndexSpec::new("geohash", ["loc"])))
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownIndexType { .. }));
    assert!(db.tables().is_empty());
}

#[test]
fn ordering_offset_limit_and_count() {
    let db = scenarios::populated_database(10);
    let query = Query::new("User")
        .filter(Filter::gte("age", 22))
        .order(Order::desc("name"))
        .offset(1)
        .limit(3);
    let docs = db.query(&query).unwrap().into_documents();
    // Ages 22..=24 belong to users 2,3,4,7,8,9.
    assert_eq!(names(&docs), vec!["user8", "user7", "user4"]);

    let count = db.query(&query.clone().count()).unwrap();
    assert_eq!(count, QueryResult::Count(6));
}

#[test]
fn distinct_keeps_first_document_per_value() {
    let db = scenarios::populated_database(10);

    let query = Query::new("User").distinct("age").order(Order::asc("age"));
    let docs = db.query(&query).unwrap().into_documents();
    assert_eq!(names(&docs), vec!["user0", "user1", "user2", "user3", "user4"]);

    let paged = db
        .query(&query.clone().offset(1).limit(2))
        .unwrap()
        .into_documents();
    assert_eq!(names(&paged), vec!["user1", "user2"]);

    let counted = Query::new("User")
        .filter(Filter::gte("age", 22))
        .distinct("age")
        .count();
    assert_eq!(db.query(&counted).unwrap(), QueryResult::Count(3));
}

#[test]
fn projections_join_linked_documents() {
    let db = TestDatabase::memory();
    db.migrate(scenarios::user_schema()).unwrap();
    db.migrate(
        Schema::new("Comment")
            .with_index("approved", IndexSpec::equality(["approved"]))
            .with_index("by", IndexSpec::link(["by"]).linked_to("User")),
    )
    .unwrap();
    db.migrate(
        Schema::new("Post")
            .with_index("title", IndexSpec::equality(["title"]))
            .with_index("comments", IndexSpec::link(["comments"]).linked_to("Comment")),
    )
    .unwrap();

    db.put("User", doc(json!({ "_id": "1", "name": "Ann", "email": "ann@x.com" })))
        .unwrap();
    db.put("User", doc(json!({ "_id": "2", "name": "Bo", "email": "bo@x.com" })))
        .unwrap();
    for (id, by, approved) in [("c1", "1", true), ("c2", "2", false), ("c3", "1", true)] {
        db.put("Comment", doc(json!({ "_id": id, "by": by, "approved": approved })))
            .unwrap();
    }
    db.put(
        "Post",
        doc(json!({ "_id": "p1", "title": "Hello", "comments": ["c1", "c2", "c3", "gone"] })),
    )
    .unwrap();
    db.put("Post", doc(json!({ "_id": "p2", "title": "Quiet", "comments": [] })))
        .unwrap();

    let approved = Query::new("Comment")
        .filter(Filter::eq("approved", true))
        .project(Projection::new("author", "by", Query::new("User")));
    let query = Query::new("Post")
        .order(Order::asc("title"))
        .project(Projection::new("comments", "comments", Query::new("Comment").count()))
        .project(Projection::new("approved", "comments", approved));
    let posts = db.query(&query).unwrap().into_documents();

    assert_eq!(posts.len(), 2);
    let comments = posts[0]["approved"].as_array().unwrap();
    let ids: Vec<_> = comments.iter().map(|c| c["_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["c1", "c3"]);
    assert_eq!(comments[0]["author"][0]["name"], json!("Ann"));
    assert_eq!(posts[0]["comments"], json!(3));
    assert_eq!(posts[1]["approved"], json!([]));
    assert_eq!(posts[1]["comments"], json!(0));

    let through_equality = Query::new("Post").project(Projection::new(
        "x",
        "title",
        Query::new("Comment"),
    ));
    assert!(matches!(
        db.query(&through_equality),
        Err(CoreError::InvalidQuery { .. })
    ));
}

#[test]
fn forbidden_full_scan_is_an_error() {
    let db = TestDatabase::memory_with(Config::default().forbid_full_scans(true));
    db.migrate(scenarios::user_schema()).unwrap();
    db.put("User", doc(json!({ "email": "a@x.com", "name": "J" })))
        .unwrap();

    assert_eq!(db.find("User", Filter::eq("name", "J")).unwrap().len(), 1);
    let err = db.find("User", Filter::matches("name", "^J")).unwrap_err();
    assert!(matches!(err, CoreError::FullScanForbidden { .. }));
}

#[test]
fn or_needs_every_branch_indexed() {
    let db = scenarios::populated_database(5);
    let indexed = Filter::or(vec![Filter::eq("name", "user1"), Filter::eq("age", 24)]);
    let mixed = Filter::or(vec![Filter::eq("name", "user1"), Filter::eq("nickname", "x")]);
    assert!(!db.explain("User", Some(&indexed)).unwrap().is_full_scan());
    assert!(db.explain("User", Some(&mixed)).unwrap().is_full_scan());
    assert_eq!(db.find("User", indexed).unwrap().len(), 2);
    assert_eq!(db.find("User", mixed).unwrap().len(), 1);
}

#[test]
fn durable_database_survives_reopen() {
    let test_db = TestDatabase::file();
    test_db.migrate(scenarios::user_schema()).unwrap();
    let id = test_db
        .put("User", doc(json!({ "name": "J", "email": "a@x.com", "bio": "fish" })))
        .unwrap();
    test_db
        .put("User", doc(json!({ "_id": &id, "name": "J", "email": "b@x.com", "bio": "fish" })))
        .unwrap();

    let test_db = test_db.reopen();
    assert_eq!(test_db.tables(), vec!["User"]);
    assert_eq!(test_db.get_required("User", &id).unwrap()["email"], json!("b@x.com"));
    assert_eq!(test_db.history("User", &id).unwrap().len(), 2);
    assert_eq!(test_db.find("User", Filter::search("bio", "fish")).unwrap().len(), 1);

    // Versions keep increasing after replay.
    let before = test_db.get_required("User", &id).unwrap()["_v"].clone();
    test_db
        .put("User", doc(json!({ "_id": &id, "email": "b@x.com" })))
        .unwrap();
    let after = test_db.get_required("User", &id).unwrap()["_v"].clone();
    assert!(after.as_str().unwrap() > before.as_str().unwrap());

    // The unique entry for the old email was removed by the rewrite.
    test_db
        .put("User", doc(json!({ "email": "a@x.com" })))
        .unwrap();
}

#[test]
fn database_is_shareable_across_threads() {
    use std::sync::Arc;

    let db = Arc::new(Database::open_in_memory().unwrap());
    db.migrate(scenarios::user_schema()).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for i in 0..25 {
                    db.put(
                        "User",
                        doc(json!({ "email": format!("{t}-{i}@x.com"), "age": t })),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let total = db.query(&Query::new("User").count()).unwrap();
    assert_eq!(total, QueryResult::Count(100));
    assert_eq!(db.find("User", Filter::eq("age", 2)).unwrap().len(), 25);
}
