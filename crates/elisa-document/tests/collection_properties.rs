//! Collection Property Tests
//!
//! End-to-end checks of the collection contract: round-trips, per-document
//! update atomicity, access-path independence of query results, sort
//! stability, and pagination consistency.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use elisa_document::{
    Collection, CollectionError, Database, Document, DocumentId, DriverRegistry, FieldSchema,
    Filter, IndexType, Predicate, Query, Schema, SortOrder, Update, Value,
};
use elisa_common::{DatabaseConfig, ErrorKind};
use elisa_storage::MemoryStore;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

// =============================================================================
// Helpers
// =============================================================================

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn sample_documents(count: usize) -> Vec<Document> {
    let tags = ["red", "green", "blue"];
    let mut rng = Lcg(42);
    (0..count)
        .map(|i| {
            let mut doc = Document::with_id(format!("doc-{:03}", i));
            // Leave some documents without fields or with odd types.
            match rng.below(10) {
                0 => {}
                1 => doc.set("n", Value::from("not a number")),
                2 => doc.set("n", Value::Float(rng.below(20) as f64 + 0.5)),
                _ => doc.set("n", Value::Int(rng.below(20) as i64)),
            }
            if rng.below(4) != 0 {
                doc.set("tag", tags[rng.below(3) as usize]);
            }
            doc
        })
        .collect()
}

fn filled(docs: &[Document], indexed: bool) -> Collection {
    let collection = Collection::new("items", Arc::new(MemoryStore::new()));
    if indexed {
        collection.create_index("n", IndexType::BTree).unwrap();
        collection.create_index("tag", IndexType::Hash).unwrap();
    }
    collection.insert_many(docs.to_vec()).unwrap();
    collection
}

fn id_set(docs: &[Document]) -> BTreeSet<String> {
    docs.iter().filter_map(|d| d.id.clone()).map(|id| id.0).collect()
}

fn id_list(docs: &[Document]) -> Vec<String> {
    docs.iter().filter_map(|d| d.id.clone()).map(|id| id.0).collect()
}

fn sample_filters() -> Vec<Filter> {
    vec![
        Filter::eq("n", 5i64),
        Filter::eq("tag", "red"),
        Filter::gt("n", 10i64),
        Filter::and(vec![Filter::gte("n", 3i64), Filter::lt("n", 8.5f64)]),
        Filter::and(vec![Filter::eq("tag", "blue"), Filter::lte("n", 12i64)]),
        Filter::in_values("tag", vec![Value::from("red"), Value::from("green")]),
        Filter::or(vec![Filter::eq("tag", "green"), Filter::lt("n", 2i64)]),
        Filter::not(Filter::eq("tag", "red")),
        Filter::ne("n", 4i64),
        Filter::nin_values("tag", vec![Value::from("blue")]),
        Filter::exists("n", false),
        Filter::gt("n", "a"),
    ]
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_round_trip_preserves_user_fields() {
    let collection = Collection::new("people", Arc::new(MemoryStore::new()));
    let original = Document::from_json(json!({
        "name": "Ada",
        "age": 36,
        "score": 9.5,
        "active": true,
        "nothing": null,
        "tags": ["math", "engines"],
        "address": {"city": "London", "geo": {"lat": 51.5}}
    }))
    .unwrap();

    let stored = collection.insert(original.clone()).unwrap();
    let fetched = collection.get(stored.id().unwrap()).unwrap().unwrap();

    assert_eq!(fetched.fields, original.fields);
    assert_eq!(fetched.id, stored.id);
    assert!(fetched.created_at.is_some());
}

#[test]
fn test_concurrent_updates_are_atomic() {
    let collection = Collection::new("counters", Arc::new(MemoryStore::new()));
    let id = DocumentId::new("pair");

    for round in 0..25i64 {
        collection.remove(&id).unwrap();
        collection
            .insert(Document::with_id("pair").with("a", 0i64).with("b", 0i64))
            .unwrap();

        let handles: Vec<_> = [1i64, 2]
            .into_iter()
            .map(|writer| {
                let collection = collection.clone();
                let id = id.clone();
                let value = round * 10 + writer;
                thread::spawn(move || {
                    collection
                        .update(&id, Update::patch().set("a", value).set("b", value))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let doc = collection.get(&id).unwrap().unwrap();
        let a = doc.get("a").and_then(Value::as_i64).unwrap();
        let b = doc.get("b").and_then(Value::as_i64).unwrap();
        assert_eq!(a, b);
        assert!(a == round * 10 + 1 || a == round * 10 + 2);
    }
}

#[test]
fn test_concurrent_patches_all_land() {
    let collection = Collection::new("flags", Arc::new(MemoryStore::new()));
    let id = DocumentId::new("flags");
    collection
        .insert(Document::with_id("flags").with("n", 0i64))
        .unwrap();

    // Each writer sets its own fields; a lost update would drop some.
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let collection = collection.clone();
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let field = format!("w{}_{}", t, i);
                    collection
                        .update(&id, Update::patch().set(field, true))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let doc = collection.get(&id).unwrap().unwrap();
    assert_eq!(doc.len(), 1 + 4 * 25);
}

#[test]
fn test_results_do_not_depend_on_access_path() {
    let docs = sample_documents(120);
    let plain = filled(&docs, false);
    let indexed = filled(&docs, true);

    for filter in sample_filters() {
        let predicate = Predicate::compile(&filter).unwrap();
        let expected: BTreeSet<String> = docs
            .iter()
            .filter(|d| predicate.matches(d))
            .filter_map(|d| d.id.clone())
            .map(|id| id.0)
            .collect();

        let query = Query::new().with_filter(filter.clone());
        let scanned = plain.find(query.clone()).to_vec().unwrap();
        let via_index = indexed.find(query).to_vec().unwrap();

        assert_eq!(id_set(&scanned), expected, "scan: {:?}", filter);
        assert_eq!(id_set(&via_index), expected, "index: {:?}", filter);
        assert_eq!(id_list(&scanned), id_list(&via_index), "order: {:?}", filter);
    }
}

#[test]
fn test_numeric_limits_do_not_depend_on_access_path() {
    let limits = [
        Value::Int(i64::MAX),
        Value::Float(i64::MAX as f64),
        Value::Int(i64::MAX - 1),
        Value::Int(i64::MIN),
        Value::Float(i64::MIN as f64),
        Value::Float(-0.0),
        Value::Int(0),
        Value::Float(1e300),
    ];
    let docs: Vec<Document> = limits
        .iter()
        .enumerate()
        .map(|(i, v)| Document::with_id(format!("lim-{}", i)).with("n", v.clone()))
        .collect();

    let plain = Collection::new("plain", Arc::new(MemoryStore::new()));
    plain.insert_many(docs.clone()).unwrap();
    let hashed = Collection::new("hashed", Arc::new(MemoryStore::new()));
    hashed.create_index("n", IndexType::Hash).unwrap();
    hashed.insert_many(docs.clone()).unwrap();
    let ordered = Collection::new("ordered", Arc::new(MemoryStore::new()));
    ordered.insert_many(docs.clone()).unwrap();
    ordered.create_index("n", IndexType::BTree).unwrap();

    let mut filters = Vec::new();
    for value in &limits {
        filters.push(Filter::eq("n", value.clone()));
        filters.push(Filter::gte("n", value.clone()));
        filters.push(Filter::lt("n", value.clone()));
    }
    filters.push(Filter::in_values("n", limits.to_vec()));

    for filter in filters {
        let predicate = Predicate::compile(&filter).unwrap();
        let expected: Vec<String> = docs
            .iter()
            .filter(|d| predicate.matches(d))
            .filter_map(|d| d.id.clone())
            .map(|id| id.0)
            .collect();

        let query = Query::new().with_filter(filter.clone());
        for collection in [&plain, &hashed, &ordered] {
            let found = collection.find(query.clone()).to_vec().unwrap();
            assert_eq!(id_list(&found), expected, "{}: {:?}", collection.name(), filter);
        }
    }
}

#[test]
fn test_sorted_results_do_not_depend_on_access_path() {
    let docs = sample_documents(80);
    let plain = filled(&docs, false);
    let indexed = filled(&docs, true);

    for order in [SortOrder::Asc, SortOrder::Desc] {
        let query = Query::new()
            .with_filter(Filter::gte("n", 4i64))
            .with_sort("n", order);
        assert!(!indexed.find(query.clone()).compile().unwrap().needs_sort());

        let scanned = plain.find(query.clone()).to_vec().unwrap();
        let via_index = indexed.find(query).to_vec().unwrap();
        assert_eq!(id_list(&scanned), id_list(&via_index));
    }
}

#[test]
fn test_sort_ties_break_by_identifier() {
    let collection = Collection::new("ties", Arc::new(MemoryStore::new()));
    for id in ["e", "b", "d", "a", "c"] {
        collection
            .insert(Document::with_id(id).with("group", 1i64))
            .unwrap();
    }
    collection
        .insert(Document::with_id("z").with("group", 0i64))
        .unwrap();

    let query = Query::new().with_sort("group", SortOrder::Desc);
    let first = id_list(&collection.find(query.clone()).to_vec().unwrap());
    assert_eq!(first, vec!["a", "b", "c", "d", "e", "z"]);

    for _ in 0..5 {
        assert_eq!(id_list(&collection.find(query.clone()).to_vec().unwrap()), first);
    }
}

#[test]
fn test_pagination_matches_slicing() {
    let docs = sample_documents(60);
    let collection = filled(&docs, true);
    let base = Query::new()
        .with_filter(Filter::exists("n", true))
        .with_sort("tag", SortOrder::Asc)
        .with_sort("n", SortOrder::Desc);
    let full = id_list(&collection.find(base.clone()).to_vec().unwrap());

    for skip in [0usize, 1, 7, 30, 59, 100] {
        for limit in [0usize, 1, 5, 20] {
            let page = collection
                .find(base.clone().with_skip(skip).with_limit(limit))
                .to_vec()
                .unwrap();
            let expected: Vec<String> = full.iter().skip(skip).take(limit).cloned().collect();
            assert_eq!(id_list(&page), expected, "skip {} limit {}", skip, limit);
        }
    }
}

#[test]
fn test_projection_does_not_affect_filtering() {
    let collection = Collection::new("p", Arc::new(MemoryStore::new()));
    collection
        .insert(Document::with_id("a").with("n", 1i64).with("secret", "s"))
        .unwrap();

    let query = collection
        .find(Query::new())
        .filter(Filter::eq("secret", "s"))
        .sort("secret", SortOrder::Asc)
        .project(elisa_document::Projection::Include(vec!["n".into()]));
    let docs = query.to_vec().unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].contains("secret"));
    assert_eq!(docs[0].id(), Some(&DocumentId::new("a")));
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_schema_scenario() {
    let db = Database::open(DatabaseConfig::memory("app"), &DriverRegistry::with_defaults()).unwrap();
    let schema = Schema::new("people")
        .field("name", FieldSchema::string())
        .field("age", FieldSchema::number().min(0.0))
        .require("name")
        .require("age");
    let people = db.collection_with_schema("people", schema).unwrap();

    let err = people
        .insert(Document::from_json(json!({"name": "a", "age": -1})).unwrap())
        .unwrap_err();
    assert!(matches!(err, CollectionError::Validation(_)));
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let stored = people
        .insert(Document::from_json(json!({"name": "a", "age": 5})).unwrap())
        .unwrap();
    assert!(stored.id().is_some());
    assert_eq!(people.len().unwrap(), 1);
}

#[test]
fn test_filter_scenario() {
    let db = Database::open(DatabaseConfig::memory("app"), &DriverRegistry::with_defaults()).unwrap();
    let items = db.collection("items").unwrap();
    items.insert(Document::new().with("x", 1i64)).unwrap();
    items.insert(Document::new().with("x", 2i64)).unwrap();

    let found = items
        .find(Query::new().with_filter(Filter::gt("x", 1i64)))
        .to_vec()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("x"), Some(&Value::Int(2)));
}

#[test]
fn test_closed_store_scenario() {
    let store = Arc::new(MemoryStore::new());
    let items = Collection::new("items", store.clone());
    items.insert(Document::with_id("a")).unwrap();

    elisa_storage::Store::close(store.as_ref()).unwrap();
    let err = items.get(&"a".into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreClosed);

    let err = items.find(Query::new()).execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreClosed);
}
