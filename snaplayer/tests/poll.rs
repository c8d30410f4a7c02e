use bson::doc;

use snaplayer::{
    memory::{InMemorySnapshotStore, in_memory_engine},
    prelude::*,
};

const COLLECTION: &str = "testcollection";

#[tokio::test]
async fn poll_tracks_a_document_through_its_lifecycle() {
    let store = InMemorySnapshotStore::new();
    let engine = in_memory_engine(&store);
    let raw = doc! { "x": { "$gte": 2 } };

    assert!(engine.can_poll_doc(&raw));
    assert!(!engine.query_poll_doc(COLLECTION, "test1", &raw).await.unwrap());

    store.create(COLLECTION, "test1", "json0", doc! { "x": 1 }).await.unwrap();
    assert!(!engine.query_poll_doc(COLLECTION, "test1", &raw).await.unwrap());

    store.update(COLLECTION, "test1", doc! { "x": 3 }).await.unwrap();
    assert!(engine.query_poll_doc(COLLECTION, "test1", &raw).await.unwrap());

    store.delete(COLLECTION, "test1").await.unwrap();
    assert!(!engine.query_poll_doc(COLLECTION, "test1", &raw).await.unwrap());
}

#[tokio::test]
async fn poll_never_matches_deleted_records() {
    let store = InMemorySnapshotStore::new();
    store.create(COLLECTION, "test1", "json0", doc! { "x": 1 }).await.unwrap();
    store.delete(COLLECTION, "test1").await.unwrap();

    let engine = in_memory_engine(store);

    assert!(!engine.query_poll_doc(COLLECTION, "test1", &doc! { "y": null }).await.unwrap());
    assert!(!engine.query_poll_doc(COLLECTION, "test1", &doc! { "_type": null }).await.unwrap());
}

#[tokio::test]
async fn poll_uses_envelope_fields() {
    let store = InMemorySnapshotStore::new();
    store.create(COLLECTION, "test1", "json0", doc! { "x": 1 }).await.unwrap();

    let engine = in_memory_engine(store);
    let collection = engine.collection(COLLECTION);

    assert!(collection.query_poll_doc("test1", &doc! { "_id": "test1", "_v": 1 }).await.unwrap());
    assert!(!collection.query_poll_doc("test1", &doc! { "_id": "test2" }).await.unwrap());
    assert!(collection.query_poll_doc("test1", &doc! { "_m.ctime": { "$exists": true } }).await.unwrap());
}

#[tokio::test]
async fn result_shaping_queries_are_not_pollable() {
    let engine = in_memory_engine(InMemorySnapshotStore::new());

    assert!(!engine.can_poll_doc(&doc! { "x": 1, "$sort": { "x": 1 } }));
    assert!(!engine.can_poll_doc(&doc! { "$orderby": { "x": 1 } }));
    assert!(!engine.can_poll_doc(&doc! { "$limit": 5 }));
    assert!(!engine.can_poll_doc(&doc! { "$skip": 5 }));
    assert!(!engine.can_poll_doc(&doc! { "$count": true }));
    assert!(!engine.can_poll_doc(&doc! { "$aggregate": [] }));
    assert!(engine.can_poll_doc(&doc! { "$or": [ { "x": 1 } ], "$comment": "ok" }));
}

#[tokio::test]
async fn poll_rejects_unsupported_operators() {
    let engine = in_memory_engine(InMemorySnapshotStore::new());

    assert!(matches!(
        engine.query_poll_doc(COLLECTION, "test1", &doc! { "$where": "1" }).await,
        Err(SnapshotDbError::UnsupportedOperator(_)),
    ));
}

#[tokio::test]
async fn poll_rejects_aggregate_queries() {
    let store = InMemorySnapshotStore::new();
    store.create(COLLECTION, "a", "json0", doc! { "x": 1 }).await.unwrap();

    let engine = in_memory_engine(store);
    let raw = doc! { "$aggregate": [ { "$match": { "x": 99 } } ] };

    assert!(!engine.can_poll_doc(&raw));
    assert!(matches!(
        engine.query_poll_doc(COLLECTION, "a", &raw).await,
        Err(SnapshotDbError::UnsupportedOperator(op)) if op == "$aggregate",
    ));
}
