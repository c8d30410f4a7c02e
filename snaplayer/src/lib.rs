//! Main snaplayer crate: MongoDB-style queries over an in-memory snapshot store.
//!
//! This crate is the primary entry point for users of snaplayer. It re-exports the
//! query translation layer from `snaplayer-core` and assembles it with the in-memory
//! store and evaluators from `snaplayer-memory`.
//!
//! # Features
//!
//! - **MongoDB query shapes** - Filters, `$sort`, `$skip`, `$limit`, `$count` and `$aggregate`
//! - **Envelope fields** - `_id`, `_v`, `_type` and `_m` address snapshot attributes
//! - **Tombstone safety** - Deleted records stay out of results unless asked for by type
//! - **Polling** - Single-document re-evaluation for live subscriptions
//!
//! # Quick Start
//!
//! ```ignore
//! use snaplayer::{prelude::*, memory::{InMemorySnapshotStore, in_memory_engine}};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemorySnapshotStore::new();
//!     store.create("users", "alice", "json0", doc! { "age": 31 }).await.unwrap();
//!     store.create("users", "bob", "json0", doc! { "age": 17 }).await.unwrap();
//!
//!     let engine = in_memory_engine(store);
//!
//!     // Adults, oldest first, with the total count
//!     let result = engine
//!         .query(
//!             "users",
//!             &RawQuery::builder()
//!                 .filter("age", doc! { "$gte": 18 })
//!                 .sort("age", SortDirection::Desc)
//!                 .build(),
//!             &QueryOptions::default(),
//!         )
//!         .await
//!         .unwrap();
//!
//!     println!("Queried users: {:?}", result.snapshots);
//!
//!     // Can a change to one document be re-checked on its own?
//!     let raw = doc! { "age": { "$gte": 18 } };
//!     if engine.can_poll_doc(&raw) {
//!         let still_matches = engine.query_poll_doc("users", "alice", &raw).await.unwrap();
//!         println!("alice matches: {still_matches}");
//!     }
//!
//!     engine.shutdown().await.unwrap();
//! }
//! ```

pub mod prelude;

pub use snaplayer_core::{
    backend, compare, engine, error, evaluator, filter, normalize, pipeline, poll, query, snapshot, tombstone,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage and evaluator implementations.
pub mod memory {
    pub use snaplayer_memory::{
        BsonPredicateEvaluator, InMemorySnapshotStore, InMemorySnapshotStoreBuilder, PipelineAggregator,
    };

    use snaplayer_core::{backend::SnapshotStore, engine::QueryEngine};

    /// A [`QueryEngine`] over `S` using the bundled evaluators.
    pub type InMemoryQueryEngine<S = InMemorySnapshotStore> = QueryEngine<S, BsonPredicateEvaluator, PipelineAggregator>;

    /// Assembles a query engine over `store` with the bundled evaluators.
    pub fn in_memory_engine<S: SnapshotStore>(store: S) -> InMemoryQueryEngine<S> {
        QueryEngine::new(store, BsonPredicateEvaluator, PipelineAggregator)
    }
}
