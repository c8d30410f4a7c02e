//! In-memory snapshot storage and evaluators for snaplayer.
//!
//! This crate provides the default collaborators of the query engine:
//!
//! - [`InMemorySnapshotStore`] - A thread-safe snapshot store with tombstone-preserving deletes
//! - [`BsonPredicateEvaluator`] - MongoDB-style filter matching over BSON documents
//! - [`PipelineAggregator`] - A small aggregation pipeline runner
//!
//! # Quick Start
//!
//! ```ignore
//! use snaplayer_core::{engine::QueryEngine, pipeline::QueryOptions};
//! use snaplayer_memory::{BsonPredicateEvaluator, InMemorySnapshotStore, PipelineAggregator};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemorySnapshotStore::new();
//!     store.create("items", "a", "json0", doc! { "x": 1 }).await?;
//!
//!     let engine = QueryEngine::new(store, BsonPredicateEvaluator, PipelineAggregator);
//!     let result = engine
//!         .query("items", &doc! { "x": 1 }, &QueryOptions::default())
//!         .await?;
//!
//!     assert_eq!(result.snapshots.len(), 1);
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as snaplayer_memory;

pub mod aggregate;
pub mod evaluator;
pub mod store;

pub use aggregate::PipelineAggregator;
pub use evaluator::BsonPredicateEvaluator;
pub use store::{InMemorySnapshotStore, InMemorySnapshotStoreBuilder};
