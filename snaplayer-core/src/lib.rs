//! Query translation that lets an in-memory snapshot store answer MongoDB-style queries.
//!
//! This crate is the core of the snaplayer project and provides:
//!
//! - **Snapshot model** ([`snapshot`]) - Versioned records, tombstones and their document views
//! - **Query types** ([`query`]) - Control directives, parsed queries and a raw-query builder
//! - **Normalizer** ([`normalize`]) - Splits raw queries into filters and directives
//! - **Field mapping** ([`filter`]) - Rewrites filters onto the snapshot document view
//! - **Tombstone guard** ([`tombstone`]) - Keeps deleted records out of query results
//! - **Result pipeline** ([`pipeline`]) - Filtering, sorting, pagination, count and aggregate
//! - **Polling** ([`poll`]) - Single-document re-evaluation for subscriptions
//! - **Engine** ([`engine`]) - The query interface exposed to transport layers
//! - **Collaborators** ([`backend`], [`evaluator`]) - Storage and evaluator traits
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use snaplayer::{prelude::*, memory::{InMemorySnapshotStore, in_memory_engine}};
//! use bson::doc;
//!
//! let store = InMemorySnapshotStore::new();
//! store.create("items", "a", "json0", doc! { "x": 1 }).await?;
//!
//! let engine = in_memory_engine(store);
//! let result = engine
//!     .query("items", &doc! { "x": { "$gt": 0 } }, &QueryOptions::default())
//!     .await?;
//! assert_eq!(result.snapshots.len(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as snaplayer_core;

pub mod backend;
pub mod compare;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod poll;
pub mod query;
pub mod snapshot;
pub mod tombstone;
