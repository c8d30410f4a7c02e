//! Convenient re-exports of commonly used types from snaplayer.
//!
//! ```ignore
//! use snaplayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The query engine and its collection handle
//! - Store and evaluator traits
//! - Raw query construction and sort directions
//! - Snapshots, query options and results
//! - Error types

pub use snaplayer_core::{
    engine::{QueryEngine, SnapshotCollection},
    backend::{SnapshotStore, SnapshotStoreBuilder},
    evaluator::{PredicateEvaluator, AggregationEvaluator},
    query::{RawQuery, RawQueryBuilder, SortDirection},
    pipeline::{QueryOptions, QueryResult},
    snapshot::Snapshot,
    error::{SnapshotDbError, SnapshotDbResult},
};
