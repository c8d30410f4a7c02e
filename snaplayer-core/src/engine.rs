//! The query engine: the interface transport and subscription layers call.
//!
//! [`QueryEngine`] ties a [`SnapshotStore`] to a [`PredicateEvaluator`] and an
//! [`AggregationEvaluator`] and runs the full translation pipeline for each call:
//! normalize, map, guard against tombstones, evaluate, sort and paginate.
//!
//! # Example
//!
//! ```ignore
//! use snaplayer::prelude::*;
//! use bson::doc;
//!
//! let engine = snaplayer::memory::in_memory_engine(store);
//!
//! let result = engine
//!     .query("users", &doc! { "age": { "$gte": 18 }, "$sort": { "name": 1 } }, &QueryOptions::default())
//!     .await?;
//! ```

use bson::Document;

use crate::{
    backend::SnapshotStore,
    error::{SnapshotDbError, SnapshotDbResult},
    evaluator::{AggregationEvaluator, PredicateEvaluator},
    filter::map_filter,
    normalize::normalize,
    pipeline::{QueryOptions, QueryPlan, QueryResult, execute},
    poll::{is_pollable, poll_matches},
    query::AGGREGATE,
};

/// Runs MongoDB-style queries against a snapshot store.
///
/// Every call works on its own copy of the query and of the fetched snapshots, so
/// concurrent queries over the same collection never observe each other.
#[derive(Debug, Clone)]
pub struct QueryEngine<S, P, A> {
    store: S,
    evaluator: P,
    aggregator: A,
}

impl<S, P, A> QueryEngine<S, P, A>
where
    S: SnapshotStore,
    P: PredicateEvaluator,
    A: AggregationEvaluator,
{
    /// Creates a new engine.
    pub fn new(store: S, evaluator: P, aggregator: A) -> Self {
        Self { store, evaluator, aggregator }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a handle bound to one collection.
    pub fn collection<'a>(&'a self, name: &str) -> SnapshotCollection<'a, S, P, A> {
        SnapshotCollection {
            name: name.to_string(),
            engine: self,
        }
    }

    /// Runs `raw` against every snapshot of `collection`.
    ///
    /// # Errors
    ///
    /// Returns query-format errors from translation, and store or evaluator errors
    /// unchanged. No partial results are returned on error.
    pub async fn query(
        &self,
        collection: &str,
        raw: &Document,
        options: &QueryOptions,
    ) -> SnapshotDbResult<QueryResult> {
        let plan = QueryPlan::from_parsed(normalize(raw)?)?;
        let snapshots = self.store
            .get_all_snapshots(collection)
            .await?;
        let scanned = snapshots.len();

        let result = execute(snapshots, &plan, options, &self.evaluator, &self.aggregator)?;

        tracing::debug!(
            collection,
            scanned,
            returned = result.snapshots.len(),
            extra = result.extra.is_some(),
            "executed snapshot query"
        );

        Ok(result)
    }

    /// Tests whether the snapshot `id` currently matches the filter of `raw`.
    ///
    /// Sort and pagination directives are ignored; callers check [`Self::can_poll_doc`]
    /// first. Deleted or never-written ids do not match. There is no [`QueryOptions`]
    /// parameter: the answer is a bare `bool`, so no snapshot (and no metadata) is
    /// returned to shape.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotDbError::UnsupportedOperator`] for an `$aggregate` query, whose
    /// membership cannot be decided from one document.
    pub async fn query_poll_doc(
        &self,
        collection: &str,
        id: &str,
        raw: &Document,
    ) -> SnapshotDbResult<bool> {
        let parsed = normalize(raw)?;
        if parsed.aggregate.is_some() {
            return Err(SnapshotDbError::UnsupportedOperator(AGGREGATE.to_string()));
        }

        let filter = map_filter(&parsed.filter)?;
        let snapshot = self.store
            .get_snapshot(collection, id, true)
            .await?;

        poll_matches(&snapshot, &filter, &self.evaluator)
    }

    /// Returns `true` if single-document polling is valid for `raw`.
    pub fn can_poll_doc(&self, raw: &Document) -> bool {
        is_pollable(raw)
    }

    /// Shuts down the underlying store.
    pub async fn shutdown(self) -> SnapshotDbResult<()> {
        self.store.shutdown().await
    }
}

/// A [`QueryEngine`] bound to one collection name.
#[derive(Debug)]
pub struct SnapshotCollection<'a, S, P, A> {
    name: String,
    engine: &'a QueryEngine<S, P, A>,
}

impl<'a, S, P, A> SnapshotCollection<'a, S, P, A>
where
    S: SnapshotStore,
    P: PredicateEvaluator,
    A: AggregationEvaluator,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn query(&self, raw: &Document, options: &QueryOptions) -> SnapshotDbResult<QueryResult> {
        self.engine
            .query(&self.name, raw, options)
            .await
    }

    pub async fn query_poll_doc(&self, id: &str, raw: &Document) -> SnapshotDbResult<bool> {
        self.engine
            .query_poll_doc(&self.name, id, raw)
            .await
    }
}
