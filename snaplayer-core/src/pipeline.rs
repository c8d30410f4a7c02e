//! Filtering, ordering and pagination over an in-memory snapshot set.
//!
//! A [`QueryPlan`] is built once per query from the normalizer's output: the filter is
//! mapped onto the snapshot view and guarded against tombstones, and sort keys are mapped
//! the same way. [`execute`] then runs the plan over an owned set of snapshots.

use std::cmp::Ordering;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    compare::compare_optional,
    error::SnapshotDbResult,
    evaluator::{AggregationEvaluator, PredicateEvaluator},
    filter::{FieldTarget, MappedFilter, map_filter},
    query::{ParsedQuery, SortDirection},
    snapshot::{Snapshot, lookup_path},
    tombstone::make_safe,
};

/// Per-call query options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Keep the metadata attribute on returned snapshots.
    #[serde(default)]
    pub include_metadata: bool,
}

impl QueryOptions {
    /// Options that keep metadata on returned snapshots.
    pub fn with_metadata() -> Self {
        QueryOptions { include_metadata: true }
    }
}

/// The outcome of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Matching snapshots, empty for count and aggregate queries.
    pub snapshots: Vec<Snapshot>,
    /// The match count (`Int64`) for count queries, or the aggregation output (`Array`).
    pub extra: Option<Bson>,
}

/// An executable query: mapped, tombstone-safe filter plus result shaping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub filter: MappedFilter,
    pub sort: Vec<(FieldTarget, SortDirection)>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub count: bool,
    pub aggregate: Option<Vec<Document>>,
}

impl QueryPlan {
    /// Builds a plan from a normalized query.
    ///
    /// # Errors
    ///
    /// Propagates field-mapping errors.
    pub fn from_parsed(parsed: ParsedQuery) -> SnapshotDbResult<Self> {
        if let Some(stages) = parsed.aggregate {
            return Ok(QueryPlan {
                aggregate: Some(stages),
                ..QueryPlan::default()
            });
        }

        let mut filter = map_filter(&parsed.filter)?;
        make_safe(&mut filter);

        Ok(QueryPlan {
            filter,
            sort: parsed.sort
                .unwrap_or_default()
                .into_iter()
                .map(|key| (FieldTarget::map(&key.field), key.direction))
                .collect(),
            skip: parsed.skip.unwrap_or(0),
            limit: parsed.limit,
            count: parsed.count,
            aggregate: None,
        })
    }
}

/// Runs `plan` over `snapshots`.
///
/// Aggregate plans hand the flat view of every snapshot to `aggregator` and skip all
/// other stages. Otherwise snapshots are filtered with `evaluator`, stably sorted, then
/// skipped and limited. A count plan reports the number of matches before skip and limit.
/// Metadata is cleared from the returned snapshots unless `options.include_metadata`.
///
/// # Errors
///
/// Errors from either evaluator are returned unchanged.
pub fn execute<P, A>(
    snapshots: Vec<Snapshot>,
    plan: &QueryPlan,
    options: &QueryOptions,
    evaluator: &P,
    aggregator: &A,
) -> SnapshotDbResult<QueryResult>
where
    P: PredicateEvaluator + ?Sized,
    A: AggregationEvaluator + ?Sized,
{
    if let Some(stages) = &plan.aggregate {
        let output = aggregator.run(
            snapshots
                .iter()
                .map(Snapshot::flat_document)
                .collect(),
            stages,
        )?;

        return Ok(QueryResult {
            snapshots: Vec::new(),
            extra: Some(Bson::Array(output.into_iter().map(Bson::Document).collect())),
        });
    }

    let filter = plan.filter.to_document();
    let mut matched = Vec::new();

    for snapshot in snapshots {
        let view = snapshot.document_view();
        if evaluator.test(&view, &filter)? {
            matched.push((snapshot, view));
        }
    }

    if plan.count {
        return Ok(QueryResult {
            snapshots: Vec::new(),
            extra: Some(Bson::Int64(matched.len() as i64)),
        });
    }

    if !plan.sort.is_empty() {
        matched.sort_by(|(_, a), (_, b)| compare_views(a, b, &plan.sort));
    }

    let snapshots = matched
        .into_iter()
        .skip(plan.skip)
        .take(plan.limit.unwrap_or(usize::MAX))
        .map(|(mut snapshot, _)| {
            if !options.include_metadata {
                snapshot.strip_metadata();
            }
            snapshot
        })
        .collect();

    Ok(QueryResult { snapshots, extra: None })
}

fn compare_views(a: &Document, b: &Document, sort: &[(FieldTarget, SortDirection)]) -> Ordering {
    for (target, direction) in sort {
        let ordering = compare_optional(
            lookup_path(a, target.path()),
            lookup_path(b, target.path()),
        );

        if ordering != Ordering::Equal {
            return match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
        }
    }

    Ordering::Equal
}
