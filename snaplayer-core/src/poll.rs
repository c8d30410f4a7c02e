//! Re-testing a single snapshot for incremental subscription updates.

use bson::Document;

use crate::{
    error::SnapshotDbResult,
    evaluator::PredicateEvaluator,
    filter::MappedFilter,
    query::{AGGREGATE, COUNT, LEGACY_SORT, LIMIT, SKIP, SORT},
    snapshot::Snapshot,
};

/// Directives whose presence makes a query's membership depend on other records.
const RESULT_SHAPING_DIRECTIVES: [&str; 6] = [SORT, LEGACY_SORT, SKIP, LIMIT, COUNT, AGGREGATE];

/// Returns `true` if a change to one document can be evaluated in isolation.
///
/// Sorted, paginated, counted or aggregated queries must be re-executed in full instead.
pub fn is_pollable(raw: &Document) -> bool {
    !RESULT_SHAPING_DIRECTIVES
        .iter()
        .any(|directive| raw.contains_key(directive))
}

/// Tests one already-fetched snapshot against a mapped filter.
///
/// A tombstone never matches.
pub fn poll_matches<P>(snapshot: &Snapshot, filter: &MappedFilter, evaluator: &P) -> SnapshotDbResult<bool>
where
    P: PredicateEvaluator + ?Sized,
{
    if snapshot.is_tombstone() {
        return Ok(false);
    }

    evaluator.test(&snapshot.document_view(), &filter.to_document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    use crate::filter::map_filter;

    #[derive(Debug)]
    struct AcceptAll;

    impl PredicateEvaluator for AcceptAll {
        fn test(&self, _: &Document, _: &Document) -> SnapshotDbResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn plain_filters_are_pollable() {
        assert!(is_pollable(&doc! { "x": 1, "$or": [ { "y": 1 } ] }));
        assert!(is_pollable(&doc! {}));
    }

    #[test]
    fn result_shaping_directives_are_not_pollable() {
        for directive in ["$sort", "$orderby", "$skip", "$limit", "$count", "$aggregate"] {
            assert!(!is_pollable(&doc! { "x": 1, directive: 1 }), "{directive}");
        }
    }

    #[test]
    fn tombstones_never_match() {
        let filter = map_filter(&doc! {}).unwrap();

        assert!(!poll_matches(&Snapshot::tombstone("a", 2, None), &filter, &AcceptAll).unwrap());
        assert!(poll_matches(&Snapshot::new("a", 1, "json0", doc! {}), &filter, &AcceptAll).unwrap());
    }
}
