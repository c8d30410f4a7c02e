//! Splitting raw queries into a filter body and control directives.

use bson::{Bson, Document};

use crate::{
    error::{SnapshotDbError, SnapshotDbResult},
    filter::OperatorKind,
    query::{AGGREGATE, COUNT, LEGACY_SORT, LIMIT, NO_OP_DIRECTIVES, ParsedQuery, SKIP, SORT, SortDirection, SortKey},
};

/// Splits `raw` into a [`ParsedQuery`].
///
/// The input is copied, never mutated. Directives are extracted in a fixed order:
/// `$aggregate` first (which short-circuits everything else), then the sort
/// (`$sort`, falling back to the deprecated `$orderby`), `$skip`, `$limit` and `$count`.
/// No-op directives are dropped; boolean combinators stay in the filter.
///
/// # Errors
///
/// - [`SnapshotDbError::UnsupportedOperator`] for any other top-level `$` key.
/// - [`SnapshotDbError::InvalidQueryFormat`] for directive values of the wrong shape.
/// - [`SnapshotDbError::InvalidSortDirection`] for sort values other than `1`/`-1`.
pub fn normalize(raw: &Document) -> SnapshotDbResult<ParsedQuery> {
    let mut query = raw.clone();

    if let Some(pipeline) = query.remove(AGGREGATE) {
        return Ok(ParsedQuery {
            aggregate: Some(parse_pipeline(pipeline)?),
            ..ParsedQuery::default()
        });
    }

    let legacy_sort = query.remove(LEGACY_SORT);
    if legacy_sort.is_some() {
        tracing::warn!("query.$orderby is deprecated, use query.$sort instead");
    }
    let sort = query
        .remove(SORT)
        .or(legacy_sort)
        .map(parse_sort)
        .transpose()?;

    let skip = query
        .remove(SKIP)
        .map(|value| parse_size(SKIP, value))
        .transpose()?;

    let limit = query
        .remove(LIMIT)
        .map(|value| parse_size(LIMIT, value))
        .transpose()?
        .filter(|limit| *limit > 0);

    let count = match query.remove(COUNT) {
        Some(Bson::Boolean(count)) => count,
        Some(other) => {
            return Err(SnapshotDbError::InvalidQueryFormat(format!(
                "{COUNT} expects a boolean, got {other}"
            )));
        },
        None => false,
    };

    for directive in NO_OP_DIRECTIVES {
        query.remove(directive);
    }

    if let Some(key) = query
        .keys()
        .find(|key| key.starts_with('$') && OperatorKind::classify(key) == OperatorKind::Unsupported)
    {
        return Err(SnapshotDbError::UnsupportedOperator(key.clone()));
    }

    Ok(ParsedQuery {
        filter: query,
        sort,
        skip,
        limit,
        count,
        aggregate: None,
    })
}

fn parse_pipeline(value: Bson) -> SnapshotDbResult<Vec<Document>> {
    match value {
        Bson::Array(stages) => stages
            .into_iter()
            .map(|stage| match stage {
                Bson::Document(stage) => Ok(stage),
                other => Err(SnapshotDbError::InvalidQueryFormat(format!(
                    "aggregation stage must be a document, got {other}"
                ))),
            })
            .collect(),
        other => Err(SnapshotDbError::InvalidQueryFormat(format!(
            "{AGGREGATE} expects an array of stages, got {other}"
        ))),
    }
}

fn parse_sort(value: Bson) -> SnapshotDbResult<Vec<SortKey>> {
    match value {
        Bson::Document(keys) => keys
            .iter()
            .map(|(field, direction)| {
                SortDirection::parse(field, direction).map(|direction| SortKey {
                    field: field.clone(),
                    direction,
                })
            })
            .collect(),
        other => Err(SnapshotDbError::InvalidQueryFormat(format!(
            "sort expects a document of field directions, got {other}"
        ))),
    }
}

fn parse_size(directive: &str, value: Bson) -> SnapshotDbResult<usize> {
    let size = match &value {
        Bson::Int32(size) => usize::try_from(*size).ok(),
        Bson::Int64(size) => usize::try_from(*size).ok(),
        Bson::Double(size) if size.fract() == 0.0 && *size >= 0.0 => Some(*size as usize),
        _ => None,
    };

    size.ok_or_else(|| SnapshotDbError::InvalidQueryFormat(format!(
        "{directive} expects a non-negative integer, got {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn extracts_directives() {
        let parsed = normalize(&doc! {
            "y": 2,
            "$sort": { "x": 1, "z": -1 },
            "$skip": 1,
            "$limit": 2_i64,
            "$count": true,
        }).unwrap();

        assert_eq!(parsed.filter, doc! { "y": 2 });
        assert_eq!(
            parsed.sort,
            Some(vec![
                SortKey { field: "x".into(), direction: SortDirection::Asc },
                SortKey { field: "z".into(), direction: SortDirection::Desc },
            ]),
        );
        assert_eq!(parsed.skip, Some(1));
        assert_eq!(parsed.limit, Some(2));
        assert!(parsed.count);
        assert!(parsed.aggregate.is_none());
    }

    #[test]
    fn does_not_mutate_input() {
        let raw = doc! { "y": 2, "$sort": { "x": 1 }, "$comment": "c" };
        let copy = raw.clone();

        normalize(&raw).unwrap();

        assert_eq!(raw, copy);
    }

    #[test]
    fn sort_wins_over_legacy_orderby() {
        let parsed = normalize(&doc! { "$orderby": { "a": 1 }, "$sort": { "b": -1 } }).unwrap();

        assert_eq!(
            parsed.sort,
            Some(vec![SortKey { field: "b".into(), direction: SortDirection::Desc }]),
        );
    }

    #[test]
    fn accepts_legacy_orderby() {
        let parsed = normalize(&doc! { "$orderby": { "a": -1 } }).unwrap();

        assert_eq!(
            parsed.sort,
            Some(vec![SortKey { field: "a".into(), direction: SortDirection::Desc }]),
        );
        assert!(parsed.filter.is_empty());
    }

    #[test]
    fn aggregate_short_circuits() {
        let parsed = normalize(&doc! {
            "$aggregate": [ { "$match": { "x": 1 } } ],
            "$sort": { "x": 2 },
            "$bogus": 1,
        }).unwrap();

        assert_eq!(parsed.aggregate, Some(vec![doc! { "$match": { "x": 1 } }]));
        assert!(parsed.sort.is_none());
        assert!(parsed.filter.is_empty());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(normalize(&doc! { "$limit": 0 }).unwrap().limit, None);
    }

    #[test]
    fn strips_no_op_directives_and_keeps_combinators() {
        let parsed = normalize(&doc! {
            "$comment": "why",
            "$hint": { "x": 1 },
            "$maxTimeMS": 100,
            "$or": [ { "x": 1 } ],
        }).unwrap();

        assert_eq!(parsed.filter, doc! { "$or": [ { "x": 1 } ] });
    }

    #[test]
    fn rejects_unsupported_operators() {
        assert!(matches!(
            normalize(&doc! { "$mapReduce": [] }),
            Err(SnapshotDbError::UnsupportedOperator(op)) if op == "$mapReduce",
        ));
    }

    #[test]
    fn rejects_malformed_directives() {
        assert!(matches!(
            normalize(&doc! { "$skip": -1 }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            normalize(&doc! { "$limit": "ten" }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            normalize(&doc! { "$count": 1 }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            normalize(&doc! { "$sort": [ [ "x", 1 ] ] }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            normalize(&doc! { "$aggregate": { "$match": {} } }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
    }

    #[test]
    fn rejects_invalid_sort_direction() {
        assert!(matches!(
            normalize(&doc! { "$sort": { "x": 0 } }),
            Err(SnapshotDbError::InvalidSortDirection(field, _)) if field == "x",
        ));
    }
}
