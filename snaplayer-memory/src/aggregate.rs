//! A small aggregation pipeline runner over flat snapshot documents.

use bson::{Bson, Document};

use snaplayer_core::{
    compare::compare_optional,
    error::{SnapshotDbError, SnapshotDbResult},
    evaluator::AggregationEvaluator,
    query::SortDirection,
    snapshot::lookup_path,
};

use crate::evaluator::matches_document;

/// Runs `$match`, `$sort`, `$skip`, `$limit` and `$count` stages in order.
///
/// Any other stage fails with [`SnapshotDbError::UnsupportedOperator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineAggregator;

impl AggregationEvaluator for PipelineAggregator {
    fn run(&self, documents: Vec<Document>, pipeline: &[Document]) -> SnapshotDbResult<Vec<Document>> {
        let mut documents = documents;

        for stage in pipeline {
            let (name, argument) = single_entry(stage)?;

            documents = match name {
                "$match" => {
                    let filter = argument
                        .as_document()
                        .ok_or_else(|| invalid_stage(name, "a document"))?;

                    let mut matched = Vec::with_capacity(documents.len());
                    for document in documents {
                        if matches_document(&document, filter)? {
                            matched.push(document);
                        }
                    }
                    matched
                },
                "$sort" => {
                    let keys = argument
                        .as_document()
                        .ok_or_else(|| invalid_stage(name, "a document"))?
                        .iter()
                        .map(|(field, direction)| {
                            SortDirection::parse(field, direction).map(|direction| (field.as_str(), direction))
                        })
                        .collect::<SnapshotDbResult<Vec<_>>>()?;

                    documents.sort_by(|a, b| {
                        keys.iter()
                            .map(|(field, direction)| {
                                let ordering = compare_optional(lookup_path(a, field), lookup_path(b, field));
                                match direction {
                                    SortDirection::Asc => ordering,
                                    SortDirection::Desc => ordering.reverse(),
                                }
                            })
                            .find(|ordering| ordering.is_ne())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    documents
                },
                "$skip" => {
                    let skip = count_operand(name, argument)?;
                    documents
                        .into_iter()
                        .skip(skip)
                        .collect()
                },
                "$limit" => {
                    let limit = count_operand(name, argument)?;
                    if limit == 0 {
                        return Err(invalid_stage(name, "a positive integer"));
                    }
                    documents.truncate(limit);
                    documents
                },
                "$count" => {
                    let field = argument
                        .as_str()
                        .filter(|field| !field.is_empty() && !field.starts_with('$') && !field.contains('.'))
                        .ok_or_else(|| invalid_stage(name, "a plain field name"))?;

                    if documents.is_empty() {
                        Vec::new()
                    } else {
                        let mut counted = Document::new();
                        counted.insert(field, Bson::Int64(documents.len() as i64));
                        vec![counted]
                    }
                },
                other => return Err(SnapshotDbError::UnsupportedOperator(other.to_string())),
            };
        }

        Ok(documents)
    }
}

fn single_entry(stage: &Document) -> SnapshotDbResult<(&str, &Bson)> {
    let mut entries = stage.iter();

    match (entries.next(), entries.next()) {
        (Some((name, argument)), None) => Ok((name.as_str(), argument)),
        _ => Err(SnapshotDbError::InvalidQueryFormat(
            "pipeline stages must have exactly one field".to_string(),
        )),
    }
}

fn count_operand(stage: &str, argument: &Bson) -> SnapshotDbResult<usize> {
    let count = match argument {
        Bson::Int32(value) => usize::try_from(*value).ok(),
        Bson::Int64(value) => usize::try_from(*value).ok(),
        Bson::Double(value) if value.fract() == 0.0 && *value >= 0.0 => Some(*value as usize),
        _ => None,
    };

    count.ok_or_else(|| invalid_stage(stage, "a non-negative integer"))
}

fn invalid_stage(stage: &str, expected: &str) -> SnapshotDbError {
    SnapshotDbError::InvalidQueryFormat(format!("{stage} expects {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn documents() -> Vec<Document> {
        vec![
            doc! { "_id": "a", "x": 3 },
            doc! { "_id": "b", "x": 1 },
            doc! { "_id": "c", "x": 2 },
            doc! { "_id": "d" },
        ]
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents
            .iter()
            .map(|document| document.get_str("_id").unwrap())
            .collect()
    }

    #[test]
    fn runs_stages_in_order() {
        let output = PipelineAggregator
            .run(
                documents(),
                &[
                    doc! { "$match": { "x": { "$gte": 1 } } },
                    doc! { "$sort": { "x": -1 } },
                    doc! { "$skip": 1 },
                    doc! { "$limit": 1 },
                ],
            )
            .unwrap();

        assert_eq!(ids(&output), vec!["c"]);
    }

    #[test]
    fn sort_places_missing_first() {
        let output = PipelineAggregator
            .run(documents(), &[doc! { "$sort": { "x": 1 } }])
            .unwrap();

        assert_eq!(ids(&output), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn count_stage() {
        let output = PipelineAggregator
            .run(documents(), &[doc! { "$match": { "x": { "$exists": true } } }, doc! { "$count": "total" }])
            .unwrap();
        assert_eq!(output, vec![doc! { "total": 3_i64 }]);

        let empty = PipelineAggregator
            .run(Vec::new(), &[doc! { "$count": "total" }])
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn rejects_unknown_and_malformed_stages() {
        assert!(matches!(
            PipelineAggregator.run(documents(), &[doc! { "$group": { "_id": null } }]),
            Err(SnapshotDbError::UnsupportedOperator(_)),
        ));
        assert!(matches!(
            PipelineAggregator.run(documents(), &[doc! { "$limit": 0 }]),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            PipelineAggregator.run(documents(), &[doc! { "$skip": 1, "$limit": 1 }]),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            PipelineAggregator.run(documents(), &[doc! { "$sort": { "x": 2 } }]),
            Err(SnapshotDbError::InvalidSortDirection(..)),
        ));
    }
}
