//! Guarding mapped filters against matching deleted records.
//!
//! A tombstone is a snapshot whose view is `{ id, v, type: null, m }` with no `data`.
//! Conditions like `{ y: null }` or `{ x: { $exists: false } }` match such a record, so
//! a query that was never meant to see deleted records could return them. [`make_safe`]
//! statically decides whether that can happen and, when it can, adds a clause requiring
//! `type` to be a string.
//!
//! The analysis only has to be sound in one direction. Adding the guard when it is not
//! needed costs a redundant condition; omitting it when it is needed leaks deleted
//! records. Every shape the analysis does not understand therefore counts as "could
//! match a tombstone".

use bson::{Bson, doc};

use crate::{
    filter::{Combinator, Condition, EnvelopeField, FieldTarget, FilterNode, MappedFilter},
    snapshot::TYPE_FIELD,
};

/// Adds a `type: { $type: "string" }` clause to `filter` if a tombstone could match it.
///
/// Does nothing when the filter already constrains the type field at its top level.
/// Returns `true` if the guard was added.
pub fn make_safe(filter: &mut MappedFilter) -> bool {
    if filter.constrains_type() || !could_match_tombstone(filter) {
        return false;
    }

    filter.push(FilterNode::Field {
        target: FieldTarget::Envelope {
            field: EnvelopeField::Type,
            path: TYPE_FIELD.to_string(),
        },
        condition: Condition::Operators(doc! { "$type": "string" }),
    });

    tracing::trace!("added tombstone guard to query filter");

    true
}

/// Returns `true` if a tombstone could satisfy `filter`, or if that cannot be ruled out.
pub fn could_match_tombstone(filter: &MappedFilter) -> bool {
    // One operand that cannot match defeats the whole conjunction.
    for node in filter.nodes() {
        if let FilterNode::Combinator { op: Combinator::And, operands } = node {
            if !operands.iter().all(could_match_tombstone) {
                return false;
            }
        }
    }

    let mut disjunctions = Vec::new();

    for node in filter.nodes() {
        match node {
            FilterNode::Combinator { op: Combinator::And, .. } => {},
            FilterNode::Combinator { op: Combinator::Or, operands } => disjunctions.push(operands),
            // Not analysed; assume the worst.
            FilterNode::Combinator { op: Combinator::Nor, .. } => return true,
            FilterNode::Field { target: FieldTarget::Envelope { field, .. }, .. }
                if field.survives_deletion() => {},
            FilterNode::Field { condition, .. } => {
                if !could_match_null(condition) {
                    return false;
                }
            },
        }
    }

    disjunctions
        .into_iter()
        .all(|operands| operands.iter().any(could_match_tombstone))
}

/// Returns `true` if `condition` could match a null or absent value.
pub fn could_match_null(condition: &Condition) -> bool {
    match condition {
        Condition::Scalar(_) => false,
        Condition::Null => true,
        // Clauses combine by implicit AND: any clause that excludes null excludes the
        // whole condition. Unrecognised clauses are assumed compatible with null.
        Condition::Operators(clauses) => !clauses.iter().any(|(operator, operand)| {
            match operator.as_str() {
                "$in" => match operand {
                    Bson::Array(values) => !values.iter().any(|value| matches!(value, Bson::Null)),
                    _ => false,
                },
                "$ne" => matches!(operand, Bson::Null),
                "$exists" => is_truthy(operand),
                "$gt" | "$gte" | "$lt" | "$lte" => !matches!(operand, Bson::Null),
                _ => false,
            }
        }),
        Condition::Other(_) => true,
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0 && !value.is_nan(),
        Bson::String(value) => !value.is_empty(),
        _ => true,
    }
}
