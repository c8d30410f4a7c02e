//! Query expression evaluation for in-memory snapshot filtering.
//!
//! [`BsonPredicateEvaluator`] tests MongoDB-style filter documents against BSON documents.
//! Paths are dotted; a path step over an array descends into each embedded document,
//! and a numeric step indexes the array directly. A field compares against its value
//! and, when that value is an array, against each element.

use std::cmp::Ordering;
use bson::{Bson, Document};
use regex::RegexBuilder;

use snaplayer_core::{
    compare::{compare_bracketed, values_equal},
    error::{SnapshotDbError, SnapshotDbResult},
    evaluator::PredicateEvaluator,
};


/// Matches filter documents the way a MongoDB query would.
///
/// Supported field operators: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
/// `$exists`, `$regex` (with `$options`), `$all`, `$not`, `$type`, `$size`, `$elemMatch`
/// and `$comment`. Top-level combinators: `$and`, `$or`, `$nor`.
///
/// # Example
///
/// ```ignore
/// use snaplayer_memory::BsonPredicateEvaluator;
/// use snaplayer_core::evaluator::PredicateEvaluator;
/// use bson::doc;
///
/// let matched = BsonPredicateEvaluator
///     .test(&doc! { "data": { "x": 3 } }, &doc! { "data.x": { "$gt": 1 } })?;
/// assert!(matched);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonPredicateEvaluator;

impl PredicateEvaluator for BsonPredicateEvaluator {
    fn test(&self, document: &Document, filter: &Document) -> SnapshotDbResult<bool> {
        matches_document(document, filter)
    }
}

pub(crate) fn matches_document(document: &Document, filter: &Document) -> SnapshotDbResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for operand in combinator_operands(key, condition)? {
                    if !matches_document(document, operand)? {
                        all = false;
                        break;
                    }
                }
                all
            },
            "$or" | "$nor" => {
                let mut any = false;
                for operand in combinator_operands(key, condition)? {
                    if matches_document(document, operand)? {
                        any = true;
                        break;
                    }
                }
                any == (key == "$or")
            },
            "$comment" => true,
            operator if operator.starts_with('$') => {
                return Err(SnapshotDbError::UnsupportedOperator(operator.to_string()));
            },
            path => matches_condition(&resolve_path(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn combinator_operands<'a>(key: &str, value: &'a Bson) -> SnapshotDbResult<Vec<&'a Document>> {
    let invalid = || SnapshotDbError::InvalidQueryFormat(format!("{key} expects an array of documents"));

    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|operand| operand.as_document().ok_or_else(invalid))
        .collect()
}

/// Collects every value reachable through `path`.
fn resolve_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            resolve_into(value, rest, &mut found);
        }
    }

    found
}

fn resolve_into<'a>(current: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(current);
        return;
    };

    match current {
        Bson::Document(inner) => {
            if let Some(next) = inner.get(*head) {
                resolve_into(next, rest, found);
            }
        },
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    resolve_into(next, rest, found);
                }
            },
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    resolve_into(item, segments, found);
                }
            },
        },
        _ => {},
    }
}

/// The resolved values plus the elements of any arrays among them.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

fn is_operator_document(condition: &Bson) -> bool {
    condition
        .as_document()
        .and_then(|document| document.keys().next())
        .is_some_and(|key| key.starts_with('$'))
}

fn matches_condition(values: &[&Bson], condition: &Bson) -> SnapshotDbResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(condition) => matches_operators(values, operators),
        _ => Ok(equals(values, condition)),
    }
}

fn equals(values: &[&Bson], operand: &Bson) -> bool {
    let expanded = expand(values);

    match operand {
        Bson::Null => expanded.is_empty() || expanded.iter().any(|value| matches!(value, Bson::Null)),
        _ => expanded.iter().any(|value| values_equal(value, operand)),
    }
}

fn matches_operators(values: &[&Bson], operators: &Document) -> SnapshotDbResult<bool> {
    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals(values, operand),
            "$ne" => !equals(values, operand),
            "$gt" => compares(values, operand, |ordering| ordering == Ordering::Greater),
            "$gte" => compares(values, operand, |ordering| ordering != Ordering::Less),
            "$lt" => compares(values, operand, |ordering| ordering == Ordering::Less),
            "$lte" => compares(values, operand, |ordering| ordering != Ordering::Greater),
            "$in" => array_operand(operator, operand)?
                .iter()
                .any(|candidate| equals(values, candidate)),
            "$nin" => !array_operand(operator, operand)?
                .iter()
                .any(|candidate| equals(values, candidate)),
            "$exists" => is_truthy(operand) != values.is_empty(),
            "$regex" => {
                let regex = build_regex(operand, operators.get("$options"))?;
                expand(values)
                    .iter()
                    .any(|value| value.as_str().is_some_and(|text| regex.is_match(text)))
            },
            "$options" => {
                if !operators.contains_key("$regex") {
                    return Err(SnapshotDbError::InvalidQueryFormat("$options requires $regex".to_string()));
                }
                true
            },
            "$all" => {
                let required = array_operand(operator, operand)?;
                !required.is_empty() && required
                    .iter()
                    .all(|candidate| equals(values, candidate))
            },
            "$not" => match operand {
                Bson::Document(inner) => !matches_operators(values, inner)?,
                _ => return Err(SnapshotDbError::InvalidQueryFormat("$not expects an operator document".to_string())),
            },
            "$type" => {
                let aliases = match operand {
                    Bson::Array(aliases) => aliases.iter().collect::<Vec<_>>(),
                    single => vec![single],
                };
                let expanded = expand(values);

                let mut any = false;
                for alias in aliases {
                    for value in &expanded {
                        if type_matches(value, alias)? {
                            any = true;
                        }
                    }
                }
                any
            },
            "$size" => {
                let size = size_operand(operand)?;
                values
                    .iter()
                    .any(|value| value.as_array().is_some_and(|items| items.len() == size))
            },
            "$elemMatch" => {
                let Bson::Document(criteria) = operand else {
                    return Err(SnapshotDbError::InvalidQueryFormat("$elemMatch expects a document".to_string()));
                };

                let mut any = false;
                for items in values.iter().filter_map(|value| value.as_array()) {
                    for item in items {
                        if element_matches(item, operand, criteria)? {
                            any = true;
                            break;
                        }
                    }
                }
                any
            },
            "$comment" => true,
            other => return Err(SnapshotDbError::UnsupportedOperator(other.to_string())),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn element_matches(item: &Bson, criteria_bson: &Bson, criteria: &Document) -> SnapshotDbResult<bool> {
    if is_operator_document(criteria_bson) {
        return matches_operators(&[item], criteria);
    }

    match item {
        Bson::Document(inner) => matches_document(inner, criteria),
        _ => Ok(false),
    }
}

fn compares(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    expand(values)
        .iter()
        .filter_map(|value| compare_bracketed(value, operand))
        .any(accept)
}

fn array_operand<'a>(operator: &str, operand: &'a Bson) -> SnapshotDbResult<&'a Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| SnapshotDbError::InvalidQueryFormat(format!("{operator} expects an array")))
}

fn size_operand(operand: &Bson) -> SnapshotDbResult<usize> {
    let size = match operand {
        Bson::Int32(value) => usize::try_from(*value).ok(),
        Bson::Int64(value) => usize::try_from(*value).ok(),
        Bson::Double(value) if value.fract() == 0.0 && *value >= 0.0 => Some(*value as usize),
        _ => None,
    };

    size.ok_or_else(|| SnapshotDbError::InvalidQueryFormat(format!("$size expects a non-negative integer, got {operand}")))
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0 && !value.is_nan(),
        Bson::String(value) => !value.is_empty(),
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn build_regex(pattern: &Bson, options: Option<&Bson>) -> SnapshotDbResult<regex::Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| SnapshotDbError::InvalidQueryFormat("$regex expects a string pattern".to_string()))?;
    let options = match options {
        Some(Bson::String(options)) => options.as_str(),
        Some(other) => {
            return Err(SnapshotDbError::InvalidQueryFormat(format!("$options expects a string, got {other}")));
        },
        None => "",
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(SnapshotDbError::InvalidQueryFormat(format!("unknown regex option '{other}'")));
            },
        };
    }

    builder
        .build()
        .map_err(|error| SnapshotDbError::InvalidQueryFormat(format!("invalid $regex: {error}")))
}

/// Tests a value against a `$type` alias or numeric type code.
fn type_matches(value: &Bson, alias: &Bson) -> SnapshotDbResult<bool> {
    let (code, name) = type_of(value);

    match alias {
        Bson::String(alias) if alias == "number" => Ok(matches!(code, 1 | 16 | 18 | 19)),
        Bson::String(alias) if is_known_alias(alias) => Ok(alias == name),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let requested = match alias {
                Bson::Int32(value) => Some(i64::from(*value)),
                Bson::Int64(value) => Some(*value),
                Bson::Double(value) if value.fract() == 0.0 => Some(*value as i64),
                _ => None,
            };
            Ok(requested == Some(code))
        },
        other => Err(SnapshotDbError::InvalidQueryFormat(format!("unknown $type alias {other}"))),
    }
}

fn is_known_alias(alias: &str) -> bool {
    matches!(
        alias,
        "double" | "string" | "object" | "array" | "binData" | "undefined" | "objectId" | "bool"
            | "date" | "null" | "regex" | "dbPointer" | "javascript" | "symbol" | "int"
            | "timestamp" | "long" | "decimal" | "minKey" | "maxKey"
    )
}

fn type_of(value: &Bson) -> (i64, &'static str) {
    match value {
        Bson::Double(_) => (1, "double"),
        Bson::String(_) => (2, "string"),
        Bson::Document(_) => (3, "object"),
        Bson::Array(_) => (4, "array"),
        Bson::Binary(_) => (5, "binData"),
        Bson::Undefined => (6, "undefined"),
        Bson::ObjectId(_) => (7, "objectId"),
        Bson::Boolean(_) => (8, "bool"),
        Bson::DateTime(_) => (9, "date"),
        Bson::Null => (10, "null"),
        Bson::RegularExpression(_) => (11, "regex"),
        Bson::DbPointer(_) => (12, "dbPointer"),
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => (13, "javascript"),
        Bson::Symbol(_) => (14, "symbol"),
        Bson::Int32(_) => (16, "int"),
        Bson::Timestamp(_) => (17, "timestamp"),
        Bson::Int64(_) => (18, "long"),
        Bson::Decimal128(_) => (19, "decimal"),
        Bson::MinKey => (-1, "minKey"),
        Bson::MaxKey => (127, "maxKey"),
    }
}
