//! Field mapping from caller-facing filters onto the snapshot document view.
//!
//! Callers write filters the way they would against a persisted MongoDB collection:
//! payload fields at the top level and envelope fields behind underscore-prefixed names
//! (`_id`, `_v`, `_type`, `_m`, `_o`). Snapshots are evaluated through
//! [`Snapshot::document_view`](crate::snapshot::Snapshot::document_view) instead, where
//! the payload lives under `data` and envelope fields use their internal names.
//!
//! [`map_filter`] bridges the two once, producing a [`MappedFilter`]: a tagged tree of
//! field nodes and boolean-combinator nodes whose conditions are already classified for
//! the tombstone analysis. The mapping is a one-shot transform. Feeding a mapped filter
//! back through the mapper is not supported.

use bson::{Bson, Document};

use crate::{
    error::{SnapshotDbError, SnapshotDbResult},
    query::NO_OP_DIRECTIVES,
    snapshot::{DATA_FIELD, ID_FIELD, METADATA_FIELD, OP_LINK_FIELD, TYPE_FIELD, VERSION_FIELD},
};

/// Envelope attributes of a snapshot that filters may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeField {
    /// `_id`, the record id.
    Id,
    /// `_v`, the version.
    Version,
    /// `_type`, the editing type.
    Type,
    /// `_m`, the metadata document.
    Metadata,
    /// `_o`, the operation-log link.
    OpLink,
}

impl EnvelopeField {
    /// Resolves an external (caller-facing) field name.
    pub fn from_external(name: &str) -> Option<Self> {
        match name {
            "_id" => Some(EnvelopeField::Id),
            "_v" => Some(EnvelopeField::Version),
            "_type" => Some(EnvelopeField::Type),
            "_m" => Some(EnvelopeField::Metadata),
            "_o" => Some(EnvelopeField::OpLink),
            _ => None,
        }
    }

    /// The name this field has in the snapshot document view.
    pub fn internal_name(&self) -> &'static str {
        match self {
            EnvelopeField::Id => ID_FIELD,
            EnvelopeField::Version => VERSION_FIELD,
            EnvelopeField::Type => TYPE_FIELD,
            EnvelopeField::Metadata => METADATA_FIELD,
            EnvelopeField::OpLink => OP_LINK_FIELD,
        }
    }

    /// Whether a tombstone still carries this field.
    pub fn survives_deletion(&self) -> bool {
        !matches!(self, EnvelopeField::Type)
    }
}

/// Boolean combinators whose operands are themselves filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Nor,
}

impl Combinator {
    /// Resolves a combinator key such as `$and`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$and" => Some(Combinator::And),
            "$or" => Some(Combinator::Or),
            "$nor" => Some(Combinator::Nor),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Combinator::And => "$and",
            Combinator::Or => "$or",
            Combinator::Nor => "$nor",
        }
    }
}

/// How a `$`-prefixed filter key is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// A boolean combinator over sub-filters.
    Combinator(Combinator),
    /// A compatibility no-op that is dropped before mapping.
    NoOp,
    /// Anything else.
    Unsupported,
}

impl OperatorKind {
    /// Classifies a `$`-prefixed key.
    pub fn classify(key: &str) -> Self {
        if let Some(combinator) = Combinator::from_key(key) {
            OperatorKind::Combinator(combinator)
        } else if NO_OP_DIRECTIVES.contains(&key) {
            OperatorKind::NoOp
        } else {
            OperatorKind::Unsupported
        }
    }
}

/// The record attribute a field node addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTarget {
    /// An envelope field, possibly with a sub-path (`_m.mtime`).
    Envelope {
        field: EnvelopeField,
        /// Full path in the document view, e.g. `m.mtime`.
        path: String,
    },
    /// A payload field; the path includes the `data.` prefix.
    Payload(String),
}

impl FieldTarget {
    /// Maps a caller-facing field path.
    ///
    /// Only the leading segment of an envelope path is rewritten; the remaining
    /// segments are kept verbatim.
    pub fn map(key: &str) -> Self {
        let (head, rest) = match key.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (key, None),
        };

        match EnvelopeField::from_external(head) {
            Some(field) => FieldTarget::Envelope {
                field,
                path: match rest {
                    Some(rest) => format!("{}.{}", field.internal_name(), rest),
                    None => field.internal_name().to_string(),
                },
            },
            None => FieldTarget::Payload(format!("{DATA_FIELD}.{key}")),
        }
    }

    /// The path in the snapshot document view.
    pub fn path(&self) -> &str {
        match self {
            FieldTarget::Envelope { path, .. } => path,
            FieldTarget::Payload(path) => path,
        }
    }

    /// Whether this target is exactly the type field.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            FieldTarget::Envelope { field: EnvelopeField::Type, path } if path == TYPE_FIELD
        )
    }
}

/// A field condition, classified by shape at mapping time.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A number, boolean or string, matched by equality.
    Scalar(Bson),
    /// The literal `null`.
    Null,
    /// A document: either operator clauses (`{ $gt: 1 }`) or an embedded-document match.
    Operators(Document),
    /// Any other value (arrays, dates, ids, ...).
    Other(Bson),
}

impl Condition {
    /// Classifies a raw condition value.
    pub fn classify(value: Bson) -> Self {
        match value {
            Bson::Null => Condition::Null,
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Boolean(_) | Bson::String(_) => {
                Condition::Scalar(value)
            },
            Bson::Document(document) => Condition::Operators(document),
            other => Condition::Other(other),
        }
    }

    /// Renders the condition back into a BSON value.
    pub fn to_bson(&self) -> Bson {
        match self {
            Condition::Scalar(value) | Condition::Other(value) => value.clone(),
            Condition::Null => Bson::Null,
            Condition::Operators(document) => Bson::Document(document.clone()),
        }
    }
}

/// One top-level entry of a mapped filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// A condition on a single field.
    Field {
        target: FieldTarget,
        condition: Condition,
    },
    /// A boolean combinator over independently mapped sub-filters.
    Combinator {
        op: Combinator,
        operands: Vec<MappedFilter>,
    },
}

/// A filter rewritten onto the snapshot document view.
///
/// Top-level nodes combine by implicit AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedFilter {
    nodes: Vec<FilterNode>,
}

impl MappedFilter {
    /// Creates a mapped filter from nodes.
    pub fn new(nodes: Vec<FilterNode>) -> Self {
        MappedFilter { nodes }
    }

    /// Returns the top-level nodes.
    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    /// Returns `true` if there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node, joined to the existing ones by implicit AND.
    pub fn push(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    /// Returns `true` if a top-level node constrains the type field directly.
    pub fn constrains_type(&self) -> bool {
        self.nodes.iter().any(|node| matches!(
            node,
            FilterNode::Field { target, .. } if target.is_type()
        ))
    }

    /// Renders the tree as a filter document for the predicate evaluator.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();

        for node in &self.nodes {
            match node {
                FilterNode::Field { target, condition } => {
                    document.insert(target.path(), condition.to_bson());
                },
                FilterNode::Combinator { op, operands } => {
                    document.insert(
                        op.key(),
                        operands
                            .iter()
                            .map(|operand| Bson::Document(operand.to_document()))
                            .collect::<Vec<_>>(),
                    );
                },
            }
        }

        document
    }
}

/// Maps a caller-facing filter onto the snapshot document view.
///
/// Per top-level key:
/// 1. An envelope field (`_id`, `_v`, `_type`, `_m`, `_o`, optionally with a sub-path)
///    is renamed to its internal name and keeps its condition.
/// 2. A combinator (`$and`, `$or`, `$nor`) must hold an array of filters, each mapped
///    independently.
/// 3. Any other key addresses the payload and is prefixed with `data.`.
///
/// No-op directives such as `$comment` are dropped at every level.
///
/// # Errors
///
/// - [`SnapshotDbError::InvalidQueryFormat`] if a combinator value is not an array or one
///   of its operands is not a document.
/// - [`SnapshotDbError::UnsupportedOperator`] for any other `$`-prefixed key.
pub fn map_filter(filter: &Document) -> SnapshotDbResult<MappedFilter> {
    let mut nodes = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        if key.starts_with('$') {
            match OperatorKind::classify(key) {
                OperatorKind::NoOp => continue,
                OperatorKind::Unsupported => {
                    return Err(SnapshotDbError::UnsupportedOperator(key.clone()));
                },
                OperatorKind::Combinator(op) => {
                    nodes.push(FilterNode::Combinator {
                        op,
                        operands: map_operands(key, value)?,
                    });
                    continue;
                },
            }
        }

        nodes.push(FilterNode::Field {
            target: FieldTarget::map(key),
            condition: Condition::classify(value.clone()),
        });
    }

    Ok(MappedFilter::new(nodes))
}

/// Maps a raw filter value, rejecting anything that is not a document.
pub fn map_filter_value(filter: &Bson) -> SnapshotDbResult<MappedFilter> {
    match filter {
        Bson::Document(document) => map_filter(document),
        other => Err(SnapshotDbError::InvalidQueryFormat(format!(
            "filter must be a document, got {other}"
        ))),
    }
}

fn map_operands(key: &str, value: &Bson) -> SnapshotDbResult<Vec<MappedFilter>> {
    match value {
        Bson::Array(operands) => operands
            .iter()
            .map(map_filter_value)
            .collect(),
        other => Err(SnapshotDbError::InvalidQueryFormat(format!(
            "{key} expects an array of filters, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn prefixes_payload_fields() {
        let mapped = map_filter(&doc! { "x": 1, "a.b": { "$gt": 2 } }).unwrap();

        assert_eq!(mapped.to_document(), doc! { "data.x": 1, "data.a.b": { "$gt": 2 } });
    }

    #[test]
    fn renames_envelope_fields() {
        let mapped = map_filter(&doc! {
            "_id": "test1",
            "_v": 2,
            "_type": "json0",
            "_m.mtime": 1001,
            "_o": null,
        }).unwrap();

        assert_eq!(
            mapped.to_document(),
            doc! { "id": "test1", "v": 2, "type": "json0", "m.mtime": 1001, "o": null },
        );
    }

    #[test]
    fn maps_combinator_operands_recursively() {
        let mapped = map_filter(&doc! {
            "$or": [ { "y": 1 }, { "_id": "test2", "$and": [ { "z": 3 } ] } ],
        }).unwrap();

        assert_eq!(
            mapped.to_document(),
            doc! { "$or": [ { "data.y": 1 }, { "id": "test2", "$and": [ { "data.z": 3 } ] } ] },
        );
    }

    #[test]
    fn classifies_conditions() {
        let mapped = map_filter(&doc! {
            "a": 1,
            "b": null,
            "c": { "$in": [1] },
            "d": [1, 2],
        }).unwrap();
        let conditions = mapped
            .nodes()
            .iter()
            .map(|node| match node {
                FilterNode::Field { condition, .. } => condition.clone(),
                FilterNode::Combinator { .. } => panic!("unexpected combinator"),
            })
            .collect::<Vec<_>>();

        assert!(matches!(conditions[0], Condition::Scalar(_)));
        assert!(matches!(conditions[1], Condition::Null));
        assert!(matches!(conditions[2], Condition::Operators(_)));
        assert!(matches!(conditions[3], Condition::Other(_)));
    }

    #[test]
    fn drops_no_op_directives() {
        let mapped = map_filter(&doc! {
            "x": 1,
            "$comment": "hello",
            "$or": [ { "$hint": "idx", "y": 2 } ],
        }).unwrap();

        assert_eq!(mapped.to_document(), doc! { "data.x": 1, "$or": [ { "data.y": 2 } ] });
    }

    #[test]
    fn rejects_malformed_combinators() {
        assert!(matches!(
            map_filter(&doc! { "$and": { "x": 1 } }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            map_filter(&doc! { "$or": [ 1, 2 ] }),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
        assert!(matches!(
            map_filter_value(&Bson::Array(vec![])),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(matches!(
            map_filter(&doc! { "$where": "this.x == 1" }),
            Err(SnapshotDbError::UnsupportedOperator(op)) if op == "$where",
        ));
        assert!(matches!(
            map_filter(&doc! { "$or": [ { "$mapReduce": [] } ] }),
            Err(SnapshotDbError::UnsupportedOperator(_)),
        ));
    }

    #[test]
    fn detects_explicit_type_constraint() {
        assert!(map_filter(&doc! { "_type": null }).unwrap().constrains_type());
        assert!(!map_filter(&doc! { "_type.x": 1 }).unwrap().constrains_type());
        assert!(!map_filter(&doc! { "$or": [ { "_type": null } ] }).unwrap().constrains_type());
    }
}
