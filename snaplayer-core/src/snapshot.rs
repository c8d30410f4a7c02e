//! The snapshot data model and the document views the query pipeline evaluates.
//!
//! A [`Snapshot`] is the unit of stored state: a versioned payload plus its envelope
//! (id, version, type, metadata). Deleting a snapshot does not remove it; it becomes a
//! *tombstone* with a null type and no payload, so that a later re-creation can continue
//! the version sequence.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, to_value};

use crate::error::SnapshotDbResult;

/// Internal name of the identity envelope field.
pub const ID_FIELD: &str = "id";
/// Internal name of the version envelope field.
pub const VERSION_FIELD: &str = "v";
/// Internal name of the type envelope field.
pub const TYPE_FIELD: &str = "type";
/// Internal name of the payload namespace.
pub const DATA_FIELD: &str = "data";
/// Internal name of the metadata envelope field.
pub const METADATA_FIELD: &str = "m";
/// Internal name of the operation-log envelope field.
pub const OP_LINK_FIELD: &str = "o";

/// A versioned record stored under a collection/id.
///
/// # Invariants
///
/// - A live snapshot has `doc_type = Some(..)` and `data = Some(..)`.
/// - A tombstone has `doc_type = None` and `data = None`, but keeps `id`, `version`
///   and `metadata`.
///
/// # Example
///
/// ```ignore
/// use snaplayer::snapshot::Snapshot;
/// use bson::{Bson, doc};
///
/// let live = Snapshot::new("test1", 1, "json0", Bson::Document(doc! { "x": 1 }));
/// assert!(!live.is_tombstone());
///
/// let deleted = Snapshot::tombstone("test1", 2, None);
/// assert!(deleted.is_tombstone());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier within the collection.
    pub id: String,
    /// Monotonic version, incremented on every write.
    #[serde(rename = "v")]
    pub version: u64,
    /// Editing type of the payload, or `None` once deleted.
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    /// The application payload, absent once deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bson>,
    /// Timestamps and annotations, if any.
    #[serde(rename = "m", default)]
    pub metadata: Option<Document>,
}

impl Snapshot {
    /// Creates a live snapshot without metadata.
    pub fn new(
        id: impl Into<String>,
        version: u64,
        doc_type: impl Into<String>,
        data: impl Into<Bson>,
    ) -> Self {
        Snapshot {
            id: id.into(),
            version,
            doc_type: Some(doc_type.into()),
            data: Some(data.into()),
            metadata: None,
        }
    }

    /// Creates a tombstone for a deleted record.
    pub fn tombstone(id: impl Into<String>, version: u64, metadata: Option<Document>) -> Self {
        Snapshot {
            id: id.into(),
            version,
            doc_type: None,
            data: None,
            metadata,
        }
    }

    /// Creates the placeholder returned for an id that was never written.
    pub fn empty(id: impl Into<String>) -> Self {
        Snapshot::tombstone(id, 0, None)
    }

    /// Attaches metadata to this snapshot.
    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns `true` if this snapshot carries no payload.
    pub fn is_tombstone(&self) -> bool {
        self.data.is_none()
    }

    /// Clears the metadata attribute.
    pub fn strip_metadata(&mut self) {
        self.metadata = None;
    }

    /// Builds the document that mapped filters are tested against.
    ///
    /// Envelope fields use their internal names and the payload sits under `data`.
    /// Tombstones have no `data` key at all and a null `type`, which is exactly the
    /// shape the tombstone guard reasons about.
    pub fn document_view(&self) -> Document {
        let mut view = doc! {
            ID_FIELD: self.id.as_str(),
            VERSION_FIELD: self.version_bson(),
            TYPE_FIELD: self.doc_type.as_deref().map_or(Bson::Null, Bson::from),
        };

        if let Some(data) = &self.data {
            view.insert(DATA_FIELD, data.clone());
        }

        view.insert(
            METADATA_FIELD,
            self.metadata
                .clone()
                .map_or(Bson::Null, Bson::Document),
        );

        view
    }

    /// Builds the flat document handed to aggregation pipelines.
    ///
    /// Payload fields are promoted to the top level and envelope fields use their
    /// external, underscore-prefixed names. A payload that is not a document is kept
    /// under `_data`.
    pub fn flat_document(&self) -> Document {
        let mut flat = match &self.data {
            Some(Bson::Document(payload)) => payload.clone(),
            Some(other) => doc! { "_data": other.clone() },
            None => Document::new(),
        };

        flat.insert("_id", self.id.as_str());
        flat.insert("_v", self.version_bson());
        flat.insert(
            "_type",
            self.doc_type.as_deref().map_or(Bson::Null, Bson::from),
        );

        if let Some(metadata) = &self.metadata {
            flat.insert("_m", metadata.clone());
        }

        flat
    }

    /// Converts this snapshot to a JSON value for transport layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn to_json(&self) -> SnapshotDbResult<Value> {
        Ok(to_value(self)?)
    }

    fn version_bson(&self) -> Bson {
        Bson::Int64(i64::try_from(self.version).unwrap_or(i64::MAX))
    }
}

/// Resolves a dotted path inside a document without array expansion.
///
/// Numeric segments index into arrays. Returns `None` when any segment is missing.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_view_omits_data_for_tombstones() {
        let view = Snapshot::tombstone("a", 3, Some(doc! { "mtime": 5 })).document_view();

        assert_eq!(view.get("id"), Some(&Bson::String("a".into())));
        assert_eq!(view.get("v"), Some(&Bson::Int64(3)));
        assert_eq!(view.get("type"), Some(&Bson::Null));
        assert!(view.get("data").is_none());
        assert_eq!(view.get("m"), Some(&Bson::Document(doc! { "mtime": 5 })));
    }

    #[test]
    fn flat_document_promotes_payload() {
        let snapshot = Snapshot::new("a", 1, "json0", doc! { "x": 1 })
            .with_metadata(doc! { "ctime": 1 });
        let flat = snapshot.flat_document();

        assert_eq!(flat.get_i32("x").ok(), Some(1));
        assert_eq!(flat.get_str("_id").ok(), Some("a"));
        assert_eq!(flat.get_str("_type").ok(), Some("json0"));
        assert!(flat.get_document("_m").is_ok());
    }

    #[test]
    fn flat_document_wraps_scalar_payload() {
        let flat = Snapshot::new("a", 1, "text", "hello").flat_document();
        assert_eq!(flat.get_str("_data").ok(), Some("hello"));
    }

    #[test]
    fn lookup_path_walks_documents_and_indices() {
        let document = doc! { "a": { "b": [ { "c": 1 }, { "c": 2 } ] } };

        assert_eq!(lookup_path(&document, "a.b.1.c"), Some(&Bson::Int32(2)));
        assert_eq!(lookup_path(&document, "a.b.c"), None);
        assert_eq!(lookup_path(&document, "missing"), None);
    }

    #[test]
    fn serializes_with_envelope_names() {
        let json = Snapshot::new("a", 1, "json0", doc! { "x": 1 })
            .to_json()
            .unwrap();

        assert_eq!(json["v"], 1);
        assert_eq!(json["type"], "json0");
        assert!(json["m"].is_null());
    }
}
