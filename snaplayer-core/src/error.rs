//! Error types and result types for snapshot query operations.
//!
//! Every fallible operation in this workspace returns [`SnapshotDbResult<T>`]. Errors are
//! never retried or swallowed internally; they surface to the caller through the same
//! result channel as a successful query.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while translating or executing a query.
#[derive(Error, Debug)]
pub enum SnapshotDbError {
    /// The query (or one of its sub-filters) is not a well-formed key-value mapping,
    /// or a directive carries a value of the wrong shape.
    #[error("Invalid query format: {0}")]
    InvalidQueryFormat(String),
    /// A `$`-prefixed key that the pipeline does not implement.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// A sort direction other than ascending (`1`) or descending (`-1`).
    #[error("Invalid sort direction for field {0}: {1}")]
    InvalidSortDirection(String, String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The predicate evaluator failed while testing a document.
    #[error("Predicate error: {0}")]
    Predicate(String),
    /// The aggregation evaluator failed while running a pipeline.
    #[error("Aggregation error: {0}")]
    Aggregation(String),
    /// A live snapshot with the given id already exists.
    /// The first argument is the snapshot id, the second is the collection name.
    #[error("Snapshot {0} already exists in collection {1}")]
    SnapshotAlreadyExists(String, String),
    /// No live snapshot with the given id exists.
    /// The first argument is the snapshot id, the second is the collection name.
    #[error("Snapshot not found {0} in collection {1}")]
    SnapshotNotFound(String, String),
    /// Error during store initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for snapshot query operations.
pub type SnapshotDbResult<T> = Result<T, SnapshotDbError>;

impl From<BsonError> for SnapshotDbError {
    fn from(err: BsonError) -> Self {
        SnapshotDbError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for SnapshotDbError {
    fn from(err: SerdeJsonError) -> Self {
        SnapshotDbError::Serialization(err.to_string())
    }
}
