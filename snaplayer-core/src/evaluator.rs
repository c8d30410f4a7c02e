//! Collaborator traits for predicate matching and aggregation.
//!
//! The pipeline consumes both capabilities as black boxes. Implementations decide which
//! MongoDB operators they support; the pipeline only guarantees that filters reaching
//! [`PredicateEvaluator::test`] address the snapshot document view.

use bson::Document;
use std::{fmt::Debug, sync::Arc};

use crate::error::SnapshotDbResult;

/// MongoDB-operator-compatible boolean matching of a filter against a document.
pub trait PredicateEvaluator: Send + Sync + Debug {
    /// Returns `true` if `document` satisfies `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error for operators or operand shapes the evaluator rejects. Errors are
    /// propagated to the caller unchanged.
    fn test(&self, document: &Document, filter: &Document) -> SnapshotDbResult<bool>;
}

/// Runs an aggregation pipeline over a set of documents.
pub trait AggregationEvaluator: Send + Sync + Debug {
    /// Runs `pipeline` over `documents` and returns the output records.
    fn run(&self, documents: Vec<Document>, pipeline: &[Document]) -> SnapshotDbResult<Vec<Document>>;
}

impl<E: PredicateEvaluator + ?Sized> PredicateEvaluator for &E {
    fn test(&self, document: &Document, filter: &Document) -> SnapshotDbResult<bool> {
        (**self).test(document, filter)
    }
}

impl<E: PredicateEvaluator + ?Sized> PredicateEvaluator for Arc<E> {
    fn test(&self, document: &Document, filter: &Document) -> SnapshotDbResult<bool> {
        (**self).test(document, filter)
    }
}

impl<E: AggregationEvaluator + ?Sized> AggregationEvaluator for &E {
    fn run(&self, documents: Vec<Document>, pipeline: &[Document]) -> SnapshotDbResult<Vec<Document>> {
        (**self).run(documents, pipeline)
    }
}

impl<E: AggregationEvaluator + ?Sized> AggregationEvaluator for Arc<E> {
    fn run(&self, documents: Vec<Document>, pipeline: &[Document]) -> SnapshotDbResult<Vec<Document>> {
        (**self).run(documents, pipeline)
    }
}
