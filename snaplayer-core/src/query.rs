//! Query types and raw-query construction.
//!
//! Raw queries are plain BSON documents in MongoDB style: field conditions mixed with
//! `$`-prefixed control directives. This module names those directives, defines the
//! [`ParsedQuery`] shape the normalizer produces, and offers [`RawQueryBuilder`] for
//! composing raw queries in code.
//!
//! # Query Building
//!
//! ```ignore
//! use snaplayer::query::{RawQuery, SortDirection};
//!
//! let query = RawQuery::builder()
//!     .filter("status", "active")
//!     .sort("created_at", SortDirection::Desc)
//!     .skip(10)
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document};
use serde_json::Value;

use crate::error::{SnapshotDbError, SnapshotDbResult};

/// Aggregation pipeline directive.
pub const AGGREGATE: &str = "$aggregate";
/// Sort directive.
pub const SORT: &str = "$sort";
/// Deprecated name of the sort directive.
pub const LEGACY_SORT: &str = "$orderby";
/// Skip directive.
pub const SKIP: &str = "$skip";
/// Limit directive.
pub const LIMIT: &str = "$limit";
/// Count directive.
pub const COUNT: &str = "$count";

/// Directives accepted for compatibility that have no effect in memory: free-text
/// annotations, index hints and server time limits. Stripped at every nesting level.
pub const NO_OP_DIRECTIVES: [&str; 3] = ["$comment", "$hint", "$maxTimeMS"];

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order, written as `1`.
    Asc,
    /// Descending order, written as `-1`.
    Desc,
}

impl SortDirection {
    /// Parses a direction value for `field`.
    ///
    /// Only `1` and `-1` are accepted, as 32/64-bit integers or integral doubles.
    pub fn parse(field: &str, value: &Bson) -> SnapshotDbResult<Self> {
        let direction = match value {
            Bson::Int32(value) => Some(*value as i64),
            Bson::Int64(value) => Some(*value),
            Bson::Double(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        };

        match direction {
            Some(1) => Ok(SortDirection::Asc),
            Some(-1) => Ok(SortDirection::Desc),
            _ => Err(SnapshotDbError::InvalidSortDirection(field.to_string(), value.to_string())),
        }
    }

    /// Returns the multiplier applied to an ascending comparison.
    pub fn sign(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl From<SortDirection> for Bson {
    fn from(direction: SortDirection) -> Self {
        Bson::Int32(direction.sign())
    }
}

/// One key of a sort specification, using the caller's field name.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// The normalizer's output: a filter body and the extracted control directives.
///
/// When `aggregate` is present every other directive is ignored and the filter is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Filter conditions, still using the caller's field names.
    pub filter: Document,
    /// Sort keys in priority order.
    pub sort: Option<Vec<SortKey>>,
    /// Number of leading matches to drop.
    pub skip: Option<usize>,
    /// Maximum number of matches to return. `None` is unbounded.
    pub limit: Option<usize>,
    /// Whether only the match count is requested.
    pub count: bool,
    /// Aggregation stages, if this is an aggregate query.
    pub aggregate: Option<Vec<Document>>,
}

/// Entry points for building raw queries.
pub struct RawQuery;

impl RawQuery {
    /// Creates a new raw query builder.
    pub fn builder() -> RawQueryBuilder {
        RawQueryBuilder::new()
    }

    /// Converts a JSON object into a raw query document.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotDbError::InvalidQueryFormat`] if `value` is not a JSON object.
    pub fn from_json(value: Value) -> SnapshotDbResult<Document> {
        match bson::ser::serialize_to_bson(&value)? {
            Bson::Document(document) => Ok(document),
            other => Err(SnapshotDbError::InvalidQueryFormat(format!(
                "query must be an object, got {other}"
            ))),
        }
    }

    /// Returns a copy of `query` with a `$sort` built from `(field, direction)` pairs.
    ///
    /// An empty pair list returns the query unchanged. The input is never mutated.
    pub fn sorted(query: &Document, order: &[(&str, SortDirection)]) -> Document {
        let mut sorted = query.clone();

        if !order.is_empty() {
            sorted.insert(
                SORT,
                order
                    .iter()
                    .map(|(field, direction)| (field.to_string(), Bson::from(*direction)))
                    .collect::<Document>(),
            );
        }

        sorted
    }
}

/// Fluent builder for raw query documents.
#[derive(Debug, Clone, Default)]
pub struct RawQueryBuilder {
    query: Document,
    sort: Document,
    legacy_sort: bool,
}

impl RawQueryBuilder {
    /// Creates a new empty builder.
    pub fn new() -> Self {
        RawQueryBuilder::default()
    }

    /// Adds a filter condition on `field`.
    pub fn filter(mut self, field: impl Into<String>, condition: impl Into<Bson>) -> Self {
        self.query.insert(field.into(), condition.into());
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.insert(field.into(), direction);
        self
    }

    /// Emits the sort under the deprecated `$orderby` name.
    pub fn legacy_sort(mut self) -> Self {
        self.legacy_sort = true;
        self
    }

    /// Sets the number of matches to skip.
    pub fn skip(mut self, skip: u32) -> Self {
        self.query.insert(SKIP, skip as i64);
        self
    }

    /// Sets the maximum number of matches to return.
    pub fn limit(mut self, limit: u32) -> Self {
        self.query.insert(LIMIT, limit as i64);
        self
    }

    /// Requests only the number of matches.
    pub fn count(mut self) -> Self {
        self.query.insert(COUNT, true);
        self
    }

    /// Replaces the query with an aggregation pipeline.
    pub fn aggregate(mut self, stages: impl IntoIterator<Item = Document>) -> Self {
        self.query.insert(
            AGGREGATE,
            stages
                .into_iter()
                .map(Bson::Document)
                .collect::<Vec<_>>(),
        );
        self
    }

    /// Builds the raw query document.
    pub fn build(mut self) -> Document {
        if !self.sort.is_empty() {
            let key = if self.legacy_sort { LEGACY_SORT } else { SORT };
            self.query.insert(key, self.sort);
        }

        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_sort_directions() {
        assert_eq!(SortDirection::parse("x", &Bson::Int32(1)).unwrap(), SortDirection::Asc);
        assert_eq!(SortDirection::parse("x", &Bson::Int64(-1)).unwrap(), SortDirection::Desc);
        assert_eq!(SortDirection::parse("x", &Bson::Double(-1.0)).unwrap(), SortDirection::Desc);
        assert!(matches!(
            SortDirection::parse("x", &Bson::Int32(2)),
            Err(SnapshotDbError::InvalidSortDirection(..)),
        ));
        assert!(matches!(
            SortDirection::parse("x", &Bson::String("asc".into())),
            Err(SnapshotDbError::InvalidSortDirection(..)),
        ));
    }

    #[test]
    fn sorted_adds_sort_without_mutating_input() {
        let query = doc! { "foo": 2 };

        assert_eq!(RawQuery::sorted(&query, &[]), doc! { "foo": 2 });
        assert_eq!(
            RawQuery::sorted(&query, &[("foo", SortDirection::Asc), ("bar", SortDirection::Desc)]),
            doc! { "foo": 2, "$sort": { "foo": 1, "bar": -1 } },
        );
        assert_eq!(query, doc! { "foo": 2 });
    }

    #[test]
    fn builder_composes_directives() {
        let query = RawQuery::builder()
            .filter("y", 2)
            .sort("x", SortDirection::Asc)
            .skip(1)
            .limit(1)
            .build();

        assert_eq!(
            query,
            doc! { "y": 2, "$skip": 1_i64, "$limit": 1_i64, "$sort": { "x": 1 } },
        );
    }

    #[test]
    fn builder_emits_legacy_sort() {
        let query = RawQuery::builder()
            .sort("x", SortDirection::Desc)
            .legacy_sort()
            .build();

        assert_eq!(query, doc! { "$orderby": { "x": -1 } });
    }

    #[test]
    fn from_json_requires_object() {
        let query = RawQuery::from_json(serde_json::json!({ "x": 1, "$count": true })).unwrap();
        assert_eq!(query.get_bool("$count").ok(), Some(true));

        assert!(matches!(
            RawQuery::from_json(serde_json::json!([1, 2])),
            Err(SnapshotDbError::InvalidQueryFormat(_)),
        ));
    }
}
