//! Storage backend abstraction for snapshot collections.
//!
//! The query pipeline never touches storage directly. It asks a [`SnapshotStore`] for a
//! point-in-time enumeration of a collection, or for a single snapshot when polling,
//! and works on the owned copies it gets back.
//!
//! # Traits
//!
//! - [`SnapshotStore`]: read access to stored snapshots
//! - [`SnapshotStoreBuilder`]: factory trait for creating store instances

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{error::SnapshotDbResult, snapshot::Snapshot};

/// Read interface of a snapshot storage engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; many queries may read the same collection
/// concurrently. Each call must return a consistent view of the collection, and the
/// returned snapshots belong to the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync + Debug {
    /// Fetches one snapshot.
    ///
    /// An id that was never written yields [`Snapshot::empty`], not an error. Metadata is
    /// cleared unless `include_metadata` is set.
    async fn get_snapshot(
        &self,
        collection: &str,
        id: &str,
        include_metadata: bool,
    ) -> SnapshotDbResult<Snapshot>;

    /// Fetches every snapshot of a collection, tombstones and metadata included.
    ///
    /// An unknown collection yields an empty list.
    async fn get_all_snapshots(&self, collection: &str) -> SnapshotDbResult<Vec<Snapshot>>;

    /// Lists the names of all known collections.
    async fn list_collections(&self) -> SnapshotDbResult<Vec<String>>;

    /// Releases any resources held by the store.
    async fn shutdown(self) -> SnapshotDbResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<S> SnapshotStore for &S
where
    S: SnapshotStore,
{
    async fn get_snapshot(
        &self,
        collection: &str,
        id: &str,
        include_metadata: bool,
    ) -> SnapshotDbResult<Snapshot> {
        (*self)
            .get_snapshot(collection, id, include_metadata)
            .await
    }

    async fn get_all_snapshots(&self, collection: &str) -> SnapshotDbResult<Vec<Snapshot>> {
        (*self)
            .get_all_snapshots(collection)
            .await
    }

    async fn list_collections(&self) -> SnapshotDbResult<Vec<String>> {
        (*self).list_collections().await
    }
}

#[async_trait]
impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore,
{
    async fn get_snapshot(
        &self,
        collection: &str,
        id: &str,
        include_metadata: bool,
    ) -> SnapshotDbResult<Snapshot> {
        (**self)
            .get_snapshot(collection, id, include_metadata)
            .await
    }

    async fn get_all_snapshots(&self, collection: &str) -> SnapshotDbResult<Vec<Snapshot>> {
        (**self)
            .get_all_snapshots(collection)
            .await
    }

    async fn list_collections(&self) -> SnapshotDbResult<Vec<String>> {
        (**self).list_collections().await
    }
}

/// Factory trait for creating snapshot store instances.
///
/// # Example
///
/// ```ignore
/// use snaplayer::{backend::SnapshotStoreBuilder, memory::InMemorySnapshotStore};
///
/// let store = InMemorySnapshotStore::builder()
///     .with_collection("users")
///     .build()
///     .await?;
/// ```
#[async_trait]
pub trait SnapshotStoreBuilder: Send {
    /// The concrete store type this builder produces.
    type Store: SnapshotStore;

    /// Builds and returns a new store instance.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    async fn build(self) -> SnapshotDbResult<Self::Store>;
}
