//! In-memory snapshot storage.
//!
//! This module provides the storage engine the query engine reads from. Snapshots are kept
//! per collection in id order behind an async-safe read-write lock. Deleting a snapshot
//! leaves a tombstone in place so that re-creating the id continues its version sequence.

use std::{collections::{BTreeMap, HashMap}, fmt, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use chrono::Utc;

use snaplayer_core::{
    backend::{SnapshotStore, SnapshotStoreBuilder},
    error::{SnapshotDbError, SnapshotDbResult},
    snapshot::Snapshot,
};

type CollectionMap = BTreeMap<String, Snapshot>;
type StoreMap = HashMap<String, CollectionMap>;

/// Source of the epoch-millisecond timestamps written into snapshot metadata.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Metadata key holding the creation time.
pub const CTIME: &str = "ctime";
/// Metadata key holding the last modification time.
pub const MTIME: &str = "mtime";


/// Thread-safe in-memory snapshot store.
///
/// `InMemorySnapshotStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same data. Reads hand out owned copies; nothing a query does to its
/// snapshots is visible to other readers.
///
/// # Writing
///
/// [`commit`](Self::commit) stores a caller-built snapshot under optimistic concurrency.
/// [`create`](Self::create), [`update`](Self::update) and [`delete`](Self::delete) compute
/// the next version themselves and maintain `ctime`/`mtime` metadata.
///
/// # Example
///
/// ```ignore
/// use snaplayer_memory::InMemorySnapshotStore;
/// use bson::doc;
///
/// let store = InMemorySnapshotStore::new();
/// store.create("items", "a", "json0", doc! { "x": 1 }).await?;
/// store.delete("items", "a").await?;
///
/// let snapshot = store.get_snapshot("items", "a", true).await?;
/// assert!(snapshot.is_tombstone());
/// assert_eq!(snapshot.version, 2);
/// ```
#[derive(Clone)]
pub struct InMemorySnapshotStore {
    /// collection_name -> (snapshot_id -> snapshot)
    store: Arc<RwLock<StoreMap>>,
    clock: Clock,
}

impl fmt::Debug for InMemorySnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySnapshotStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySnapshotStore {
    /// Creates a new empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Utc::now().timestamp_millis()))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            clock,
        }
    }

    /// Creates a builder for constructing an `InMemorySnapshotStore` with custom options.
    pub fn builder() -> InMemorySnapshotStoreBuilder {
        InMemorySnapshotStoreBuilder::default()
    }

    /// Stores `snapshot` if its version directly follows the stored one.
    ///
    /// A never-written id counts as version 0. Returns `false` without writing on a
    /// version conflict. Metadata is stored as given.
    pub async fn commit(&self, collection: &str, snapshot: Snapshot) -> SnapshotDbResult<bool> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let current = collection_map
            .get(&snapshot.id)
            .map_or(0, |existing| existing.version);

        if snapshot.version != current + 1 {
            tracing::debug!(
                collection,
                id = %snapshot.id,
                current,
                attempted = snapshot.version,
                "rejected snapshot commit on version conflict"
            );
            return Ok(false);
        }

        collection_map.insert(snapshot.id.clone(), snapshot);

        Ok(true)
    }

    /// Creates a live snapshot, or revives a tombstone at its next version.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotDbError::SnapshotAlreadyExists`] if `id` is live.
    pub async fn create(
        &self,
        collection: &str,
        id: &str,
        doc_type: &str,
        data: impl Into<Bson>,
    ) -> SnapshotDbResult<Snapshot> {
        let now = (self.clock)();
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let (version, metadata) = match collection_map.get(id) {
            Some(existing) if !existing.is_tombstone() => {
                return Err(SnapshotDbError::SnapshotAlreadyExists(id.to_string(), collection.to_string()));
            },
            Some(tombstone) => (tombstone.version + 1, touch(tombstone.metadata.clone(), now)),
            None => (1, touch(None, now)),
        };

        let snapshot = Snapshot::new(id, version, doc_type, data).with_metadata(metadata);
        collection_map.insert(id.to_string(), snapshot.clone());

        Ok(snapshot)
    }

    /// Replaces the payload of a live snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotDbError::SnapshotNotFound`] if `id` is not live.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        data: impl Into<Bson>,
    ) -> SnapshotDbResult<Snapshot> {
        let now = (self.clock)();
        let mut store = self.store.write().await;
        let snapshot = live_snapshot_mut(&mut store, collection, id)?;

        snapshot.version += 1;
        snapshot.data = Some(data.into());
        snapshot.metadata = Some(touch(snapshot.metadata.take(), now));

        Ok(snapshot.clone())
    }

    /// Turns a live snapshot into a tombstone.
    ///
    /// The version is incremented and the metadata kept, with `mtime` refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotDbError::SnapshotNotFound`] if `id` is not live.
    pub async fn delete(&self, collection: &str, id: &str) -> SnapshotDbResult<Snapshot> {
        let now = (self.clock)();
        let mut store = self.store.write().await;
        let snapshot = live_snapshot_mut(&mut store, collection, id)?;

        *snapshot = Snapshot::tombstone(
            id,
            snapshot.version + 1,
            Some(touch(snapshot.metadata.take(), now)),
        );

        Ok(snapshot.clone())
    }
}

fn live_snapshot_mut<'a>(
    store: &'a mut StoreMap,
    collection: &str,
    id: &str,
) -> SnapshotDbResult<&'a mut Snapshot> {
    store
        .get_mut(collection)
        .and_then(|collection_map| collection_map.get_mut(id))
        .filter(|snapshot| !snapshot.is_tombstone())
        .ok_or_else(|| SnapshotDbError::SnapshotNotFound(id.to_string(), collection.to_string()))
}

/// Sets `mtime` to `now`, and `ctime` too if it was never set.
fn touch(metadata: Option<Document>, now: i64) -> Document {
    let mut metadata = metadata.unwrap_or_default();

    if !metadata.contains_key(CTIME) {
        metadata.insert(CTIME, now);
    }
    metadata.insert(MTIME, now);

    metadata
}


#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_snapshot(
        &self,
        collection: &str,
        id: &str,
        include_metadata: bool,
    ) -> SnapshotDbResult<Snapshot> {
        let store = self.store.read().await;
        let mut snapshot = store
            .get(collection)
            .and_then(|collection_map| collection_map.get(id))
            .cloned()
            .unwrap_or_else(|| Snapshot::empty(id));

        if !include_metadata {
            snapshot.strip_metadata();
        }

        Ok(snapshot)
    }

    async fn get_all_snapshots(&self, collection: &str) -> SnapshotDbResult<Vec<Snapshot>> {
        let store = self.store.read().await;

        Ok(
            store
                .get(collection)
                .map(|collection_map| {
                    collection_map
                        .values()
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        )
    }

    async fn list_collections(&self) -> SnapshotDbResult<Vec<String>> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}


/// Builder for constructing [`InMemorySnapshotStore`] instances.
///
/// # Example
///
/// ```ignore
/// use snaplayer_memory::InMemorySnapshotStore;
/// use snaplayer_core::backend::SnapshotStoreBuilder;
///
/// let store = InMemorySnapshotStore::builder()
///     .with_collection("users")
///     .with_clock(|| 1_000_000)
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct InMemorySnapshotStoreBuilder {
    collections: Vec<String>,
    clock: Option<Clock>,
}

impl InMemorySnapshotStoreBuilder {
    /// Pre-creates an empty collection.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }

    /// Replaces the system clock used for `ctime`/`mtime` metadata.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }
}

#[async_trait]
impl SnapshotStoreBuilder for InMemorySnapshotStoreBuilder {
    type Store = InMemorySnapshotStore;

    async fn build(self) -> SnapshotDbResult<Self::Store> {
        let store = match self.clock {
            Some(clock) => InMemorySnapshotStore::with_clock(clock),
            None => InMemorySnapshotStore::new(),
        };

        {
            let mut collections = store.store.write().await;
            for name in self.collections {
                collections.entry(name).or_default();
            }
        }

        Ok(store)
    }
}
