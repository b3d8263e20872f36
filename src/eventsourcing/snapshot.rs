// Copyright 2025 Eventum Contributors.

//! Snapshots of aggregate state
//!
//! A snapshot is a cached materialization of a [`StateAggregate`] at some
//! version. It is purely an optimization: always safe to discard and rebuild
//! from the event store, and never trusted past what the event store can
//! corroborate. Repositories store type-erased [`SnapshotRecord`]s so one
//! backend serves every aggregate type; [`Snapshot`] is the typed view.

use crate::modeling::{AggregateId, NamedAggregate, StateAggregate, StateRoot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Errors that can occur during snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Error from the underlying storage system
    #[error("storage error: {0}")]
    StorageError(String),

    /// Error serializing or deserializing snapshot data
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Type-erased snapshot as persisted by repositories
///
/// Carries every field of the materialized [`StateAggregate`] plus the
/// capture time, with the state itself serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Aggregate the snapshot belongs to
    pub aggregate_id: AggregateId,
    /// Aggregate version the snapshot was taken at
    pub version: u64,
    /// Recorded owner at that version
    pub owner_id: String,
    /// Id of the last applied event
    pub event_id: String,
    /// Operator of the first applied stream
    pub first_operator: String,
    /// Operator of the last applied stream
    pub operator: String,
    /// Creation time of the first applied stream
    pub first_event_time: Option<DateTime<Utc>>,
    /// Creation time of the last applied stream
    pub event_time: Option<DateTime<Utc>>,
    /// Whether the aggregate was deleted at that version
    pub deleted: bool,
    /// When the snapshot was captured
    pub snapshot_time: DateTime<Utc>,
    /// Serialized state root
    pub state: serde_json::Value,
}

/// Typed snapshot of one aggregate's state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Snapshot<S: StateRoot> {
    state_aggregate: StateAggregate<S>,
    snapshot_time: DateTime<Utc>,
}

impl<S: StateRoot> Snapshot<S> {
    /// Capture a snapshot of the given state aggregate
    pub fn new(state_aggregate: StateAggregate<S>, snapshot_time: DateTime<Utc>) -> Self {
        Self {
            state_aggregate,
            snapshot_time,
        }
    }

    /// The snapshotted aggregate's identity
    pub fn aggregate_id(&self) -> &AggregateId {
        self.state_aggregate.aggregate_id()
    }

    /// The version the snapshot was taken at
    pub fn version(&self) -> u64 {
        self.state_aggregate.version()
    }

    /// When the snapshot was captured
    pub fn snapshot_time(&self) -> DateTime<Utc> {
        self.snapshot_time
    }

    /// The materialized state aggregate
    pub fn state_aggregate(&self) -> &StateAggregate<S> {
        &self.state_aggregate
    }

    /// Unwrap into the materialized state aggregate
    pub fn into_state_aggregate(self) -> StateAggregate<S> {
        self.state_aggregate
    }

    /// Erase into a persistable record
    pub fn to_record(&self) -> Result<SnapshotRecord, SnapshotError> {
        let sa = &self.state_aggregate;
        Ok(SnapshotRecord {
            aggregate_id: sa.aggregate_id().clone(),
            version: sa.version(),
            owner_id: sa.owner_id().to_string(),
            event_id: sa.event_id().to_string(),
            first_operator: sa.first_operator().to_string(),
            operator: sa.operator().to_string(),
            first_event_time: sa.first_event_time(),
            event_time: sa.event_time(),
            deleted: sa.deleted(),
            snapshot_time: self.snapshot_time,
            state: serde_json::to_value(sa.state())
                .map_err(|err| SnapshotError::SerializationError(err.to_string()))?,
        })
    }

    /// Rehydrate a typed snapshot from a persisted record
    pub fn from_record(record: SnapshotRecord) -> Result<Self, SnapshotError> {
        let state: S = serde_json::from_value(record.state)
            .map_err(|err| SnapshotError::SerializationError(err.to_string()))?;
        let state_aggregate = StateAggregate::restore(
            record.aggregate_id,
            record.owner_id,
            record.version,
            record.event_id,
            record.first_operator,
            record.operator,
            record.first_event_time,
            record.event_time,
            record.deleted,
            state,
        );
        Ok(Self {
            state_aggregate,
            snapshot_time: record.snapshot_time,
        })
    }
}

/// Storage contract for snapshots
///
/// `save` is an idempotent upsert keyed by aggregate id, last-writer-wins by
/// version: a save at a version lower than the stored one is a silent no-op,
/// so concurrent regeneration can never roll a snapshot back.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Load the stored snapshot of an aggregate, if any
    async fn load(&self, aggregate_id: &AggregateId)
        -> Result<Option<SnapshotRecord>, SnapshotError>;

    /// Upsert a snapshot (last-writer-wins by version)
    async fn save(&self, record: SnapshotRecord) -> Result<(), SnapshotError>;

    /// The stored snapshot version of an aggregate, 0 when absent
    async fn get_version(&self, aggregate_id: &AggregateId) -> Result<u64, SnapshotError>;

    /// Enumerate snapshotted aggregate ids of one aggregate type, ordered by id
    ///
    /// Mirrors [`EventStore::scan_aggregate_id`](crate::eventsourcing::EventStore::scan_aggregate_id)
    /// for maintenance tooling.
    async fn scan_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        after_cursor_id: &str,
        limit: usize,
    ) -> Result<Vec<AggregateId>, SnapshotError>;
}

/// In-memory implementation of [`SnapshotRepository`] for testing
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotRepository {
    records: Arc<RwLock<HashMap<AggregateId, SnapshotRecord>>>,
}

impl InMemorySnapshotRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn load(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<SnapshotRecord>, SnapshotError> {
        let records = self.records.read().await;
        Ok(records.get(aggregate_id).cloned())
    }

    async fn save(&self, record: SnapshotRecord) -> Result<(), SnapshotError> {
        let mut records = self.records.write().await;
        if let Some(stored) = records.get(&record.aggregate_id) {
            if record.version < stored.version {
                debug!(
                    aggregate_id = %record.aggregate_id,
                    stored = stored.version,
                    offered = record.version,
                    "ignoring stale snapshot save"
                );
                return Ok(());
            }
        }
        records.insert(record.aggregate_id.clone(), record);
        Ok(())
    }

    async fn get_version(&self, aggregate_id: &AggregateId) -> Result<u64, SnapshotError> {
        let records = self.records.read().await;
        Ok(records.get(aggregate_id).map(|r| r.version).unwrap_or(0))
    }

    async fn scan_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        after_cursor_id: &str,
        limit: usize,
    ) -> Result<Vec<AggregateId>, SnapshotError> {
        let records = self.records.read().await;
        let mut ids: Vec<AggregateId> = records
            .keys()
            .filter(|id| {
                &id.named_aggregate == named_aggregate && id.id.as_str() > after_cursor_id
            })
            .cloned()
            .collect();
        ids.sort_by(|a, b| a.id.cmp(&b.id));
        ids.truncate(limit);
        Ok(ids)
    }
}

/// Read-through LRU cache over any [`SnapshotRepository`]
///
/// Serves repeated loads of hot aggregates from memory and keeps the cache
/// write-through on save, so a cached entry is never older than the backing
/// store's copy.
pub struct CachingSnapshotRepository<R> {
    inner: R,
    cache: Mutex<LruCache<AggregateId, SnapshotRecord>>,
}

impl<R> CachingSnapshotRepository<R> {
    /// Wrap a repository with a cache of the given capacity
    pub fn new(inner: R, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<R: SnapshotRepository> SnapshotRepository for CachingSnapshotRepository<R> {
    async fn load(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<SnapshotRecord>, SnapshotError> {
        if let Some(record) = self.cache.lock().await.get(aggregate_id) {
            return Ok(Some(record.clone()));
        }
        let loaded = self.inner.load(aggregate_id).await?;
        if let Some(record) = &loaded {
            self.cache
                .lock()
                .await
                .put(aggregate_id.clone(), record.clone());
        }
        Ok(loaded)
    }

    async fn save(&self, record: SnapshotRecord) -> Result<(), SnapshotError> {
        self.inner.save(record.clone()).await?;
        let mut cache = self.cache.lock().await;
        let stale = cache
            .get(&record.aggregate_id)
            .map(|cached| record.version < cached.version)
            .unwrap_or(false);
        if !stale {
            cache.put(record.aggregate_id.clone(), record);
        }
        Ok(())
    }

    async fn get_version(&self, aggregate_id: &AggregateId) -> Result<u64, SnapshotError> {
        if let Some(record) = self.cache.lock().await.get(aggregate_id) {
            return Ok(record.version);
        }
        self.inner.get_version(aggregate_id).await
    }

    async fn scan_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        after_cursor_id: &str,
        limit: usize,
    ) -> Result<Vec<AggregateId>, SnapshotError> {
        self.inner
            .scan_aggregate_id(named_aggregate, after_cursor_id, limit)
            .await
    }
}

/// Policy deciding when to capture a snapshot after a successful commit
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    /// Capture after this many versions since the last snapshot
    pub version_threshold: Option<u64>,
    /// Capture after this much time since the last snapshot
    pub time_interval: Option<Duration>,
    /// Whether the policy is active
    pub enabled: bool,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            version_threshold: Some(100),
            time_interval: Some(Duration::from_secs(3600)),
            enabled: true,
        }
    }
}

impl SnapshotPolicy {
    /// A policy that never snapshots
    pub fn disabled() -> Self {
        Self {
            version_threshold: None,
            time_interval: None,
            enabled: false,
        }
    }

    /// A policy that snapshots every `threshold` versions
    pub fn every_versions(threshold: u64) -> Self {
        Self {
            version_threshold: Some(threshold),
            time_interval: None,
            enabled: true,
        }
    }

    fn should_snapshot(
        &self,
        version: u64,
        last_version: u64,
        last_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(threshold) = self.version_threshold {
            if version.saturating_sub(last_version) >= threshold {
                return true;
            }
        }
        if let Some(interval) = self.time_interval {
            match last_time {
                Some(last) => {
                    let elapsed = now.signed_duration_since(last);
                    if elapsed.to_std().map(|e| e >= interval).unwrap_or(false) {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }
}

/// Applies a [`SnapshotPolicy`] after successful command cycles
///
/// Tracks the last snapshotted version and time per aggregate id; on first
/// contact the stored version is consulted so a restarted process does not
/// immediately re-snapshot everything.
pub struct SnapshotSaver<R> {
    repository: Arc<R>,
    policy: SnapshotPolicy,
    tracked: RwLock<HashMap<AggregateId, (u64, Option<DateTime<Utc>>)>>,
}

impl<R: SnapshotRepository> SnapshotSaver<R> {
    /// Create a saver over a repository with the given policy
    pub fn new(repository: Arc<R>, policy: SnapshotPolicy) -> Self {
        Self {
            repository,
            policy,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    /// Capture a snapshot of the aggregate if the policy says so
    ///
    /// Returns whether a snapshot was written.
    pub async fn handle<S: StateRoot>(
        &self,
        state_aggregate: &StateAggregate<S>,
    ) -> Result<bool, SnapshotError> {
        if !self.policy.enabled {
            return Ok(false);
        }
        let aggregate_id = state_aggregate.aggregate_id().clone();
        let (last_version, last_time) = match self.tracked.read().await.get(&aggregate_id) {
            Some(entry) => *entry,
            None => (self.repository.get_version(&aggregate_id).await?, None),
        };

        let now = Utc::now();
        if !self
            .policy
            .should_snapshot(state_aggregate.version(), last_version, last_time, now)
        {
            return Ok(false);
        }

        let snapshot = Snapshot::new(state_aggregate.clone(), now);
        self.repository.save(snapshot.to_record()?).await?;
        info!(
            aggregate_id = %aggregate_id,
            version = state_aggregate.version(),
            "captured snapshot"
        );
        self.tracked
            .write()
            .await
            .insert(aggregate_id, (state_aggregate.version(), Some(now)));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBody, EventStream};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum TallyEvent {
        Added { amount: u64 },
    }

    impl EventBody for TallyEvent {
        fn event_name(&self) -> &'static str {
            "added"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tally {
        sum: u64,
    }

    impl StateRoot for Tally {
        type Event = TallyEvent;

        fn initialize(_aggregate_id: &AggregateId) -> Self {
            Self { sum: 0 }
        }

        fn on_sourcing(&mut self, event: &Self::Event) {
            match event {
                TallyEvent::Added { amount } => self.sum += amount,
            }
        }
    }

    fn tally_id(id: &str) -> AggregateId {
        NamedAggregate::new("tests", "tally").aggregate_id(id)
    }

    fn tally_at(id: &AggregateId, versions: u64) -> StateAggregate<Tally> {
        let mut aggregate = StateAggregate::<Tally>::uninitialized(id.clone());
        for version in 1..=versions {
            let stream = EventStream::produce(
                id.clone(),
                version,
                format!("cmd-{version}"),
                format!("req-{version}"),
                "",
                vec![TallyEvent::Added { amount: version }],
            )
            .unwrap();
            aggregate.source(&stream).unwrap();
        }
        aggregate
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let id = tally_id("t-1");
        let aggregate = tally_at(&id, 3);
        let snapshot = Snapshot::new(aggregate.clone(), Utc::now());

        let record = snapshot.to_record().unwrap();
        assert_eq!(record.version, 3);

        let restored = Snapshot::<Tally>::from_record(record).unwrap();
        assert_eq!(restored.version(), 3);
        assert_eq!(restored.state_aggregate().state(), aggregate.state());
        assert_eq!(
            restored.state_aggregate().event_id(),
            aggregate.event_id()
        );
    }

    #[tokio::test]
    async fn test_repository_save_and_load() {
        let repo = InMemorySnapshotRepository::new();
        let id = tally_id("t-1");
        assert!(repo.load(&id).await.unwrap().is_none());
        assert_eq!(repo.get_version(&id).await.unwrap(), 0);

        let snapshot = Snapshot::new(tally_at(&id, 2), Utc::now());
        repo.save(snapshot.to_record().unwrap()).await.unwrap();

        assert_eq!(repo.get_version(&id).await.unwrap(), 2);
        let loaded = repo.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn test_stale_save_is_ignored() {
        let repo = InMemorySnapshotRepository::new();
        let id = tally_id("t-1");

        let newer = Snapshot::new(tally_at(&id, 5), Utc::now());
        repo.save(newer.to_record().unwrap()).await.unwrap();

        let older = Snapshot::new(tally_at(&id, 2), Utc::now());
        repo.save(older.to_record().unwrap()).await.unwrap();

        assert_eq!(repo.get_version(&id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_caching_repository_serves_hits_from_memory() {
        let inner = InMemorySnapshotRepository::new();
        let id = tally_id("t-1");
        let snapshot = Snapshot::new(tally_at(&id, 4), Utc::now());
        inner.save(snapshot.to_record().unwrap()).await.unwrap();

        let caching =
            CachingSnapshotRepository::new(inner.clone(), NonZeroUsize::new(8).unwrap());
        let first = caching.load(&id).await.unwrap().unwrap();
        assert_eq!(first.version, 4);
        assert_eq!(caching.get_version(&id).await.unwrap(), 4);

        // Write-through keeps the cache current with the backing store.
        let newer = Snapshot::new(tally_at(&id, 6), Utc::now());
        caching.save(newer.to_record().unwrap()).await.unwrap();
        assert_eq!(caching.load(&id).await.unwrap().unwrap().version, 6);
        assert_eq!(inner.get_version(&id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_snapshot_saver_applies_version_threshold() {
        let repo = Arc::new(InMemorySnapshotRepository::new());
        let saver = SnapshotSaver::new(repo.clone(), SnapshotPolicy::every_versions(3));
        let id = tally_id("t-1");

        assert!(!saver.handle(&tally_at(&id, 1)).await.unwrap());
        assert!(!saver.handle(&tally_at(&id, 2)).await.unwrap());
        assert!(saver.handle(&tally_at(&id, 3)).await.unwrap());
        assert_eq!(repo.get_version(&id).await.unwrap(), 3);

        assert!(!saver.handle(&tally_at(&id, 4)).await.unwrap());
        assert!(saver.handle(&tally_at(&id, 6)).await.unwrap());
        assert_eq!(repo.get_version(&id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_disabled_policy_never_snapshots() {
        let repo = Arc::new(InMemorySnapshotRepository::new());
        let saver = SnapshotSaver::new(repo.clone(), SnapshotPolicy::disabled());
        let id = tally_id("t-1");
        assert!(!saver.handle(&tally_at(&id, 50)).await.unwrap());
        assert_eq!(repo.get_version(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_aggregate_id_pages_in_order() {
        let repo = InMemorySnapshotRepository::new();
        for n in ["t-1", "t-3", "t-2"] {
            let id = tally_id(n);
            let snapshot = Snapshot::new(tally_at(&id, 1), Utc::now());
            repo.save(snapshot.to_record().unwrap()).await.unwrap();
        }
        let named = NamedAggregate::new("tests", "tally");
        let page = repo.scan_aggregate_id(&named, "", 2).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["t-1", "t-2"]);
        let rest = repo.scan_aggregate_id(&named, "t-2", 10).await.unwrap();
        let ids: Vec<&str> = rest.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["t-3"]);
    }
}
