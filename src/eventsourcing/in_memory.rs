// Copyright 2025 Eventum Contributors.

//! In-memory event store for testing and local development

use crate::events::EventStream;
use crate::eventsourcing::event_store::{check_version_range, EventStore, EventStoreError};
use crate::modeling::{AggregateId, NamedAggregate, INITIAL_VERSION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory implementation of [`EventStore`]
///
/// Streams are held per aggregate id behind a single `RwLock`, so the
/// version and request-id checks and the insert happen atomically under the
/// write lock. Contents are lost when the store is dropped; it exists for
/// tests and local development, durable backends implement the same trait.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<EventStream>>,
    cursors: HashMap<NamedAggregate, String>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream: &EventStream) -> Result<(), EventStoreError> {
        debug!(aggregate_id = %stream.aggregate_id, version = stream.version, "append event stream");
        stream
            .validate()
            .map_err(|err| EventStoreError::InvalidStream(err.to_string()))?;

        let mut inner = self.inner.write().await;
        let aggregate_streams = inner.streams.get(&stream.aggregate_id);

        let stored_tail_version = aggregate_streams
            .and_then(|streams| streams.last())
            .map(|s| s.version)
            .unwrap_or(0);
        if stream.version != stored_tail_version + 1 {
            // A rejected creation means the aggregate id is already taken.
            if stream.version == INITIAL_VERSION {
                return Err(EventStoreError::DuplicateAggregateId {
                    aggregate_id: Box::new(stream.aggregate_id.clone()),
                });
            }
            return Err(EventStoreError::EventVersionConflict {
                aggregate_id: Box::new(stream.aggregate_id.clone()),
                version: stream.version,
            });
        }

        let request_repeated = aggregate_streams
            .map(|streams| streams.iter().any(|s| s.request_id == stream.request_id))
            .unwrap_or(false);
        if request_repeated {
            return Err(EventStoreError::DuplicateRequestId {
                aggregate_id: Box::new(stream.aggregate_id.clone()),
                request_id: stream.request_id.clone(),
            });
        }

        inner
            .streams
            .entry(stream.aggregate_id.clone())
            .or_default()
            .push(stream.clone());
        Ok(())
    }

    async fn load(
        &self,
        aggregate_id: &AggregateId,
        head_version: u64,
        tail_version: u64,
    ) -> Result<Vec<EventStream>, EventStoreError> {
        check_version_range(aggregate_id, head_version, tail_version)?;
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(aggregate_id)
            .map(|streams| {
                streams
                    .iter()
                    .filter(|s| s.version >= head_version && s.version <= tail_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_by_event_time(
        &self,
        aggregate_id: &AggregateId,
        head_event_time: DateTime<Utc>,
        tail_event_time: DateTime<Utc>,
    ) -> Result<Vec<EventStream>, EventStoreError> {
        if tail_event_time < head_event_time {
            return Err(EventStoreError::StorageError(format!(
                "tail event time {tail_event_time} precedes head event time {head_event_time}"
            )));
        }
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(aggregate_id)
            .map(|streams| {
                streams
                    .iter()
                    .filter(|s| s.create_time >= head_event_time && s.create_time <= tail_event_time)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<EventStream>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(aggregate_id)
            .and_then(|streams| streams.last().cloned()))
    }

    async fn scan_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        after_cursor_id: &str,
        limit: usize,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        let inner = self.inner.read().await;
        let mut ids: Vec<AggregateId> = inner
            .streams
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

    async fn archive_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        tail_cursor_id: &str,
    ) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().await;
        inner
            .cursors
            .insert(named_aggregate.clone(), tail_cursor_id.to_string());
        Ok(())
    }

    async fn tail_cursor_id(
        &self,
        named_aggregate: &NamedAggregate,
    ) -> Result<Option<String>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.cursors.get(named_aggregate).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBody;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Noted {
        note: String,
    }

    impl EventBody for Noted {
        fn event_name(&self) -> &'static str {
            "noted"
        }
    }

    fn named() -> NamedAggregate {
        NamedAggregate::new("tests", "note")
    }

    fn stream(aggregate_id: &AggregateId, version: u64, request_id: &str) -> EventStream {
        EventStream::produce(
            aggregate_id.clone(),
            version,
            format!("cmd-{version}"),
            request_id,
            "",
            vec![Noted {
                note: format!("v{version}"),
            }],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_load_round_trip() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");

        store.append(&stream(&id, 1, "req-1")).await.unwrap();
        store.append(&stream(&id, 2, "req-2")).await.unwrap();

        let loaded = store.load_all(&id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].version, 1);
        assert_eq!(loaded[1].version, 2);

        let ranged = store.load(&id, 2, 2).await.unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].version, 2);
    }

    #[tokio::test]
    async fn test_append_rejects_occupied_version() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");

        store.append(&stream(&id, 1, "req-1")).await.unwrap();
        store.append(&stream(&id, 2, "req-2")).await.unwrap();

        let err = store.append(&stream(&id, 2, "req-3")).await.unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::EventVersionConflict { version: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_append_maps_initial_conflict_to_duplicate_aggregate() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");

        store.append(&stream(&id, 1, "req-1")).await.unwrap();
        let err = store.append(&stream(&id, 1, "req-2")).await.unwrap_err();
        assert!(matches!(err, EventStoreError::DuplicateAggregateId { .. }));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_request_id() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");

        store.append(&stream(&id, 1, "req-1")).await.unwrap();
        let err = store.append(&stream(&id, 2, "req-1")).await.unwrap_err();
        assert!(matches!(err, EventStoreError::DuplicateRequestId { .. }));

        // The duplicate did not alter stored state.
        assert_eq!(store.load_all(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_validates_range() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");
        assert!(store.load(&id, 0, 1).await.is_err());
        assert!(store.load(&id, 3, 1).await.is_err());
        assert!(store.load(&id, 1, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_returns_most_recent_stream() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");
        assert!(store.last(&id).await.unwrap().is_none());

        store.append(&stream(&id, 1, "req-1")).await.unwrap();
        store.append(&stream(&id, 2, "req-2")).await.unwrap();
        let last = store.last(&id).await.unwrap().unwrap();
        assert_eq!(last.version, 2);
    }

    #[tokio::test]
    async fn test_scan_and_archive_cursor() {
        let store = InMemoryEventStore::new();
        for n in ["a-1", "a-2", "a-3", "b-1"] {
            let id = named().aggregate_id(n);
            store.append(&stream(&id, 1, &format!("req-{n}"))).await.unwrap();
        }
        let other = NamedAggregate::new("tests", "other").aggregate_id("z-1");
        store.append(&stream(&other, 1, "req-z")).await.unwrap();

        let page = store.scan_aggregate_id(&named(), "", 2).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);

        store
            .archive_aggregate_id(&named(), "a-2")
            .await
            .unwrap();
        assert_eq!(
            store.tail_cursor_id(&named()).await.unwrap().as_deref(),
            Some("a-2")
        );

        let page = store.scan_aggregate_id(&named(), "a-2", 10).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a-3", "b-1"]);
    }

    #[tokio::test]
    async fn test_load_by_event_time_window() {
        let store = InMemoryEventStore::new();
        let id = named().aggregate_id("n-1");
        store.append(&stream(&id, 1, "req-1")).await.unwrap();

        let all = store
            .load_by_event_time(
                &id,
                Utc::now() - chrono::Duration::minutes(1),
                Utc::now() + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        let none = store
            .load_by_event_time(
                &id,
                Utc::now() + chrono::Duration::minutes(1),
                Utc::now() + chrono::Duration::minutes(2),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
