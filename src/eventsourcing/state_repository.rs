// Copyright 2025 Eventum Contributors.

//! Snapshot-accelerated state aggregate repository
//!
//! Read-only composition of the snapshot repository and the event store:
//! start from the latest usable snapshot (or a blank state), replay the
//! trailing event streams, return the assembled [`StateAggregate`]. Never
//! writes anything.

use crate::eventsourcing::event_store::{EventStore, EventStoreError};
use crate::eventsourcing::snapshot::{Snapshot, SnapshotError, SnapshotRepository};
use crate::modeling::{AggregateId, SourcingError, StateAggregate, StateRoot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while materializing aggregate state
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The event store failed
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The snapshot repository failed
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// A loaded stream failed to apply
    #[error("sourcing error: {0}")]
    Sourcing(#[from] SourcingError),
}

impl From<SnapshotError> for RepositoryError {
    fn from(err: SnapshotError) -> Self {
        RepositoryError::Snapshot(err.to_string())
    }
}

/// Materializes [`StateAggregate`]s from snapshots plus trailing events
pub struct StateAggregateRepository<ES, SR> {
    event_store: Arc<ES>,
    snapshots: Arc<SR>,
}

impl<ES, SR> StateAggregateRepository<ES, SR>
where
    ES: EventStore,
    SR: SnapshotRepository,
{
    /// Create a repository over an event store and a snapshot repository
    pub fn new(event_store: Arc<ES>, snapshots: Arc<SR>) -> Self {
        Self {
            event_store,
            snapshots,
        }
    }

    /// The underlying event store
    pub fn event_store(&self) -> &Arc<ES> {
        &self.event_store
    }

    /// The underlying snapshot repository
    pub fn snapshots(&self) -> &Arc<SR> {
        &self.snapshots
    }

    /// Load an aggregate's current state
    ///
    /// Returns an uninitialized aggregate (version 0) when no events exist;
    /// absence is a state, not an error.
    pub async fn load<S: StateRoot>(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<StateAggregate<S>, RepositoryError> {
        self.load_to(aggregate_id, u64::MAX).await
    }

    /// Load an aggregate's state at or below a version bound
    ///
    /// Uses the stored snapshot when it does not exceed `tail_version`, then
    /// replays the streams strictly after the snapshot version up to the
    /// bound. The load fails as a whole if any stream fails to apply; a
    /// partially sourced aggregate is never returned.
    pub async fn load_to<S: StateRoot>(
        &self,
        aggregate_id: &AggregateId,
        tail_version: u64,
    ) -> Result<StateAggregate<S>, RepositoryError> {
        let mut state_aggregate = match self.snapshots.load(aggregate_id).await? {
            Some(record) if record.version <= tail_version => {
                debug!(
                    aggregate_id = %aggregate_id,
                    snapshot_version = record.version,
                    "load accelerated by snapshot"
                );
                Snapshot::<S>::from_record(record)
                    .map_err(RepositoryError::from)?
                    .into_state_aggregate()
            }
            _ => StateAggregate::uninitialized(aggregate_id.clone()),
        };

        if state_aggregate.version() >= tail_version {
            return Ok(state_aggregate);
        }

        let streams = self
            .event_store
            .load(
                aggregate_id,
                state_aggregate.expected_next_version(),
                tail_version,
            )
            .await?;
        for stream in &streams {
            state_aggregate.source(stream)?;
        }
        Ok(state_aggregate)
    }

    /// Load an aggregate's state as of a point in time
    ///
    /// Pure replay of the streams created at or before `tail_event_time`;
    /// snapshots are keyed by version, not time, so they cannot accelerate
    /// time-travel loads.
    pub async fn load_at<S: StateRoot>(
        &self,
        aggregate_id: &AggregateId,
        tail_event_time: DateTime<Utc>,
    ) -> Result<StateAggregate<S>, RepositoryError> {
        let mut state_aggregate = StateAggregate::uninitialized(aggregate_id.clone());
        let streams = self
            .event_store
            .load_by_event_time(aggregate_id, DateTime::<Utc>::MIN_UTC, tail_event_time)
            .await?;
        for stream in &streams {
            state_aggregate.source(stream)?;
        }
        Ok(state_aggregate)
    }
}
