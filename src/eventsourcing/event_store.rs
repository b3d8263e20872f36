// Copyright 2025 Eventum Contributors.

//! Event store contract
//!
//! An event store is an append-only, per-aggregate ordered log of event
//! streams. It is the engine's single write-side concurrency control: a
//! writer claims `current version + 1` and the store rejects the append when
//! that slot is already taken.

use crate::events::EventStream;
use crate::modeling::{AggregateId, NamedAggregate, INITIAL_VERSION};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when working with the event store
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another stream already occupies `(aggregate_id, version)`
    ///
    /// Retryable: the writer reloads fresher state and claims the next slot.
    #[error("version conflict: {aggregate_id} already has a stream at version {version}")]
    EventVersionConflict {
        /// Aggregate the append targeted
        aggregate_id: Box<AggregateId>,
        /// The version the rejected stream claimed
        version: u64,
    },

    /// A creation stream was appended but the aggregate already exists
    ///
    /// Never retried: the aggregate id is taken.
    #[error("duplicate aggregate id: {aggregate_id} already exists")]
    DuplicateAggregateId {
        /// Aggregate the append targeted
        aggregate_id: Box<AggregateId>,
    },

    /// `(aggregate_id, request_id)` was already committed
    ///
    /// Never retried: the command was already applied, resending it is safe
    /// precisely because this error stops the second application.
    #[error("duplicate request id: {request_id} was already committed for {aggregate_id}")]
    DuplicateRequestId {
        /// Aggregate the append targeted
        aggregate_id: Box<AggregateId>,
        /// The duplicated idempotency key
        request_id: String,
    },

    /// A load was requested with an impossible version range
    #[error("invalid version range [{head_version}, {tail_version}] for {aggregate_id}")]
    InvalidVersionRange {
        /// Aggregate the load targeted
        aggregate_id: Box<AggregateId>,
        /// Requested head version
        head_version: u64,
        /// Requested tail version
        tail_version: u64,
    },

    /// The appended stream violates the stream invariants
    #[error("invalid event stream: {0}")]
    InvalidStream(String),

    /// Failed to serialize or deserialize stored data
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// General storage operation failure
    #[error("storage error: {0}")]
    StorageError(String),
}

impl EventStoreError {
    /// Whether the error is resolved by re-reading fresher state and retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventStoreError::EventVersionConflict { .. })
    }

    /// Stable error code for structured command results
    pub fn error_code(&self) -> &'static str {
        match self {
            EventStoreError::EventVersionConflict { .. } => "EVENT_VERSION_CONFLICT",
            EventStoreError::DuplicateAggregateId { .. } => "DUPLICATE_AGGREGATE_ID",
            EventStoreError::DuplicateRequestId { .. } => "DUPLICATE_REQUEST_ID",
            EventStoreError::InvalidVersionRange { .. } => "INVALID_VERSION_RANGE",
            EventStoreError::InvalidStream(_) => "INVALID_EVENT_STREAM",
            EventStoreError::SerializationError(_) => "SERIALIZATION_ERROR",
            EventStoreError::StorageError(_) => "STORAGE_ERROR",
        }
    }
}

/// Validate a version range before loading
///
/// Shared by backing implementations: `head_version` must be at least the
/// initial version and must not exceed `tail_version`.
pub fn check_version_range(
    aggregate_id: &AggregateId,
    head_version: u64,
    tail_version: u64,
) -> Result<(), EventStoreError> {
    if head_version < INITIAL_VERSION || head_version > tail_version {
        return Err(EventStoreError::InvalidVersionRange {
            aggregate_id: Box::new(aggregate_id.clone()),
            head_version,
            tail_version,
        });
    }
    Ok(())
}

/// Append-only, per-aggregate ordered log of event streams
///
/// Implementations must keep the versions of one aggregate id a gap-free
/// ascending sequence starting at [`INITIAL_VERSION`]: an append is accepted
/// only when its version is exactly one past the stored tail. A rejected
/// creation (version [`INITIAL_VERSION`] against an existing aggregate) is
/// reported as [`EventStoreError::DuplicateAggregateId`] rather than a plain
/// version conflict.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one stream atomically
    ///
    /// Either every event of the stream is durably stored at the claimed
    /// version or none is. See [`EventStoreError`] for the conflict
    /// taxonomy.
    async fn append(&self, stream: &EventStream) -> Result<(), EventStoreError>;

    /// Load streams of an aggregate by version range, ascending
    ///
    /// Both bounds are inclusive. Empty when the aggregate has no events in
    /// the range; fails with [`EventStoreError::InvalidVersionRange`] when
    /// `head_version` is below [`INITIAL_VERSION`] or above `tail_version`.
    async fn load(
        &self,
        aggregate_id: &AggregateId,
        head_version: u64,
        tail_version: u64,
    ) -> Result<Vec<EventStream>, EventStoreError>;

    /// Load streams of an aggregate by creation-time range, ascending
    ///
    /// Both bounds are inclusive. Used for point-in-time queries.
    async fn load_by_event_time(
        &self,
        aggregate_id: &AggregateId,
        head_event_time: DateTime<Utc>,
        tail_event_time: DateTime<Utc>,
    ) -> Result<Vec<EventStream>, EventStoreError>;

    /// The most recent stream of an aggregate, if any
    async fn last(&self, aggregate_id: &AggregateId) -> Result<Option<EventStream>, EventStoreError>;

    /// Enumerate aggregate ids of one aggregate type, ordered by id
    ///
    /// Returns up to `limit` ids strictly greater than `after_cursor_id`.
    /// Paging from the empty cursor enumerates every id ever written, for
    /// batch maintenance such as snapshot regeneration.
    async fn scan_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        after_cursor_id: &str,
        limit: usize,
    ) -> Result<Vec<AggregateId>, EventStoreError>;

    /// Record `tail_cursor_id` as the scan high-water mark for an aggregate type
    async fn archive_aggregate_id(
        &self,
        named_aggregate: &NamedAggregate,
        tail_cursor_id: &str,
    ) -> Result<(), EventStoreError>;

    /// The most recently archived cursor id, if any
    async fn tail_cursor_id(
        &self,
        named_aggregate: &NamedAggregate,
    ) -> Result<Option<String>, EventStoreError>;

    /// Load every stream of an aggregate from the beginning
    async fn load_all(&self, aggregate_id: &AggregateId) -> Result<Vec<EventStream>, EventStoreError> {
        self.load(aggregate_id, INITIAL_VERSION, u64::MAX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modeling::NamedAggregate;

    fn test_id() -> AggregateId {
        NamedAggregate::new("tests", "thing").aggregate_id("t-1")
    }

    #[test]
    fn test_check_version_range() {
        let id = test_id();
        assert!(check_version_range(&id, 1, 1).is_ok());
        assert!(check_version_range(&id, 1, u64::MAX).is_ok());
        assert!(check_version_range(&id, 0, 5).is_err());
        assert!(check_version_range(&id, 3, 2).is_err());
    }

    #[test]
    fn test_only_version_conflicts_are_retryable() {
        let id = Box::new(test_id());
        assert!(EventStoreError::EventVersionConflict {
            aggregate_id: id.clone(),
            version: 2
        }
        .is_retryable());
        assert!(!EventStoreError::DuplicateAggregateId {
            aggregate_id: id.clone()
        }
        .is_retryable());
        assert!(!EventStoreError::DuplicateRequestId {
            aggregate_id: id,
            request_id: "r".to_string()
        }
        .is_retryable());
        assert!(!EventStoreError::StorageError("boom".to_string()).is_retryable());
    }
}
