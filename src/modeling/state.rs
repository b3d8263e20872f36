// Copyright 2025 Eventum Contributors.

//! State aggregates and event sourcing
//!
//! A [`StateAggregate`] wraps an aggregate's state root together with the
//! bookkeeping the engine needs: identity, version, ownership, deletion flag
//! and event provenance. It is mutated exclusively by sourcing event streams
//! in version order; commands never touch it directly.

use crate::events::{EventBody, EventStream};
use crate::modeling::{AggregateId, UNINITIALIZED_VERSION};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// State root of an event-sourced aggregate
///
/// Implementations declare the aggregate's event enum and fold events into
/// state. `on_sourcing` must be total over the event enum and infallible:
/// an event that was committed has already happened.
pub trait StateRoot:
    Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The aggregate's event enum
    type Event: EventBody;

    /// Construct the blank state for a fresh aggregate instance
    fn initialize(aggregate_id: &AggregateId) -> Self;

    /// Fold one event into the state
    fn on_sourcing(&mut self, event: &Self::Event);
}

/// Errors that can occur while sourcing an event stream
#[derive(Debug, Error)]
pub enum SourcingError {
    /// The stream belongs to a different aggregate instance
    #[error("stream {stream_id} targets {stream_aggregate_id} but the aggregate is {aggregate_id}")]
    MismatchedAggregateId {
        /// Id of the offending stream
        stream_id: String,
        /// Aggregate id claimed by the stream
        stream_aggregate_id: Box<AggregateId>,
        /// Aggregate id of the state being sourced
        aggregate_id: Box<AggregateId>,
    },

    /// The stream's version is not the next expected version
    #[error("expected version {expected} but stream {stream_id} claims version {actual} for {aggregate_id}")]
    VersionConflict {
        /// Aggregate being sourced
        aggregate_id: Box<AggregateId>,
        /// Id of the offending stream
        stream_id: String,
        /// The version the aggregate expected next
        expected: u64,
        /// The version the stream claims
        actual: u64,
    },

    /// An event body could not be decoded into the aggregate's event enum
    #[error("failed to decode event body for {aggregate_id}: {message}")]
    Deserialization {
        /// Aggregate being sourced
        aggregate_id: Box<AggregateId>,
        /// Decoder error message
        message: String,
    },
}

/// An aggregate's state at some version
///
/// `version` always equals the version of the last stream applied;
/// `initialized` is false only when no stream has ever been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct StateAggregate<S: StateRoot> {
    aggregate_id: AggregateId,
    owner_id: String,
    version: u64,
    event_id: String,
    first_operator: String,
    operator: String,
    first_event_time: Option<DateTime<Utc>>,
    event_time: Option<DateTime<Utc>>,
    deleted: bool,
    state: S,
}

impl<S: StateRoot> StateAggregate<S> {
    /// Create an uninitialized aggregate at version 0
    pub fn uninitialized(aggregate_id: AggregateId) -> Self {
        let state = S::initialize(&aggregate_id);
        Self {
            aggregate_id,
            owner_id: String::new(),
            version: UNINITIALIZED_VERSION,
            event_id: String::new(),
            first_operator: String::new(),
            operator: String::new(),
            first_event_time: None,
            event_time: None,
            deleted: false,
            state,
        }
    }

    /// Reassemble an aggregate from persisted parts (snapshot restore)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        aggregate_id: AggregateId,
        owner_id: String,
        version: u64,
        event_id: String,
        first_operator: String,
        operator: String,
        first_event_time: Option<DateTime<Utc>>,
        event_time: Option<DateTime<Utc>>,
        deleted: bool,
        state: S,
    ) -> Self {
        Self {
            aggregate_id,
            owner_id,
            version,
            event_id,
            first_operator,
            operator,
            first_event_time,
            event_time,
            deleted,
            state,
        }
    }

    /// The aggregate's identity
    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    /// The recorded owner, empty when unowned
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Version of the last applied stream, 0 when uninitialized
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether any stream has ever been applied
    pub fn initialized(&self) -> bool {
        self.version > UNINITIALIZED_VERSION
    }

    /// The version the next stream must claim
    pub fn expected_next_version(&self) -> u64 {
        self.version + 1
    }

    /// Id of the last applied stream's final event
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Operator of the first applied stream
    pub fn first_operator(&self) -> &str {
        &self.first_operator
    }

    /// Operator of the last applied stream
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Creation time of the first applied stream
    pub fn first_event_time(&self) -> Option<DateTime<Utc>> {
        self.first_event_time
    }

    /// Creation time of the last applied stream
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.event_time
    }

    /// Whether a deletion event has been sourced (and not recovered)
    pub fn deleted(&self) -> bool {
        self.deleted
    }

    /// The domain state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Apply one event stream to the state
    ///
    /// The stream must target this aggregate and claim exactly
    /// [`expected_next_version`](Self::expected_next_version). Applies every
    /// event in sequence order, maintains the deletion flag from the event
    /// markers, then advances the version and provenance fields. Nothing is
    /// mutated when an error is returned before the first event applies;
    /// decoding is performed for the whole stream up front so a malformed
    /// body can never leave the state partially sourced.
    pub fn source(&mut self, stream: &EventStream) -> Result<(), SourcingError> {
        debug!(aggregate_id = %self.aggregate_id, version = stream.version, "sourcing event stream");

        if stream.aggregate_id != self.aggregate_id {
            return Err(SourcingError::MismatchedAggregateId {
                stream_id: stream.id.clone(),
                stream_aggregate_id: Box::new(stream.aggregate_id.clone()),
                aggregate_id: Box::new(self.aggregate_id.clone()),
            });
        }
        if stream.version != self.expected_next_version() {
            return Err(SourcingError::VersionConflict {
                aggregate_id: Box::new(self.aggregate_id.clone()),
                stream_id: stream.id.clone(),
                expected: self.expected_next_version(),
                actual: stream.version,
            });
        }

        let bodies: Vec<S::Event> =
            stream
                .decode()
                .map_err(|err| SourcingError::Deserialization {
                    aggregate_id: Box::new(self.aggregate_id.clone()),
                    message: err.to_string(),
                })?;

        let was_uninitialized = !self.initialized();
        for body in &bodies {
            if body.is_delete() {
                self.deleted = true;
            }
            if body.is_recover() {
                self.deleted = false;
            }
            self.state.on_sourcing(body);
        }

        self.version = stream.version;
        if !stream.owner_id.is_empty() {
            self.owner_id = stream.owner_id.clone();
        }
        if let Some(last) = stream.events().last() {
            self.event_id = last.id.clone();
        }
        self.operator = stream.owner_id.clone();
        self.event_time = Some(stream.create_time);
        if was_uninitialized {
            self.first_operator = self.operator.clone();
            self.first_event_time = self.event_time;
        }
        Ok(())
    }
}
