// Copyright 2025 Eventum Contributors.

//! Domain events and event streams
//!
//! Events are immutable facts. A command that is accepted produces one
//! [`EventStream`]: an ordered, non-empty batch of events committed
//! atomically at a single aggregate version. Replaying streams in version
//! order is the only way aggregate state ever changes.

use crate::errors::{DomainError, DomainResult};
use crate::modeling::AggregateId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Typed body of a domain event
///
/// Each aggregate declares one event enum implementing this trait. The enum
/// is the aggregate's dispatch table: [`StateRoot::on_sourcing`] matches on
/// it, resolved at compile time rather than through runtime reflection.
///
/// [`StateRoot::on_sourcing`]: crate::modeling::StateRoot::on_sourcing
///
/// # Examples
///
/// ```rust
/// use eventum::EventBody;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// enum AccountEvent {
///     Opened { owner: String },
///     Closed,
/// }
///
/// impl EventBody for AccountEvent {
///     fn event_name(&self) -> &'static str {
///         match self {
///             AccountEvent::Opened { .. } => "account_opened",
///             AccountEvent::Closed => "account_closed",
///         }
///     }
///
///     fn is_delete(&self) -> bool {
///         matches!(self, AccountEvent::Closed)
///     }
/// }
/// ```
pub trait EventBody: Serialize + DeserializeOwned + Debug + Send + Sync {
    /// Stable name of this event variant
    fn event_name(&self) -> &'static str;

    /// Whether sourcing this event marks the aggregate deleted
    fn is_delete(&self) -> bool {
        false
    }

    /// Whether sourcing this event recovers a deleted aggregate
    fn is_recover(&self) -> bool {
        false
    }
}

/// One stored domain event
///
/// `version` is the aggregate-wide position of the stream this event belongs
/// to; `sequence` orders events inside that stream, starting at 1, and the
/// final event of the batch carries `is_last = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event id (time-ordered UUID v7)
    pub id: String,
    /// Stable event name, taken from [`EventBody::event_name`]
    pub name: String,
    /// Aggregate this event belongs to
    pub aggregate_id: AggregateId,
    /// Aggregate-wide version of the containing stream
    pub version: u64,
    /// 1-based position within the containing stream
    pub sequence: u32,
    /// Whether this is the final event of the containing stream
    pub is_last: bool,
    /// Serialized event body
    pub body: serde_json::Value,
    /// When the event was produced
    pub create_time: DateTime<Utc>,
}

/// An ordered, non-empty batch of events sharing one aggregate version
///
/// Streams are the unit of atomic persistence: the event store commits all
/// events of a stream at `version`, or none. All events share the stream's
/// aggregate identity, `command_id` and `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    /// Unique stream id
    pub id: String,
    /// Aggregate the stream belongs to
    pub aggregate_id: AggregateId,
    /// Aggregate-wide version claimed by this stream
    pub version: u64,
    /// Id of the command that produced the stream
    pub command_id: String,
    /// Idempotency key of the producing command
    pub request_id: String,
    /// Owner recorded by the producing command, empty when unowned
    pub owner_id: String,
    /// When the stream was produced
    pub create_time: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

impl EventStream {
    /// Build a stream from typed event bodies
    ///
    /// Assigns event ids, contiguous `sequence` numbers and the `is_last`
    /// marker. Fails when `bodies` is empty: a stream without events has no
    /// version to claim.
    pub fn produce<E: EventBody>(
        aggregate_id: AggregateId,
        version: u64,
        command_id: impl Into<String>,
        request_id: impl Into<String>,
        owner_id: impl Into<String>,
        bodies: Vec<E>,
    ) -> DomainResult<Self> {
        if bodies.is_empty() {
            return Err(DomainError::InvariantViolation(
                "an event stream must contain at least one event".to_string(),
            ));
        }
        let create_time = Utc::now();
        let last_index = bodies.len() - 1;
        let events = bodies
            .iter()
            .enumerate()
            .map(|(index, body)| {
                Ok(DomainEvent {
                    id: Uuid::now_v7().to_string(),
                    name: body.event_name().to_string(),
                    aggregate_id: aggregate_id.clone(),
                    version,
                    sequence: index as u32 + 1,
                    is_last: index == last_index,
                    body: serde_json::to_value(body)?,
                    create_time,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            aggregate_id,
            version,
            command_id: command_id.into(),
            request_id: request_id.into(),
            owner_id: owner_id.into(),
            create_time,
            events,
        })
    }

    /// The events of this stream, in sequence order
    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Number of events in the stream
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the stream is empty (never true for a validly produced stream)
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Decode every event body back into the aggregate's typed event enum
    pub fn decode<E: EventBody>(&self) -> DomainResult<Vec<E>> {
        self.events
            .iter()
            .map(|event| Ok(serde_json::from_value(event.body.clone())?))
            .collect()
    }

    /// Check the structural invariants of the stream
    ///
    /// Every backing event store calls this before accepting an append:
    /// non-empty, uniform aggregate identity and version, `sequence`
    /// contiguous from 1, and exactly the final event marked `is_last`.
    pub fn validate(&self) -> DomainResult<()> {
        if self.events.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "event stream {} is empty",
                self.id
            )));
        }
        for (index, event) in self.events.iter().enumerate() {
            if event.aggregate_id != self.aggregate_id {
                return Err(DomainError::InvariantViolation(format!(
                    "event {} does not share the stream's aggregate id {}",
                    event.id, self.aggregate_id
                )));
            }
            if event.version != self.version {
                return Err(DomainError::InvariantViolation(format!(
                    "event {} claims version {} but the stream claims {}",
                    event.id, event.version, self.version
                )));
            }
            if event.sequence != index as u32 + 1 {
                return Err(DomainError::InvariantViolation(format!(
                    "event {} has sequence {} at position {}",
                    event.id,
                    event.sequence,
                    index + 1
                )));
            }
            let expected_last = index == self.events.len() - 1;
            if event.is_last != expected_last {
                return Err(DomainError::InvariantViolation(format!(
                    "event {} has is_last = {} at position {}",
                    event.id,
                    event.is_last,
                    index + 1
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a DomainEvent;
    type IntoIter = std::slice::Iter<'a, DomainEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
