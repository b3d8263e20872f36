// Copyright 2025 Eventum Contributors.

//! Command aggregate processor
//!
//! One command invocation walks the state machine `Loaded -> Validated ->
//! Sourced -> Stored`, or terminates `Failed` at any point. Validation and
//! the command handler run against the in-memory state; nothing becomes
//! visible to anyone until the produced stream is durably appended.

use crate::errors::DomainError;
use crate::events::EventStream;
use crate::eventsourcing::{EventStore, EventStoreError, RepositoryError};
use crate::modeling::command::{Aggregate, AggregateMetadata, CommandMessage};
use crate::modeling::state::{SourcingError, StateAggregate};
use crate::modeling::AggregateId;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Stages of one command-processing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Current state obtained
    Loaded,
    /// Command accepted by the validation checks
    Validated,
    /// Produced events applied to the in-memory state
    Sourced,
    /// Produced stream durably appended
    Stored,
}

/// Errors terminating a command-processing cycle
///
/// The variants map one-to-one onto the engine's error taxonomy: conflicts
/// (retryable), idempotency and validation failures (fail fast), and
/// infrastructure failures.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command pinned a version that does not match the loaded state
    #[error("expected version {expected} but {aggregate_id} is at version {actual}")]
    ExpectVersionConflict {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
        /// Version pinned by the command
        expected: u64,
        /// Version the aggregate is actually at
        actual: u64,
    },

    /// A non-create command targeted an aggregate that does not exist
    #[error("aggregate {aggregate_id} is not initialized")]
    NotInitialized {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
    },

    /// The command's owner does not match the aggregate's recorded owner
    #[error("owner {owner_id} may not access aggregate {aggregate_id}")]
    IllegalAccessOwnerAggregate {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
        /// Owner claimed by the command
        owner_id: String,
    },

    /// A non-recovery command targeted a deleted aggregate
    #[error("aggregate {aggregate_id} is deleted")]
    IllegalAccessDeletedAggregate {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
    },

    /// The command handler rejected the command
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Applying the produced events to the in-memory state failed
    #[error(transparent)]
    Sourcing(#[from] SourcingError),

    /// The event store rejected or failed the append
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Loading current state failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The processing cycle exceeded its deadline
    #[error("command for {aggregate_id} timed out after {timeout:?}")]
    Timeout {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
        /// The exceeded deadline
        timeout: Duration,
    },

    /// The conflict-retry loop gave up
    #[error("retries exhausted after {attempts} attempts for {aggregate_id}")]
    RetriesExhausted {
        /// Aggregate the command targeted
        aggregate_id: Box<AggregateId>,
        /// Number of attempts made
        attempts: u32,
        /// The conflict that ended the loop
        #[source]
        source: Box<CommandError>,
    },
}

impl CommandError {
    /// Stable error code for structured command results
    pub fn error_code(&self) -> &'static str {
        match self {
            CommandError::ExpectVersionConflict { .. } => "COMMAND_EXPECT_VERSION_CONFLICT",
            CommandError::NotInitialized { .. } => "NOT_FOUND",
            CommandError::IllegalAccessOwnerAggregate { .. } => "ILLEGAL_ACCESS_OWNER_AGGREGATE",
            CommandError::IllegalAccessDeletedAggregate { .. } => {
                "ILLEGAL_ACCESS_DELETED_AGGREGATE"
            }
            CommandError::Domain(err) => err.error_code(),
            CommandError::Sourcing(_) => "SOURCING_ERROR",
            CommandError::Store(err) => err.error_code(),
            CommandError::Repository(_) => "STORAGE_ERROR",
            CommandError::Timeout { .. } => "COMMAND_TIMEOUT",
            CommandError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
        }
    }
}

/// Outcome of a successfully processed command
#[derive(Debug)]
pub struct Processed<S: crate::modeling::StateRoot> {
    /// The aggregate's state after the command
    pub state_aggregate: StateAggregate<S>,
    /// The committed stream; `None` when the handler produced no events
    pub stream: Option<EventStream>,
}

/// Executes single command-processing cycles against one aggregate type
///
/// The processor owns no retry policy: on a version conflict the whole cycle
/// is restarted from a fresh load by the
/// [`RetryableProcessor`](crate::modeling::RetryableProcessor).
pub struct CommandAggregateProcessor<A: Aggregate, ES> {
    metadata: Arc<AggregateMetadata<A>>,
    event_store: Arc<ES>,
    services: Arc<A::Services>,
}

impl<A, ES> CommandAggregateProcessor<A, ES>
where
    A: Aggregate,
    ES: EventStore,
{
    /// Create a processor for one aggregate type
    pub fn new(
        metadata: Arc<AggregateMetadata<A>>,
        event_store: Arc<ES>,
        services: Arc<A::Services>,
    ) -> Self {
        Self {
            metadata,
            event_store,
            services,
        }
    }

    /// The aggregate type's registration record
    pub fn metadata(&self) -> &Arc<AggregateMetadata<A>> {
        &self.metadata
    }

    /// Run one command cycle against the given state
    ///
    /// Mutates `state_aggregate` by sourcing the produced events before the
    /// append; when an error is returned the state must be considered
    /// expired and discarded, it may already contain uncommitted events.
    pub async fn process(
        &self,
        state_aggregate: &mut StateAggregate<A::State>,
        command: &CommandMessage<A::Command>,
    ) -> Result<Option<EventStream>, CommandError> {
        let aggregate_id = command.aggregate_id.clone();
        debug!(
            aggregate_id = %aggregate_id,
            command_id = %command.command_id,
            state = ?CommandState::Loaded,
            "processing command"
        );

        if command.aggregate_id.named_aggregate != *self.metadata.named_aggregate() {
            return Err(DomainError::ValidationError(format!(
                "command targets {} but this processor handles {}",
                command.aggregate_id.named_aggregate,
                self.metadata.named_aggregate()
            ))
            .into());
        }

        if let Some(expected) = command.expected_version {
            if expected != state_aggregate.version() {
                return Err(CommandError::ExpectVersionConflict {
                    aggregate_id: Box::new(aggregate_id),
                    expected,
                    actual: state_aggregate.version(),
                });
            }
        }
        if !state_aggregate.initialized() && !command.is_create && !command.allow_create {
            return Err(CommandError::NotInitialized {
                aggregate_id: Box::new(aggregate_id),
            });
        }
        if command.is_create && !command.allow_create && state_aggregate.initialized() {
            return Err(EventStoreError::DuplicateAggregateId {
                aggregate_id: Box::new(aggregate_id),
            }
            .into());
        }
        if state_aggregate.initialized()
            && !command.owner_id.is_empty()
            && command.owner_id != state_aggregate.owner_id()
        {
            return Err(CommandError::IllegalAccessOwnerAggregate {
                aggregate_id: Box::new(aggregate_id),
                owner_id: command.owner_id.clone(),
            });
        }
        if A::is_recovery(&command.body) {
            if !state_aggregate.deleted() {
                return Err(DomainError::invalid_operation(format!(
                    "aggregate {aggregate_id} is not deleted"
                ))
                .into());
            }
        } else if state_aggregate.deleted() {
            return Err(CommandError::IllegalAccessDeletedAggregate {
                aggregate_id: Box::new(aggregate_id),
            });
        }
        debug!(aggregate_id = %command.aggregate_id, state = ?CommandState::Validated, "command validated");

        let bodies = A::execute(state_aggregate, command, &self.services)?;
        if bodies.is_empty() {
            debug!(
                aggregate_id = %command.aggregate_id,
                command_id = %command.command_id,
                "command produced no events"
            );
            return Ok(None);
        }

        let stream = EventStream::produce(
            command.aggregate_id.clone(),
            state_aggregate.expected_next_version(),
            command.command_id.clone(),
            command.request_id.clone(),
            command.owner_id.clone(),
            bodies,
        )?;
        state_aggregate.source(&stream)?;
        debug!(aggregate_id = %command.aggregate_id, state = ?CommandState::Sourced, version = stream.version, "events sourced");

        self.event_store.append(&stream).await?;
        debug!(aggregate_id = %command.aggregate_id, state = ?CommandState::Stored, version = stream.version, "events stored");
        Ok(Some(stream))
    }
}
