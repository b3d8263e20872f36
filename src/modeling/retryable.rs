// Copyright 2025 Eventum Contributors.

//! Bounded conflict-retry wrapper around the command processor
//!
//! Only storage-layer optimistic-concurrency conflicts are retried, because
//! only those are resolved by re-reading fresher state. Idempotency errors
//! (duplicate aggregate id, duplicate request id) and every validation or
//! domain failure surface immediately.

use crate::eventsourcing::{
    EventStore, EventStoreError, SnapshotRepository, StateAggregateRepository,
};
use crate::modeling::command::{Aggregate, CommandMessage};
use crate::modeling::command_aggregate::{CommandAggregateProcessor, CommandError, Processed};
use crate::modeling::state::StateAggregate;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounds for the conflict-retry loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 10 }
    }
}

/// Re-runs command cycles from a fresh load until they commit or exhaust
///
/// Per attempt: load current state (a create command starts from a blank
/// aggregate instead), run one
/// [`CommandAggregateProcessor::process`] cycle, and classify the outcome.
/// A version conflict restarts the loop; a duplicate aggregate id restarts
/// it only for create-or-update commands (`allow_create`), where the losing
/// creator is expected to re-run as an update against the winner's state.
pub struct RetryableProcessor<A: Aggregate, ES, SR> {
    processor: CommandAggregateProcessor<A, ES>,
    repository: Arc<StateAggregateRepository<ES, SR>>,
    config: RetryConfig,
}

impl<A, ES, SR> RetryableProcessor<A, ES, SR>
where
    A: Aggregate,
    ES: EventStore,
    SR: SnapshotRepository,
{
    /// Create a retryable processor
    pub fn new(
        processor: CommandAggregateProcessor<A, ES>,
        repository: Arc<StateAggregateRepository<ES, SR>>,
        config: RetryConfig,
    ) -> Self {
        Self {
            processor,
            repository,
            config,
        }
    }

    /// The wrapped single-cycle processor
    pub fn processor(&self) -> &CommandAggregateProcessor<A, ES> {
        &self.processor
    }

    /// The state repository used for fresh loads
    pub fn repository(&self) -> &Arc<StateAggregateRepository<ES, SR>> {
        &self.repository
    }

    /// Process a command, retrying version conflicts from a fresh read
    pub async fn process(
        &self,
        command: &CommandMessage<A::Command>,
    ) -> Result<Processed<A::State>, CommandError> {
        let mut attempt: u32 = 0;
        loop {
            let mut state_aggregate = if command.is_create && attempt == 0 {
                StateAggregate::uninitialized(command.aggregate_id.clone())
            } else {
                self.repository
                    .load::<A::State>(&command.aggregate_id)
                    .await?
            };

            match self.processor.process(&mut state_aggregate, command).await {
                Ok(stream) => {
                    return Ok(Processed {
                        state_aggregate,
                        stream,
                    })
                }
                Err(err) => {
                    if !self.retryable(command, &err) {
                        return Err(err);
                    }
                    if attempt >= self.config.max_retries {
                        warn!(
                            aggregate_id = %command.aggregate_id,
                            command_id = %command.command_id,
                            attempts = attempt + 1,
                            "conflict retries exhausted"
                        );
                        return Err(CommandError::RetriesExhausted {
                            aggregate_id: Box::new(command.aggregate_id.clone()),
                            attempts: attempt + 1,
                            source: Box::new(err),
                        });
                    }
                    attempt += 1;
                    debug!(
                        aggregate_id = %command.aggregate_id,
                        command_id = %command.command_id,
                        attempt,
                        "version conflict, reloading and retrying"
                    );
                }
            }
        }
    }

    fn retryable(&self, command: &CommandMessage<A::Command>, err: &CommandError) -> bool {
        match err {
            CommandError::Store(EventStoreError::EventVersionConflict { .. }) => true,
            CommandError::Store(EventStoreError::DuplicateAggregateId { .. }) => {
                command.allow_create
            }
            _ => false,
        }
    }
}
