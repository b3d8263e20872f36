// Copyright 2025 Eventum Contributors.

//! Command gateway and structured submission results
//!
//! The gateway is the command-submission surface of the engine. Every
//! terminal outcome, success or failure, comes back as a [`CommandResult`]
//! carrying a stable error code and message; raw errors never cross this
//! boundary.

use crate::eventsourcing::{EventStore, SnapshotRepository};
use crate::modeling::{
    Aggregate, AggregateDispatcher, AggregateId, CommandError, CommandMessage,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Error code carried by successful results
pub const SUCCEEDED: &str = "OK";

/// How far a submitted command progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CommandStage {
    /// Accepted and queued onto the aggregate's worker
    Sent,
    /// The processing cycle completed (successfully or not)
    Processed,
}

/// Terminal status of a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CommandStatus {
    /// The command committed (possibly producing no events)
    Succeeded,
    /// The command terminally failed
    Rejected,
}

/// Structured outcome of one command submission
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandResult {
    /// How far processing progressed
    pub stage: CommandStage,
    /// Terminal status
    pub status: CommandStatus,
    /// Aggregate the command targeted
    pub aggregate_id: AggregateId,
    /// Id of the submitted command
    pub command_id: String,
    /// Idempotency key of the submitted command
    pub request_id: String,
    /// Aggregate version after the command, when it succeeded
    pub version: Option<u64>,
    /// Stable error code; [`SUCCEEDED`] on success
    pub error_code: String,
    /// Human-readable error message; empty on success
    pub error_msg: String,
}

impl CommandResult {
    fn succeeded(
        aggregate_id: AggregateId,
        command_id: String,
        request_id: String,
        version: u64,
    ) -> Self {
        Self {
            stage: CommandStage::Processed,
            status: CommandStatus::Succeeded,
            aggregate_id,
            command_id,
            request_id,
            version: Some(version),
            error_code: SUCCEEDED.to_string(),
            error_msg: String::new(),
        }
    }

    fn rejected(
        aggregate_id: AggregateId,
        command_id: String,
        request_id: String,
        error: &CommandError,
    ) -> Self {
        Self {
            stage: CommandStage::Processed,
            status: CommandStatus::Rejected,
            aggregate_id,
            command_id,
            request_id,
            version: None,
            error_code: error.error_code().to_string(),
            error_msg: error.to_string(),
        }
    }

    /// Whether the command committed
    pub fn is_succeeded(&self) -> bool {
        self.status == CommandStatus::Succeeded
    }
}

/// Submits commands and maps outcomes to [`CommandResult`]s
///
/// Applies a per-command deadline: exceeding `execution_timeout` surfaces as
/// a `COMMAND_TIMEOUT` result, distinct from conflicts and validation
/// failures. The deadline bounds the caller's wait; appends themselves are
/// atomic, so an abandoned cycle can never leave a partial write visible.
pub struct CommandGateway<A: Aggregate, ES, SR> {
    dispatcher: AggregateDispatcher<A, ES, SR>,
    execution_timeout: Duration,
}

impl<A, ES, SR> CommandGateway<A, ES, SR>
where
    A: Aggregate,
    ES: EventStore + 'static,
    SR: SnapshotRepository + 'static,
{
    /// Create a gateway over a dispatcher with the given per-command deadline
    pub fn new(dispatcher: AggregateDispatcher<A, ES, SR>, execution_timeout: Duration) -> Self {
        Self {
            dispatcher,
            execution_timeout,
        }
    }

    /// Submit a command and wait for its terminal result
    pub async fn send(&self, command: CommandMessage<A::Command>) -> CommandResult {
        let aggregate_id = command.aggregate_id.clone();
        let command_id = command.command_id.clone();
        let request_id = command.request_id.clone();
        debug!(aggregate_id = %aggregate_id, command_id = %command_id, "submitting command");

        match tokio::time::timeout(self.execution_timeout, self.dispatcher.dispatch(command)).await
        {
            Err(_elapsed) => {
                let error = CommandError::Timeout {
                    aggregate_id: Box::new(aggregate_id.clone()),
                    timeout: self.execution_timeout,
                };
                CommandResult::rejected(aggregate_id, command_id, request_id, &error)
            }
            Ok(Ok(processed)) => CommandResult::succeeded(
                aggregate_id,
                command_id,
                request_id,
                processed.state_aggregate.version(),
            ),
            Ok(Err(error)) => {
                CommandResult::rejected(aggregate_id, command_id, request_id, &error)
            }
        }
    }
}
