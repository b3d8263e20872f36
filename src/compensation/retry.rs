// Copyright 2025 Eventum Contributors.

//! Retry policy data for the compensation lifecycle

use crate::modeling::AggregateId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of a failed execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ExecutionFailedStatus {
    /// The execution failed and waits for a compensation attempt
    Failed,
    /// A compensation command has been sent and is running
    Prepared,
    /// The execution eventually succeeded
    Succeeded,
}

/// Whether a failure is considered recoverable by retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RecoverableType {
    /// Retrying can succeed
    Recoverable,
    /// Retrying can never succeed; the record is excluded from scheduling
    Unrecoverable,
    /// Not classified
    Unknown,
}

/// Error captured from a failed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetails {
    /// Stable error code
    pub error_code: String,
    /// Human-readable message
    pub error_msg: String,
    /// Captured stack trace or diagnostic dump
    pub stack_trace: String,
}

/// Reference to the event whose downstream processing failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EventRef {
    /// Id of the failed event
    pub id: String,
    /// Aggregate the event belongs to
    pub aggregate_id: AggregateId,
    /// Version of the stream the event belongs to
    pub version: u64,
}

/// Kind of processing function that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FunctionKind {
    /// A command handler
    Command,
    /// A sourcing function
    Sourcing,
    /// An event handler
    Event,
    /// A state-event handler
    StateEvent,
    /// An error handler
    Error,
}

/// Identity of the processing function that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FunctionInfo {
    /// Bounded context of the processor
    pub context_name: String,
    /// Processor name
    pub processor_name: String,
    /// Function name within the processor
    pub name: String,
    /// Function kind
    pub kind: FunctionKind,
}

impl FunctionInfo {
    /// Whether two records point at the same function
    pub fn is_same_function(&self, other: &FunctionInfo) -> bool {
        self.context_name == other.context_name
            && self.processor_name == other.processor_name
            && self.name == other.name
            && self.kind == other.kind
    }
}

/// Per-deployment retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetrySpec {
    /// Maximum number of compensation attempts
    pub max_retries: u32,
    /// Backoff before the first retry; later retries back off further
    pub min_backoff: Duration,
    /// How long one compensation attempt may run before it counts as timed out
    pub execution_timeout: Duration,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_retries: 10,
            min_backoff: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(120),
        }
    }
}

/// Computed retry bookkeeping of one failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetryState {
    /// Attempts made so far
    pub retries: u32,
    /// When the current attempt was issued
    pub retry_at: DateTime<Utc>,
    /// When the current attempt counts as timed out
    pub timeout_at: DateTime<Utc>,
    /// Earliest time the next attempt may be scheduled
    pub next_retry_at: DateTime<Utc>,
}

impl RetryState {
    /// Whether the current attempt has exceeded its execution timeout
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        now > self.timeout_at
    }
}
