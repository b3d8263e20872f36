// Copyright 2025 Eventum Contributors.

//! The `ExecutionFailed` aggregate
//!
//! The compensation subsystem's own bookkeeping is event-sourced through the
//! same pipeline it compensates for: every status transition of a failed
//! execution is a committed event, so the retry history is replayable like
//! any other aggregate.

use crate::compensation::calculator::NextRetryAtCalculator;
use crate::compensation::retry::{
    ErrorDetails, EventRef, ExecutionFailedStatus, FunctionInfo, RecoverableType, RetrySpec,
    RetryState,
};
use crate::errors::{DomainError, DomainResult};
use crate::events::EventBody;
use crate::modeling::{
    Aggregate, AggregateId, AggregateMetadata, CommandMessage, StateAggregate, StateRoot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bounded context the compensation aggregate lives in
pub const EXECUTION_FAILED_CONTEXT_NAME: &str = "compensation";

/// Aggregate name of the failed-execution record
pub const EXECUTION_FAILED_AGGREGATE_NAME: &str = "execution_failed";

/// Registration record for the [`ExecutionFailed`] aggregate
pub fn execution_failed_metadata() -> AggregateMetadata<ExecutionFailed> {
    AggregateMetadata::new(EXECUTION_FAILED_CONTEXT_NAME, EXECUTION_FAILED_AGGREGATE_NAME)
}

/// Commands of the compensation lifecycle
#[derive(Debug, Clone)]
pub enum ExecutionFailedCommand {
    /// Record a newly observed execution failure
    Create {
        /// Event whose downstream processing failed
        event_id: EventRef,
        /// Function that failed
        function: FunctionInfo,
        /// Captured error
        error: ErrorDetails,
        /// When the failed execution ran
        execute_at: DateTime<Utc>,
        /// Per-record policy override; the deployment default applies when absent
        retry_spec: Option<RetrySpec>,
        /// Failure classification
        recoverable: RecoverableType,
    },
    /// Send the next compensation attempt (guarded by the retry policy)
    Prepare,
    /// Send a compensation attempt ignoring the backoff threshold
    ForcePrepare,
    /// Record that the prepared attempt failed again
    ApplyFailed {
        /// Captured error of the failed attempt
        error: ErrorDetails,
        /// When the attempt ran
        execute_at: DateTime<Utc>,
        /// Updated failure classification
        recoverable: RecoverableType,
    },
    /// Record that the prepared attempt succeeded
    ApplySuccess {
        /// When the attempt ran
        execute_at: DateTime<Utc>,
    },
    /// Replace the record's retry policy
    ApplyRetrySpec {
        /// The new policy
        retry_spec: RetrySpec,
    },
    /// Re-classify the failure
    MarkRecoverable {
        /// The new classification
        recoverable: RecoverableType,
    },
    /// Point the record at a different function
    ChangeFunction {
        /// The new function identity
        function: FunctionInfo,
    },
}

/// Events of the compensation lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionFailedEvent {
    /// A failure was recorded
    Created {
        /// Event whose downstream processing failed
        event_id: EventRef,
        /// Function that failed
        function: FunctionInfo,
        /// Captured error
        error: ErrorDetails,
        /// When the failed execution ran
        execute_at: DateTime<Utc>,
        /// Initial retry bookkeeping (attempt 0)
        retry_state: RetryState,
        /// Policy governing this record
        retry_spec: RetrySpec,
        /// Failure classification
        recoverable: RecoverableType,
    },
    /// A compensation attempt was dispatched
    Prepared {
        /// Event whose downstream processing failed
        event_id: EventRef,
        /// Function being compensated
        function: FunctionInfo,
        /// Retry bookkeeping of the dispatched attempt
        retry_state: RetryState,
    },
    /// The prepared attempt failed again
    FailedApplied {
        /// Captured error of the failed attempt
        error: ErrorDetails,
        /// When the attempt ran
        execute_at: DateTime<Utc>,
        /// Updated failure classification
        recoverable: RecoverableType,
    },
    /// The prepared attempt succeeded
    SuccessApplied {
        /// When the attempt ran
        execute_at: DateTime<Utc>,
    },
    /// The record's retry policy was replaced
    RetrySpecApplied {
        /// The new policy
        retry_spec: RetrySpec,
    },
    /// The failure was re-classified
    RecoverableMarked {
        /// The new classification
        recoverable: RecoverableType,
    },
    /// The record was pointed at a different function
    FunctionChanged {
        /// The new function identity
        function: FunctionInfo,
    },
}

impl EventBody for ExecutionFailedEvent {
    fn event_name(&self) -> &'static str {
        match self {
            ExecutionFailedEvent::Created { .. } => "execution_failed_created",
            ExecutionFailedEvent::Prepared { .. } => "compensation_prepared",
            ExecutionFailedEvent::FailedApplied { .. } => "execution_failed_applied",
            ExecutionFailedEvent::SuccessApplied { .. } => "execution_success_applied",
            ExecutionFailedEvent::RetrySpecApplied { .. } => "retry_spec_applied",
            ExecutionFailedEvent::RecoverableMarked { .. } => "recoverable_marked",
            ExecutionFailedEvent::FunctionChanged { .. } => "function_changed",
        }
    }
}

/// State of one failed-execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailedState {
    /// Record id (the aggregate instance id)
    pub id: String,
    /// Event whose downstream processing failed; set by creation
    pub event_id: Option<EventRef>,
    /// Function that failed; set by creation
    pub function: Option<FunctionInfo>,
    /// Most recently captured error
    pub error: Option<ErrorDetails>,
    /// When the most recent execution ran
    pub execute_at: Option<DateTime<Utc>>,
    /// Policy governing this record
    pub retry_spec: RetrySpec,
    /// Retry bookkeeping; set by creation
    pub retry_state: Option<RetryState>,
    /// Lifecycle status
    pub status: ExecutionFailedStatus,
    /// Failure classification
    pub recoverable: RecoverableType,
}

impl ExecutionFailedState {
    /// Attempts made so far
    pub fn retries(&self) -> u32 {
        self.retry_state.map(|state| state.retries).unwrap_or(0)
    }

    /// Whether the attempt budget is not yet exhausted
    pub fn is_below_retry_threshold(&self) -> bool {
        self.retries() < self.retry_spec.max_retries
    }

    /// Whether the record can still be retried at all
    pub fn is_retryable(&self) -> bool {
        self.status != ExecutionFailedStatus::Succeeded && self.is_below_retry_threshold()
    }

    /// Whether a compensation attempt may be forced right now
    ///
    /// A prepared record becomes forceable again only once its execution
    /// timeout has passed; a failed record always is; a succeeded record
    /// never.
    pub fn can_force_retry(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ExecutionFailedStatus::Succeeded => false,
            ExecutionFailedStatus::Failed => true,
            ExecutionFailedStatus::Prepared => self
                .retry_state
                .map(|state| state.timed_out(now))
                .unwrap_or(false),
        }
    }

    /// Whether a scheduled compensation attempt is permitted right now
    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.can_force_retry(now) && self.is_below_retry_threshold()
    }

    /// [`can_retry`](Self::can_retry) plus the backoff threshold
    pub fn can_next_retry(&self, now: DateTime<Utc>) -> bool {
        if !self.can_retry(now) {
            return false;
        }
        self.retry_state
            .map(|state| now >= state.next_retry_at)
            .unwrap_or(false)
    }

    /// The scheduler's eligibility predicate
    ///
    /// `recoverable != Unrecoverable AND is_retryable AND next_retry_at <=
    /// now AND (status = Failed OR (status = Prepared AND timeout_at <=
    /// now))`.
    pub fn is_eligible_for_retry(&self, now: DateTime<Utc>) -> bool {
        self.recoverable != RecoverableType::Unrecoverable && self.can_next_retry(now)
    }
}

impl StateRoot for ExecutionFailedState {
    type Event = ExecutionFailedEvent;

    fn initialize(aggregate_id: &AggregateId) -> Self {
        Self {
            id: aggregate_id.id.clone(),
            event_id: None,
            function: None,
            error: None,
            execute_at: None,
            retry_spec: RetrySpec::default(),
            retry_state: None,
            status: ExecutionFailedStatus::Failed,
            recoverable: RecoverableType::Unknown,
        }
    }

    fn on_sourcing(&mut self, event: &Self::Event) {
        match event {
            ExecutionFailedEvent::Created {
                event_id,
                function,
                error,
                execute_at,
                retry_state,
                retry_spec,
                recoverable,
            } => {
                self.event_id = Some(event_id.clone());
                self.function = Some(function.clone());
                self.error = Some(error.clone());
                self.execute_at = Some(*execute_at);
                self.retry_state = Some(*retry_state);
                self.retry_spec = *retry_spec;
                self.status = ExecutionFailedStatus::Failed;
                self.recoverable = *recoverable;
            }
            ExecutionFailedEvent::Prepared { retry_state, .. } => {
                self.retry_state = Some(*retry_state);
                self.status = ExecutionFailedStatus::Prepared;
            }
            ExecutionFailedEvent::FailedApplied {
                error,
                execute_at,
                recoverable,
            } => {
                self.error = Some(error.clone());
                self.execute_at = Some(*execute_at);
                self.status = ExecutionFailedStatus::Failed;
                self.recoverable = *recoverable;
            }
            ExecutionFailedEvent::SuccessApplied { execute_at } => {
                self.execute_at = Some(*execute_at);
                self.status = ExecutionFailedStatus::Succeeded;
            }
            ExecutionFailedEvent::RetrySpecApplied { retry_spec } => {
                self.retry_spec = *retry_spec;
            }
            ExecutionFailedEvent::RecoverableMarked { recoverable } => {
                self.recoverable = *recoverable;
            }
            ExecutionFailedEvent::FunctionChanged { function } => {
                self.function = Some(function.clone());
            }
        }
    }
}

/// Collaborators injected into the compensation command handlers
pub struct CompensationServices {
    /// Deployment-default retry policy
    pub retry_spec: RetrySpec,
    /// Backoff curve
    pub calculator: Arc<dyn NextRetryAtCalculator>,
}

impl CompensationServices {
    /// Create services with the default backoff calculator
    pub fn new(retry_spec: RetrySpec, calculator: Arc<dyn NextRetryAtCalculator>) -> Self {
        Self {
            retry_spec,
            calculator,
        }
    }
}

/// The failed-execution aggregate
pub struct ExecutionFailed;

impl ExecutionFailed {
    fn prepared(
        state: &StateAggregate<ExecutionFailedState>,
        services: &CompensationServices,
        now: DateTime<Utc>,
    ) -> DomainResult<ExecutionFailedEvent> {
        let record = state.state();
        let event_id = record.event_id.clone().ok_or_else(|| {
            DomainError::invalid_operation("execution failure record is not initialized")
        })?;
        let function = record.function.clone().ok_or_else(|| {
            DomainError::invalid_operation("execution failure record has no function")
        })?;
        let retries = record.retries() + 1;
        let retry_state = services
            .calculator
            .next_retry_state(&record.retry_spec, retries, now);
        Ok(ExecutionFailedEvent::Prepared {
            event_id,
            function,
            retry_state,
        })
    }
}

impl Aggregate for ExecutionFailed {
    type State = ExecutionFailedState;
    type Command = ExecutionFailedCommand;
    type Event = ExecutionFailedEvent;
    type Services = CompensationServices;

    fn execute(
        state: &StateAggregate<Self::State>,
        command: &CommandMessage<Self::Command>,
        services: &Self::Services,
    ) -> DomainResult<Vec<Self::Event>> {
        let record = state.state();
        let now = Utc::now();
        match &command.body {
            ExecutionFailedCommand::Create {
                event_id,
                function,
                error,
                execute_at,
                retry_spec,
                recoverable,
            } => {
                let retry_state =
                    services
                        .calculator
                        .next_retry_state(&services.retry_spec, 0, *execute_at);
                Ok(vec![ExecutionFailedEvent::Created {
                    event_id: event_id.clone(),
                    function: function.clone(),
                    error: error.clone(),
                    execute_at: *execute_at,
                    retry_state,
                    retry_spec: (*retry_spec).unwrap_or(services.retry_spec),
                    recoverable: *recoverable,
                }])
            }
            ExecutionFailedCommand::Prepare => {
                if !record.can_retry(now) {
                    return Err(DomainError::invalid_operation(format!(
                        "execution failure {} can not retry",
                        record.id
                    )));
                }
                Ok(vec![Self::prepared(state, services, now)?])
            }
            ExecutionFailedCommand::ForcePrepare => {
                if !record.can_force_retry(now) {
                    return Err(DomainError::invalid_operation(format!(
                        "execution failure {} can not force retry",
                        record.id
                    )));
                }
                Ok(vec![Self::prepared(state, services, now)?])
            }
            ExecutionFailedCommand::ApplyFailed {
                error,
                execute_at,
                recoverable,
            } => {
                if record.status != ExecutionFailedStatus::Prepared {
                    return Err(DomainError::invalid_operation(format!(
                        "execution failure {} is not prepared",
                        record.id
                    )));
                }
                Ok(vec![ExecutionFailedEvent::FailedApplied {
                    error: error.clone(),
                    execute_at: *execute_at,
                    recoverable: *recoverable,
                }])
            }
            ExecutionFailedCommand::ApplySuccess { execute_at } => {
                if record.status != ExecutionFailedStatus::Prepared {
                    return Err(DomainError::invalid_operation(format!(
                        "execution failure {} is not prepared",
                        record.id
                    )));
                }
                Ok(vec![ExecutionFailedEvent::SuccessApplied {
                    execute_at: *execute_at,
                }])
            }
            ExecutionFailedCommand::ApplyRetrySpec { retry_spec } => {
                Ok(vec![ExecutionFailedEvent::RetrySpecApplied {
                    retry_spec: *retry_spec,
                }])
            }
            ExecutionFailedCommand::MarkRecoverable { recoverable } => {
                if record.recoverable == *recoverable {
                    return Err(DomainError::ValidationError(format!(
                        "execution failure {} is already marked {recoverable:?}",
                        record.id
                    )));
                }
                Ok(vec![ExecutionFailedEvent::RecoverableMarked {
                    recoverable: *recoverable,
                }])
            }
            ExecutionFailedCommand::ChangeFunction { function } => {
                let same = record
                    .function
                    .as_ref()
                    .map(|current| current.is_same_function(function))
                    .unwrap_or(false);
                if same {
                    return Err(DomainError::ValidationError(format!(
                        "execution failure {} already points at that function",
                        record.id
                    )));
                }
                Ok(vec![ExecutionFailedEvent::FunctionChanged {
                    function: function.clone(),
                }])
            }
        }
    }
}
