// Copyright 2025 Eventum Contributors.

//! Compensation: detecting and re-driving failed executions
//!
//! A command whose asynchronous side effects fail is not an exception
//! propagated back to the original caller; the failure is recorded as data,
//! an [`ExecutionFailedState`] owned by the event-sourced [`ExecutionFailed`]
//! aggregate, and re-driven by the [`CompensationScheduler`] under a bounded
//! backoff policy until it succeeds or becomes permanently non-retryable.

mod calculator;
mod domain;
mod retry;
mod scheduler;

pub use calculator::{DefaultNextRetryAtCalculator, NextRetryAtCalculator};
pub use domain::{
    execution_failed_metadata, CompensationServices, ExecutionFailed, ExecutionFailedCommand,
    ExecutionFailedEvent, ExecutionFailedState, EXECUTION_FAILED_AGGREGATE_NAME,
    EXECUTION_FAILED_CONTEXT_NAME,
};
pub use retry::{
    ErrorDetails, EventRef, ExecutionFailedStatus, FunctionInfo, FunctionKind, RecoverableType,
    RetrySpec, RetryState,
};
pub use scheduler::{
    CompensationGateway, CompensationScheduleConfig, CompensationScheduler, FindNextRetry,
    RetryCandidate, ScanningExecutionFailedQuery,
};
