// Copyright 2025 Eventum Contributors.

//! Compensation scheduler
//!
//! Periodically finds failed executions whose backoff has elapsed and
//! re-drives them by sending `Prepare` commands through the normal command
//! pipeline. The scheduler only dispatches; the compensating work itself
//! runs wherever the prepared command's consumers run.

use crate::compensation::domain::{ExecutionFailed, ExecutionFailedCommand, ExecutionFailedState};
use crate::eventsourcing::{
    EventStore, RepositoryError, SnapshotRepository, StateAggregateRepository,
};
use crate::messaging::CommandGateway;
use crate::modeling::{AggregateId, AggregateMetadata, CommandMessage};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Scheduling parameters of the compensation job
#[derive(Debug, Clone)]
pub struct CompensationScheduleConfig {
    /// Maximum records re-driven per tick
    pub batch_size: usize,
    /// Delay before the first tick
    pub initial_delay: Duration,
    /// Interval between ticks
    pub period: Duration,
}

impl Default for CompensationScheduleConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            initial_delay: Duration::from_secs(10),
            period: Duration::from_secs(60),
        }
    }
}

/// One record eligible for a compensation attempt
#[derive(Debug, Clone)]
pub struct RetryCandidate {
    /// The failed-execution record's aggregate id
    pub aggregate_id: AggregateId,
    /// The record's aggregate version, used for oldest-first fairness
    pub version: u64,
    /// The record's state at selection time
    pub state: ExecutionFailedState,
}

/// Query for failed executions whose next retry is due
#[async_trait]
pub trait FindNextRetry: Send + Sync {
    /// Up to `limit` eligible records, ordered by ascending version
    async fn find_next_retry(&self, limit: usize) -> Result<Vec<RetryCandidate>, RepositoryError>;
}

/// Dispatch port for `Prepare` compensation commands
#[async_trait]
pub trait CompensationGateway: Send + Sync {
    /// Send a prepare-compensation command for one record
    async fn prepare_compensation(&self, aggregate_id: &AggregateId) -> Result<(), String>;
}

#[async_trait]
impl<ES, SR> CompensationGateway for CommandGateway<ExecutionFailed, ES, SR>
where
    ES: EventStore + 'static,
    SR: SnapshotRepository + 'static,
{
    async fn prepare_compensation(&self, aggregate_id: &AggregateId) -> Result<(), String> {
        let result = self
            .send(CommandMessage::new(
                aggregate_id.clone(),
                ExecutionFailedCommand::Prepare,
            ))
            .await;
        if result.is_succeeded() {
            Ok(())
        } else {
            Err(format!("{}: {}", result.error_code, result.error_msg))
        }
    }
}

/// [`FindNextRetry`] over the engine's own stores
///
/// Walks every failed-execution aggregate id through the event store's
/// cursor scan, materializes each record through the state repository and
/// applies the eligibility predicate. A dedicated indexed query service is
/// the production-scale alternative behind the same trait.
pub struct ScanningExecutionFailedQuery<ES, SR> {
    repository: Arc<StateAggregateRepository<ES, SR>>,
    metadata: Arc<AggregateMetadata<ExecutionFailed>>,
    scan_page_size: usize,
}

impl<ES, SR> ScanningExecutionFailedQuery<ES, SR>
where
    ES: EventStore,
    SR: SnapshotRepository,
{
    /// Create a scanning query
    pub fn new(
        repository: Arc<StateAggregateRepository<ES, SR>>,
        metadata: Arc<AggregateMetadata<ExecutionFailed>>,
    ) -> Self {
        Self {
            repository,
            metadata,
            scan_page_size: 256,
        }
    }
}

#[async_trait]
impl<ES, SR> FindNextRetry for ScanningExecutionFailedQuery<ES, SR>
where
    ES: EventStore,
    SR: SnapshotRepository,
{
    async fn find_next_retry(&self, limit: usize) -> Result<Vec<RetryCandidate>, RepositoryError> {
        let now = Utc::now();
        let named = self.metadata.named_aggregate();
        let mut candidates = Vec::new();
        let mut cursor = String::new();

        loop {
            let page = self
                .repository
                .event_store()
                .scan_aggregate_id(named, &cursor, self.scan_page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page
                .last()
                .map(|id| id.id.clone())
                .unwrap_or_default();
            for aggregate_id in page {
                let state_aggregate = self
                    .repository
                    .load::<ExecutionFailedState>(&aggregate_id)
                    .await?;
                if !state_aggregate.initialized() {
                    continue;
                }
                if state_aggregate.state().is_eligible_for_retry(now) {
                    candidates.push(RetryCandidate {
                        aggregate_id,
                        version: state_aggregate.version(),
                        state: state_aggregate.state().clone(),
                    });
                }
            }
        }

        // Oldest first for fairness.
        candidates.sort_by_key(|candidate| candidate.version);
        candidates.truncate(limit);
        Ok(candidates)
    }
}

/// Periodic and on-demand re-driver of failed executions
pub struct CompensationScheduler<Q> {
    query: Arc<Q>,
    gateway: Arc<dyn CompensationGateway>,
    config: CompensationScheduleConfig,
}

impl<Q: FindNextRetry + 'static> CompensationScheduler<Q> {
    /// Create a scheduler
    pub fn new(
        query: Arc<Q>,
        gateway: Arc<dyn CompensationGateway>,
        config: CompensationScheduleConfig,
    ) -> Self {
        Self {
            query,
            gateway,
            config,
        }
    }

    /// Run one scheduling tick; returns the number of successful dispatches
    ///
    /// One record's dispatch failure is logged and skipped, it neither fails
    /// the batch nor blocks the other records.
    pub async fn tick(&self) -> usize {
        let candidates = match self.query.find_next_retry(self.config.batch_size).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "failed to query retryable executions");
                return 0;
            }
        };
        if candidates.is_empty() {
            debug!("no executions due for compensation");
            return 0;
        }

        let dispatches = candidates.iter().map(|candidate| {
            let gateway = self.gateway.clone();
            async move {
                let outcome = gateway.prepare_compensation(&candidate.aggregate_id).await;
                (candidate.aggregate_id.clone(), outcome)
            }
        });
        let mut succeeded = 0;
        for (aggregate_id, outcome) in futures::future::join_all(dispatches).await {
            match outcome {
                Ok(()) => succeeded += 1,
                Err(err) => warn!(
                    aggregate_id = %aggregate_id,
                    error = %err,
                    "failed to dispatch compensation"
                ),
            }
        }
        info!(
            candidates = candidates.len(),
            succeeded, "compensation tick finished"
        );
        succeeded
    }

    /// Spawn the periodic scheduling loop
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.initial_delay).await;
            let mut interval = tokio::time::interval(self.config.period.max(Duration::from_millis(1)));
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}
