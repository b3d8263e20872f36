// Copyright 2025 Eventum Contributors.

//! Per-aggregate-id command serialization
//!
//! The central concurrency invariant of the engine: at most one in-flight
//! command cycle per aggregate id. Commands are routed by id hash onto a
//! fixed set of worker tasks, each draining its own queue, so one id never
//! runs two cycles concurrently while distinct ids proceed in parallel.
//! This is what makes the conflict-retry loop converge under contention.

use crate::eventsourcing::{EventStore, EventStoreError, SnapshotRepository, SnapshotSaver};
use crate::messaging::EventBus;
use crate::modeling::command::{Aggregate, CommandMessage};
use crate::modeling::command_aggregate::{CommandError, Processed};
use crate::modeling::retryable::RetryableProcessor;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Dispatcher sizing
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks; each owns one queue of aggregate ids
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

struct Job<A: Aggregate> {
    command: CommandMessage<A::Command>,
    reply: oneshot::Sender<Result<Processed<A::State>, CommandError>>,
}

/// Routes commands onto per-id-affine worker tasks
///
/// After a successful cycle the worker publishes the committed stream to
/// the event bus and offers the new state to the snapshot saver, still on
/// the aggregate's worker, so downstream effects observe per-id order.
/// Publish and snapshot failures are logged and do not fail the command:
/// the stream is already durable.
pub struct AggregateDispatcher<A: Aggregate, ES, SR> {
    senders: Vec<mpsc::UnboundedSender<Job<A>>>,
    workers: Vec<JoinHandle<()>>,
    _marker: std::marker::PhantomData<fn() -> (ES, SR)>,
}

impl<A, ES, SR> AggregateDispatcher<A, ES, SR>
where
    A: Aggregate,
    ES: EventStore + 'static,
    SR: SnapshotRepository + 'static,
{
    /// Spawn the worker tasks and return the dispatcher
    pub fn new(
        processor: Arc<RetryableProcessor<A, ES, SR>>,
        event_bus: Arc<dyn EventBus>,
        snapshot_saver: Option<Arc<SnapshotSaver<SR>>>,
        config: DispatcherConfig,
    ) -> Self {
        let worker_count = config.workers.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let (sender, mut receiver) = mpsc::unbounded_channel::<Job<A>>();
            let processor = processor.clone();
            let event_bus = event_bus.clone();
            let snapshot_saver = snapshot_saver.clone();
            workers.push(tokio::spawn(async move {
                debug!(worker_index, "command worker started");
                while let Some(job) = receiver.recv().await {
                    let result = processor.process(&job.command).await;
                    if let Ok(processed) = &result {
                        if let Some(stream) = &processed.stream {
                            if let Err(err) = event_bus.publish(stream).await {
                                warn!(
                                    aggregate_id = %stream.aggregate_id,
                                    version = stream.version,
                                    error = %err,
                                    "failed to publish committed stream"
                                );
                            }
                        }
                        if let Some(saver) = &snapshot_saver {
                            if let Err(err) = saver.handle(&processed.state_aggregate).await {
                                warn!(
                                    aggregate_id = %processed.state_aggregate.aggregate_id(),
                                    error = %err,
                                    "failed to capture snapshot"
                                );
                            }
                        }
                    }
                    // The caller may have given up waiting; that's fine.
                    let _ = job.reply.send(result);
                }
                debug!(worker_index, "command worker stopped");
            }));
            senders.push(sender);
        }
        Self {
            senders,
            workers,
            _marker: std::marker::PhantomData,
        }
    }

    /// Submit a command to its aggregate's worker and await the outcome
    pub async fn dispatch(
        &self,
        command: CommandMessage<A::Command>,
    ) -> Result<Processed<A::State>, CommandError> {
        if self.senders.is_empty() {
            return Err(unavailable(&command.aggregate_id));
        }
        let worker = self.worker_for(&command);
        let (reply, response) = oneshot::channel();
        let aggregate_id = command.aggregate_id.clone();
        self.senders[worker]
            .send(Job { command, reply })
            .map_err(|_| unavailable(&aggregate_id))?;
        response.await.map_err(|_| unavailable(&aggregate_id))?
    }

    fn worker_for(&self, command: &CommandMessage<A::Command>) -> usize {
        let mut hasher = DefaultHasher::new();
        command.aggregate_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Stop accepting commands and abort the worker tasks
    pub fn shutdown(&mut self) {
        self.senders.clear();
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl<A: Aggregate, ES, SR> Drop for AggregateDispatcher<A, ES, SR> {
    fn drop(&mut self) {
        // Senders drop with self; workers drain their queues and exit.
        for worker in &self.workers {
            worker.abort();
        }
    }
}

fn unavailable(aggregate_id: &crate::modeling::AggregateId) -> CommandError {
    CommandError::Store(EventStoreError::StorageError(format!(
        "command worker for {aggregate_id} is unavailable"
    )))
}
