//! # Eventum
//!
//! An event-sourced aggregate execution engine. A command becomes a durable,
//! version-ordered stream of events; aggregate state is reconstructed by
//! replaying (or snapshot-accelerating) those streams; write conflicts are
//! detected at commit time through optimistic concurrency and resolved by a
//! bounded reload-and-retry loop; resent commands are de-duplicated by
//! request id. A compensation subsystem records commands whose asynchronous
//! side effects failed and re-drives them under a configurable backoff
//! policy until they succeed or become permanently non-retryable.
//!
//! ## Design principles
//!
//! 1. **Events are the only writes**: state changes exclusively by sourcing
//!    committed event streams, never by direct mutation.
//! 2. **Optimistic concurrency is the only lock**: the event store rejects
//!    an occupied version slot; there is no external locking.
//! 3. **Per-id serialization**: at most one in-flight command cycle per
//!    aggregate id, ids spread across parallel workers.
//! 4. **Explicit registration**: aggregate types, their event enums and
//!    routing metadata are declared in code and wired at startup; nothing is
//!    discovered by scanning or reflection.
//! 5. **Typed failure taxonomy**: conflicts retry, idempotency and
//!    validation failures fail fast, infrastructure failures surface
//!    distinctly.
//! 6. **Failures are data**: a failed downstream execution becomes an
//!    event-sourced record with its own retry lifecycle, not an exception.
//!
//! ## Walkthrough
//!
//! ```rust
//! use eventum::{
//!     Aggregate, AggregateDispatcher, AggregateId, AggregateMetadata,
//!     CommandAggregateProcessor, CommandGateway, CommandMessage, DispatcherConfig,
//!     DomainResult, EventBody, InMemoryEventStore, InMemorySnapshotRepository,
//!     NullEventBus, RetryConfig, RetryableProcessor, StateAggregate,
//!     StateAggregateRepository, StateRoot,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum TicketEvent {
//!     Opened { title: String },
//! }
//!
//! impl EventBody for TicketEvent {
//!     fn event_name(&self) -> &'static str {
//!         "ticket_opened"
//!     }
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct TicketState {
//!     title: String,
//! }
//!
//! impl StateRoot for TicketState {
//!     type Event = TicketEvent;
//!
//!     fn initialize(_aggregate_id: &AggregateId) -> Self {
//!         Self { title: String::new() }
//!     }
//!
//!     fn on_sourcing(&mut self, event: &Self::Event) {
//!         match event {
//!             TicketEvent::Opened { title } => self.title = title.clone(),
//!         }
//!     }
//! }
//!
//! struct Ticket;
//!
//! #[derive(Debug)]
//! enum TicketCommand {
//!     Open { title: String },
//! }
//!
//! impl Aggregate for Ticket {
//!     type State = TicketState;
//!     type Command = TicketCommand;
//!     type Event = TicketEvent;
//!     type Services = ();
//!
//!     fn execute(
//!         _state: &StateAggregate<Self::State>,
//!         command: &CommandMessage<Self::Command>,
//!         _services: &Self::Services,
//!     ) -> DomainResult<Vec<Self::Event>> {
//!         match &command.body {
//!             TicketCommand::Open { title } => {
//!                 Ok(vec![TicketEvent::Opened { title: title.clone() }])
//!             }
//!         }
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let metadata = Arc::new(AggregateMetadata::<Ticket>::new("support", "ticket"));
//! let event_store = Arc::new(InMemoryEventStore::new());
//! let snapshots = Arc::new(InMemorySnapshotRepository::new());
//! let repository = Arc::new(StateAggregateRepository::new(event_store.clone(), snapshots));
//! let processor = Arc::new(RetryableProcessor::new(
//!     CommandAggregateProcessor::new(metadata.clone(), event_store, Arc::new(())),
//!     repository,
//!     RetryConfig::default(),
//! ));
//! let dispatcher = AggregateDispatcher::new(
//!     processor,
//!     Arc::new(NullEventBus),
//!     None,
//!     DispatcherConfig::default(),
//! );
//! let gateway = CommandGateway::new(dispatcher, Duration::from_secs(5));
//!
//! let ticket_id = metadata.aggregate_id("ticket-1");
//! let result = gateway
//!     .send(
//!         CommandMessage::new(
//!             ticket_id,
//!             TicketCommand::Open { title: "login broken".to_string() },
//!         )
//!         .create(),
//!     )
//!     .await;
//! assert!(result.is_succeeded());
//! assert_eq!(result.version, Some(1));
//! # }
//! ```

#![warn(missing_docs)]

pub mod compensation;
mod errors;
mod events;
pub mod eventsourcing;
pub mod messaging;
pub mod modeling;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export the core surface
pub use errors::{DomainError, DomainResult};
pub use events::{DomainEvent, EventBody, EventStream};
pub use eventsourcing::{
    check_version_range, CachingSnapshotRepository, EventStore, EventStoreError,
    InMemoryEventStore, InMemorySnapshotRepository, RepositoryError, Snapshot, SnapshotError,
    SnapshotPolicy, SnapshotRecord, SnapshotRepository, SnapshotSaver, StateAggregateRepository,
};
pub use messaging::{
    BusError, CommandBus, CommandGateway, CommandResult, CommandStage, CommandStatus, EventBus,
    InMemoryCommandBus, InMemoryEventBus, NullEventBus,
};
pub use modeling::{
    Aggregate, AggregateDispatcher, AggregateId, AggregateMetadata, CommandAggregateProcessor,
    CommandError, CommandMessage, CommandState, DispatcherConfig, NamedAggregate, Processed,
    RetryConfig, RetryableProcessor, SourcingError, StateAggregate, StateRoot,
    DEFAULT_TENANT_ID, INITIAL_VERSION, UNINITIALIZED_VERSION,
};

pub use compensation::{
    execution_failed_metadata, CompensationGateway, CompensationScheduleConfig,
    CompensationScheduler, CompensationServices, DefaultNextRetryAtCalculator, ErrorDetails,
    EventRef, ExecutionFailed, ExecutionFailedCommand, ExecutionFailedEvent, ExecutionFailedState,
    ExecutionFailedStatus, FindNextRetry, FunctionInfo, FunctionKind, NextRetryAtCalculator,
    RecoverableType, RetryCandidate, RetrySpec, RetryState, ScanningExecutionFailedQuery,
};
