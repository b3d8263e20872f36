// Copyright 2025 Eventum Contributors.

//! Shared wallet aggregate and wiring helpers for the specification suites

// Not every suite uses every helper.
#![allow(dead_code)]

use eventum::{
    Aggregate, AggregateDispatcher, AggregateId, AggregateMetadata, CommandAggregateProcessor,
    CommandGateway, CommandMessage, DispatcherConfig, DomainError, DomainResult, EventBody,
    EventStream, InMemoryEventStore, InMemorySnapshotRepository, NullEventBus, RetryConfig,
    RetryableProcessor, StateAggregate, StateAggregateRepository, StateRoot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletEvent {
    Created { owner: String, initial: u64 },
    Credited { amount: u64 },
    Debited { amount: u64 },
    Frozen,
    Unfrozen,
}

impl EventBody for WalletEvent {
    fn event_name(&self) -> &'static str {
        match self {
            WalletEvent::Created { .. } => "wallet_created",
            WalletEvent::Credited { .. } => "wallet_credited",
            WalletEvent::Debited { .. } => "wallet_debited",
            WalletEvent::Frozen => "wallet_frozen",
            WalletEvent::Unfrozen => "wallet_unfrozen",
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, WalletEvent::Frozen)
    }

    fn is_recover(&self) -> bool {
        matches!(self, WalletEvent::Unfrozen)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalletCommand {
    Create { initial: u64 },
    Credit { amount: u64 },
    Debit { amount: u64 },
    /// Create-or-update flavor used by the convergence tests.
    Accrue { amount: u64 },
    Freeze,
    Unfreeze,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletState {
    pub balance: u64,
}

impl StateRoot for WalletState {
    type Event = WalletEvent;

    fn initialize(_aggregate_id: &AggregateId) -> Self {
        Self { balance: 0 }
    }

    fn on_sourcing(&mut self, event: &Self::Event) {
        match event {
            WalletEvent::Created { initial, .. } => self.balance = *initial,
            WalletEvent::Credited { amount } => self.balance += amount,
            WalletEvent::Debited { amount } => self.balance -= amount,
            WalletEvent::Frozen | WalletEvent::Unfrozen => {}
        }
    }
}

pub struct Wallet;

impl Aggregate for Wallet {
    type State = WalletState;
    type Command = WalletCommand;
    type Event = WalletEvent;
    type Services = ();

    fn execute(
        state: &StateAggregate<Self::State>,
        command: &CommandMessage<Self::Command>,
        _services: &Self::Services,
    ) -> DomainResult<Vec<Self::Event>> {
        match &command.body {
            WalletCommand::Create { initial } => Ok(vec![WalletEvent::Created {
                owner: command.owner_id.clone(),
                initial: *initial,
            }]),
            WalletCommand::Credit { amount } => Ok(vec![WalletEvent::Credited { amount: *amount }]),
            WalletCommand::Debit { amount } => {
                if *amount > state.state().balance {
                    return Err(DomainError::BusinessRuleViolation {
                        rule: "debit exceeds balance".to_string(),
                    });
                }
                Ok(vec![WalletEvent::Debited { amount: *amount }])
            }
            WalletCommand::Accrue { amount } => {
                if state.initialized() {
                    Ok(vec![WalletEvent::Credited { amount: *amount }])
                } else {
                    Ok(vec![WalletEvent::Created {
                        owner: command.owner_id.clone(),
                        initial: *amount,
                    }])
                }
            }
            WalletCommand::Freeze => Ok(vec![WalletEvent::Frozen]),
            WalletCommand::Unfreeze => Ok(vec![WalletEvent::Unfrozen]),
        }
    }

    fn is_recovery(command: &Self::Command) -> bool {
        matches!(command, WalletCommand::Unfreeze)
    }
}

pub fn wallet_metadata() -> AggregateMetadata<Wallet> {
    AggregateMetadata::new("payments", "wallet")
}

pub type WalletRepository =
    StateAggregateRepository<InMemoryEventStore, InMemorySnapshotRepository>;

pub struct WalletEngine {
    pub event_store: Arc<InMemoryEventStore>,
    pub snapshots: Arc<InMemorySnapshotRepository>,
    pub repository: Arc<WalletRepository>,
    pub gateway: CommandGateway<Wallet, InMemoryEventStore, InMemorySnapshotRepository>,
}

/// Wire a complete wallet engine over in-memory stores.
pub fn wallet_engine() -> WalletEngine {
    let event_store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotRepository::new());
    let repository = Arc::new(StateAggregateRepository::new(
        event_store.clone(),
        snapshots.clone(),
    ));
    let processor = Arc::new(RetryableProcessor::new(
        CommandAggregateProcessor::new(
            Arc::new(wallet_metadata()),
            event_store.clone(),
            Arc::new(()),
        ),
        repository.clone(),
        RetryConfig::default(),
    ));
    let dispatcher = AggregateDispatcher::new(
        processor,
        Arc::new(NullEventBus),
        None,
        DispatcherConfig::default(),
    );
    WalletEngine {
        event_store,
        snapshots,
        repository,
        gateway: CommandGateway::new(dispatcher, Duration::from_secs(10)),
    }
}

/// Build a raw wallet event stream for direct store manipulation.
pub fn wallet_stream(
    aggregate_id: &AggregateId,
    version: u64,
    request_id: &str,
    bodies: Vec<WalletEvent>,
) -> EventStream {
    EventStream::produce(
        aggregate_id.clone(),
        version,
        format!("cmd-{request_id}"),
        request_id,
        "",
        bodies,
    )
    .expect("non-empty event stream")
}
