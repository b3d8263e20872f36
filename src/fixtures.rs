// Copyright 2025 Eventum Contributors.

//! Shared test aggregate used by unit tests across modules

use crate::errors::{DomainError, DomainResult};
use crate::events::EventBody;
use crate::modeling::{
    Aggregate, AggregateId, AggregateMetadata, CommandMessage, StateAggregate, StateRoot,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    Opened { owner: String, initial: u64 },
    Deposited { amount: u64 },
    Withdrawn { amount: u64 },
    Closed,
    Reopened,
}

impl EventBody for AccountEvent {
    fn event_name(&self) -> &'static str {
        match self {
            AccountEvent::Opened { .. } => "account_opened",
            AccountEvent::Deposited { .. } => "account_deposited",
            AccountEvent::Withdrawn { .. } => "account_withdrawn",
            AccountEvent::Closed => "account_closed",
            AccountEvent::Reopened => "account_reopened",
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, AccountEvent::Closed)
    }

    fn is_recover(&self) -> bool {
        matches!(self, AccountEvent::Reopened)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountCommand {
    Open { initial: u64 },
    Deposit { amount: u64 },
    Withdraw { amount: u64 },
    /// Create-or-update: opens the account when absent, deposits otherwise.
    Credit { amount: u64 },
    Close,
    Reopen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: u64,
}

impl StateRoot for AccountState {
    type Event = AccountEvent;

    fn initialize(_aggregate_id: &AggregateId) -> Self {
        Self { balance: 0 }
    }

    fn on_sourcing(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Opened { initial, .. } => self.balance = *initial,
            AccountEvent::Deposited { amount } => self.balance += amount,
            AccountEvent::Withdrawn { amount } => self.balance -= amount,
            AccountEvent::Closed | AccountEvent::Reopened => {}
        }
    }
}

pub struct Account;

impl Aggregate for Account {
    type State = AccountState;
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Services = ();

    fn execute(
        state: &StateAggregate<Self::State>,
        command: &CommandMessage<Self::Command>,
        _services: &Self::Services,
    ) -> DomainResult<Vec<Self::Event>> {
        match &command.body {
            AccountCommand::Open { initial } => Ok(vec![AccountEvent::Opened {
                owner: command.owner_id.clone(),
                initial: *initial,
            }]),
            AccountCommand::Deposit { amount } => {
                Ok(vec![AccountEvent::Deposited { amount: *amount }])
            }
            AccountCommand::Withdraw { amount } => {
                if *amount > state.state().balance {
                    return Err(DomainError::BusinessRuleViolation {
                        rule: "withdrawal exceeds balance".to_string(),
                    });
                }
                Ok(vec![AccountEvent::Withdrawn { amount: *amount }])
            }
            AccountCommand::Credit { amount } => {
                if state.initialized() {
                    Ok(vec![AccountEvent::Deposited { amount: *amount }])
                } else {
                    Ok(vec![AccountEvent::Opened {
                        owner: command.owner_id.clone(),
                        initial: *amount,
                    }])
                }
            }
            AccountCommand::Close => Ok(vec![AccountEvent::Closed]),
            AccountCommand::Reopen => Ok(vec![AccountEvent::Reopened]),
        }
    }

    fn is_recovery(command: &Self::Command) -> bool {
        matches!(command, AccountCommand::Reopen)
    }
}

pub fn account_metadata() -> AggregateMetadata<Account> {
    AggregateMetadata::new("banking", "account")
}
