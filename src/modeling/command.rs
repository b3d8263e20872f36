// Copyright 2025 Eventum Contributors.

//! Command messages and aggregate registration
//!
//! Commands are requests to change one aggregate. They carry everything the
//! processor needs to enforce the engine's guarantees: an idempotency key
//! (`request_id`), an optional expected version, create/recovery routing
//! flags and the acting owner. Aggregate types register their routing
//! metadata explicitly through [`AggregateMetadata`] built at startup; there
//! is no runtime scanning.

use crate::errors::DomainResult;
use crate::events::EventBody;
use crate::modeling::state::{StateAggregate, StateRoot};
use crate::modeling::{AggregateId, NamedAggregate};
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::marker::PhantomData;
use uuid::Uuid;

/// A command addressed at one aggregate instance
///
/// `request_id` defaults to `command_id`; resending a command with the same
/// `request_id` is safe, the event store rejects the second commit with a
/// duplicate-request error instead of applying it twice.
#[derive(Debug, Clone)]
pub struct CommandMessage<C> {
    /// Unique id of this command message
    pub command_id: String,
    /// Idempotency key, unique per aggregate id
    pub request_id: String,
    /// The aggregate instance this command targets
    pub aggregate_id: AggregateId,
    /// Acting owner; empty means "no ownership claim"
    pub owner_id: String,
    /// When present, the aggregate's version must equal this exactly
    pub expected_version: Option<u64>,
    /// Whether this command creates the aggregate
    pub is_create: bool,
    /// Whether this command may create the aggregate if it does not exist
    pub allow_create: bool,
    /// When the command was issued
    pub create_time: DateTime<Utc>,
    /// The command body
    pub body: C,
}

impl<C> CommandMessage<C> {
    /// Create a command message with generated ids
    pub fn new(aggregate_id: AggregateId, body: C) -> Self {
        let command_id = Uuid::new_v4().to_string();
        Self {
            request_id: command_id.clone(),
            command_id,
            aggregate_id,
            owner_id: String::new(),
            expected_version: None,
            is_create: false,
            allow_create: false,
            create_time: Utc::now(),
            body,
        }
    }

    /// Mark this command as creating the aggregate
    pub fn create(mut self) -> Self {
        self.is_create = true;
        self
    }

    /// Allow this command to create the aggregate when it does not exist yet
    pub fn create_if_absent(mut self) -> Self {
        self.allow_create = true;
        self
    }

    /// Set an explicit idempotency key
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Require the aggregate to be at an exact version
    pub fn with_expected_version(mut self, expected_version: u64) -> Self {
        self.expected_version = Some(expected_version);
        self
    }

    /// Set the acting owner
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }
}

/// An event-sourced aggregate type
///
/// One implementation per aggregate. `execute` is the aggregate's command
/// handler: a pure function of the current state, the command and the
/// explicitly injected services, returning the pending events or a domain
/// error. It must not perform I/O and must not mutate anything; the
/// processor applies the returned events and persists them.
pub trait Aggregate: Send + Sync + 'static {
    /// The aggregate's state root
    type State: StateRoot<Event = Self::Event>;
    /// The aggregate's command enum
    type Command: Debug + Send + Sync + 'static;
    /// The aggregate's event enum
    type Event: EventBody;
    /// Collaborators injected into the command handler
    type Services: Send + Sync + 'static;

    /// Decide a command against the current state
    fn execute(
        state: &StateAggregate<Self::State>,
        command: &CommandMessage<Self::Command>,
        services: &Self::Services,
    ) -> DomainResult<Vec<Self::Event>>;

    /// Whether the command recovers a deleted aggregate
    ///
    /// Recovery commands are the only commands accepted by a deleted
    /// aggregate.
    fn is_recovery(_command: &Self::Command) -> bool {
        false
    }
}

/// Constructed-once registration record for an aggregate type
///
/// Binds an [`Aggregate`] implementation to its [`NamedAggregate`] and acts
/// as the factory for its [`AggregateId`]s. Built at startup and shared by
/// `Arc`; nothing in the engine consults a global registry.
#[derive(Debug)]
pub struct AggregateMetadata<A: Aggregate> {
    named_aggregate: NamedAggregate,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateMetadata<A> {
    /// Register an aggregate type under a context and aggregate name
    pub fn new(context_name: impl Into<String>, aggregate_name: impl Into<String>) -> Self {
        Self {
            named_aggregate: NamedAggregate::new(context_name, aggregate_name),
            _marker: PhantomData,
        }
    }

    /// The registered name
    pub fn named_aggregate(&self) -> &NamedAggregate {
        &self.named_aggregate
    }

    /// Create an id for one instance of this aggregate type
    pub fn aggregate_id(&self, id: impl Into<String>) -> AggregateId {
        self.named_aggregate.aggregate_id(id)
    }

    /// Create an id for one instance in an explicit tenant
    pub fn aggregate_id_with_tenant(
        &self,
        id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> AggregateId {
        AggregateId::with_tenant(self.named_aggregate.clone(), id, tenant_id)
    }
}
