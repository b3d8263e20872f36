// Copyright 2025 Eventum Contributors.

//! Aggregate modeling: identity, state, commands, and the processing pipeline
//!
//! An aggregate is a consistency boundary. Everything in this module is keyed
//! by [`AggregateId`]: state is reconstructed per id, commands are serialized
//! per id, and the event store partitions its log per id.

mod command;
mod command_aggregate;
mod dispatcher;
mod retryable;
mod state;

pub use command::{Aggregate, AggregateMetadata, CommandMessage};
pub use command_aggregate::{CommandAggregateProcessor, CommandError, CommandState, Processed};
pub use dispatcher::{AggregateDispatcher, DispatcherConfig};
pub use retryable::{RetryConfig, RetryableProcessor};
pub use state::{SourcingError, StateAggregate, StateRoot};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant id used when no explicit tenant is supplied
pub const DEFAULT_TENANT_ID: &str = "(default)";

/// Version of an aggregate that has never sourced an event
pub const UNINITIALIZED_VERSION: u64 = 0;

/// Version of the first committed event stream of an aggregate
pub const INITIAL_VERSION: u64 = 1;

/// Name of an aggregate type within a bounded context
///
/// `context_name` scopes the aggregate name, so two contexts may both define
/// an `order` aggregate without colliding in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct NamedAggregate {
    /// Bounded context the aggregate belongs to
    pub context_name: String,
    /// Aggregate type name within the context
    pub aggregate_name: String,
}

impl NamedAggregate {
    /// Create a named aggregate
    pub fn new(context_name: impl Into<String>, aggregate_name: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
            aggregate_name: aggregate_name.into(),
        }
    }

    /// Create an [`AggregateId`] for one instance of this aggregate type
    pub fn aggregate_id(&self, id: impl Into<String>) -> AggregateId {
        AggregateId::new(self.clone(), id)
    }
}

impl fmt::Display for NamedAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.context_name, self.aggregate_name)
    }
}

/// Identity of one aggregate instance within a tenant-scoped namespace
///
/// Immutable once created; used as the partition key of the event store and
/// the snapshot repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AggregateId {
    /// The aggregate type this instance belongs to
    pub named_aggregate: NamedAggregate,
    /// Instance id, unique within the named aggregate and tenant
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
}

impl AggregateId {
    /// Create an aggregate id in the default tenant
    pub fn new(named_aggregate: NamedAggregate, id: impl Into<String>) -> Self {
        Self {
            named_aggregate,
            id: id.into(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
        }
    }

    /// Create an aggregate id in an explicit tenant
    pub fn with_tenant(
        named_aggregate: NamedAggregate,
        id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            named_aggregate,
            id: id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// The bounded context name
    pub fn context_name(&self) -> &str {
        &self.named_aggregate.context_name
    }

    /// The aggregate type name
    pub fn aggregate_name(&self) -> &str {
        &self.named_aggregate.aggregate_name
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}/{}",
            self.named_aggregate, self.tenant_id, self.id
        )
    }
}
