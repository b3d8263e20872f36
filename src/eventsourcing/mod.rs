// Copyright 2025 Eventum Contributors.

//! Event sourcing infrastructure contracts and reference implementations
//!
//! The [`EventStore`] and [`SnapshotRepository`] traits are the crate's
//! plug-in surface for durable backends; the in-memory implementations here
//! fulfil the same contracts for testing and local development. The
//! [`StateAggregateRepository`] composes the two to materialize aggregate
//! state.

mod event_store;
mod in_memory;
mod snapshot;
mod state_repository;

pub use event_store::{check_version_range, EventStore, EventStoreError};
pub use in_memory::InMemoryEventStore;
pub use snapshot::{
    CachingSnapshotRepository, InMemorySnapshotRepository, Snapshot, SnapshotError,
    SnapshotPolicy, SnapshotRecord, SnapshotRepository, SnapshotSaver,
};
pub use state_repository::{RepositoryError, StateAggregateRepository};
