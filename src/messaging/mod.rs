// Copyright 2025 Eventum Contributors.

//! Command and event delivery
//!
//! The bus traits are the transport plug-in surface: delivery is at least
//! once, ordering is only preserved per aggregate id and only best-effort.
//! The in-memory implementations back tests and single-process deployments;
//! broker transports live outside this crate. The [`CommandGateway`] is the
//! command-submission surface, returning structured results instead of raw
//! errors.

mod bus;
mod gateway;

pub use bus::{BusError, CommandBus, EventBus, InMemoryCommandBus, InMemoryEventBus, NullEventBus};
pub use gateway::{CommandGateway, CommandResult, CommandStage, CommandStatus, SUCCEEDED};
