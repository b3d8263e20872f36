// Copyright 2025 Eventum Contributors.

//! Bus contracts and in-memory implementations

use crate::events::EventStream;
use crate::modeling::CommandMessage;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Errors raised by bus implementations
#[derive(Debug, Error)]
pub enum BusError {
    /// Delivery to the transport failed
    #[error("publish error: {0}")]
    Publish(String),

    /// The bus has been closed and accepts no further messages
    #[error("bus closed")]
    Closed,
}

/// Outbound delivery of committed event streams
///
/// Contract: deliver at least once; no ordering guarantee across aggregates;
/// per-aggregate ordering preserved when the transport can.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one committed stream
    async fn publish(&self, stream: &EventStream) -> Result<(), BusError>;
}

/// Outbound delivery of commands for asynchronous processing
#[async_trait]
pub trait CommandBus<C: Send + Sync>: Send + Sync {
    /// Enqueue one command for delivery
    async fn send(&self, command: CommandMessage<C>) -> Result<(), BusError>;
}

/// In-memory broadcast event bus
///
/// Fan-out over a tokio broadcast channel. Publishing without subscribers is
/// a no-op, matching the at-least-once contract from the publisher's side:
/// there is no one to deliver to.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<EventStream>,
}

impl InMemoryEventBus {
    /// Create a bus with the given per-subscriber buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every stream published from now on
    pub fn subscribe(&self) -> BroadcastStream<EventStream> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, stream: &EventStream) -> Result<(), BusError> {
        debug!(aggregate_id = %stream.aggregate_id, version = stream.version, "publishing event stream");
        // An Err here only means there are currently no subscribers.
        let _ = self.sender.send(stream.clone());
        Ok(())
    }
}

/// Event bus that drops everything
///
/// Used when no downstream consumers are wired, e.g. in storage-focused
/// tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _stream: &EventStream) -> Result<(), BusError> {
        Ok(())
    }
}

/// In-memory command bus over an unbounded mpsc channel
///
/// The paired receiver is handed to whatever consumer loop feeds commands
/// into a gateway.
#[derive(Debug)]
pub struct InMemoryCommandBus<C> {
    sender: mpsc::UnboundedSender<CommandMessage<C>>,
}

impl<C> Clone for InMemoryCommandBus<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> InMemoryCommandBus<C> {
    /// Create a bus and the receiver draining it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CommandMessage<C>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> CommandBus<C> for InMemoryCommandBus<C> {
    async fn send(&self, command: CommandMessage<C>) -> Result<(), BusError> {
        self.sender.send(command).map_err(|_| BusError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBody;
    use crate::modeling::NamedAggregate;
    use serde::{Deserialize, Serialize};
    use tokio_stream::StreamExt;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Pinged;

    impl EventBody for Pinged {
        fn event_name(&self) -> &'static str {
            "pinged"
        }
    }

    fn stream(version: u64) -> EventStream {
        EventStream::produce(
            NamedAggregate::new("tests", "ping").aggregate_id("p-1"),
            version,
            format!("cmd-{version}"),
            format!("req-{version}"),
            "",
            vec![Pinged],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = InMemoryEventBus::default();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.publish(&stream(1)).await.unwrap();

        let got_a = sub_a.next().await.unwrap().unwrap();
        let got_b = sub_b.next().await.unwrap().unwrap();
        assert_eq!(got_a.version, 1);
        assert_eq!(got_b.version, 1);
    }

    #[tokio::test]
    async fn test_event_bus_without_subscribers_is_a_noop() {
        let bus = InMemoryEventBus::default();
        bus.publish(&stream(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_command_bus_delivers_in_order() {
        let (bus, mut receiver) = InMemoryCommandBus::<u32>::channel();
        let id = NamedAggregate::new("tests", "ping").aggregate_id("p-1");
        for n in 0..3 {
            bus.send(CommandMessage::new(id.clone(), n)).await.unwrap();
        }
        for n in 0..3 {
            let received = receiver.recv().await.unwrap();
            assert_eq!(received.body, n);
        }
    }

    #[tokio::test]
    async fn test_command_bus_reports_closure() {
        let (bus, receiver) = InMemoryCommandBus::<u32>::channel();
        drop(receiver);
        let id = NamedAggregate::new("tests", "ping").aggregate_id("p-1");
        let err = bus.send(CommandMessage::new(id, 1)).await.unwrap_err();
        assert!(matches!(err, BusError::Closed));
    }
}
