//! Broadcast channel for engine events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every snapshot
//! write and listener transition publishes a [`StatsEvent`] through the bus;
//! WebSocket connections and tests subscribe to observe them.

use tokio::sync::broadcast;

use super::StatsEvent;

/// Broadcast bus for [`StatsEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers. Publishing never blocks the listeners.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StatsEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: StatsEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatsEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
