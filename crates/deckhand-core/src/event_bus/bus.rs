use super::types::{ServerEvent, Severity};
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast-based event bus for real-time server events.
///
/// Uses `tokio::broadcast` so multiple subscribers can receive the same events.
/// Slow subscribers will miss events (lagged) rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// subscribers start missing events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    ///
    /// If a subscriber falls behind by more than `capacity` events, it will
    /// receive a `RecvError::Lagged` on next recv.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: ServerEvent) -> usize {
        trace!(event = ?event, "publishing event");
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Publish a single operator notification.
    pub fn notify(&self, text: impl Into<String>, severity: Severity) -> usize {
        self.publish(ServerEvent::notification(text, severity))
    }

    /// Publish one notification per text, in order.
    pub fn notify_all<I, S>(&self, texts: I, severity: Severity)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for text in texts {
            self.notify(text, severity);
        }
    }

    /// Get the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
