//! Publish-only event bus
//!
//! Lifecycle events fan out to subscribers (the WebSocket hub, test
//! listeners) over a bounded broadcast channel. Publishing never blocks
//! and never fails the publisher; a lagging subscriber drops the oldest
//! events and clients reconcile by polling.

use tokio::sync::broadcast;
use tracing::debug;

use gigwire_types::JobEvent;

/// Default buffer size per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Lossy broadcast bus for lifecycle events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event, fire-and-forget
    pub fn publish(&self, event: JobEvent) {
        debug!(event = %event.summary(), "publishing");
        // No subscribers is fine; delivery is best-effort
        let _ = self.tx.send(event);
    }

    /// Subscribe to the stream of events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
