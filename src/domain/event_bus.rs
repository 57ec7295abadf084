//! Broadcast channel for core events.
//!
//! Breaker transitions, threshold crossings, payment outcomes, and flushed
//! batches all travel over one [`EventBus`]. The optimization listener and
//! every WebSocket connection hold their own receiver; a receiver that
//! falls more than `capacity` events behind loses the oldest ones and sees
//! `RecvError::Lagged`.

use tokio::sync::broadcast;

use super::CoreEvent;

/// Cloneable publisher handle over a `tokio::broadcast` channel of
/// [`CoreEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`, returning how many receivers it reached.
    ///
    /// Publishing with no receivers is not an error; the event is dropped.
    pub fn publish(&self, event: CoreEvent) -> usize {
        let kind = event.event_type_str();
        match self.sender.send(event) {
            Ok(reached) => {
                tracing::trace!(event = kind, reached, "event published");
                reached
            }
            Err(_) => 0,
        }
    }

    /// Returns a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
