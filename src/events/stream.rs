//! Bounded fan-out of feed events to consumers.
//!
//! The producer never waits: when a consumer falls more than `capacity`
//! events behind, the oldest events are dropped for that consumer. Drops are
//! counted and logged by the receiving side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use super::FeedEvent;

/// Producer side of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<FeedEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Creates a channel that buffers at most `capacity` events per consumer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes an event without waiting. Returns the number of consumers
    /// that will see it.
    pub fn publish(&self, event: FeedEvent) -> usize {
        // No consumers is not an error: events are simply not retained.
        self.tx.send(event).unwrap_or(0)
    }

    /// Opens a new consumer positioned at the next published event.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Total events dropped across all consumers.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("consumers", &self.tx.receiver_count())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Consumer side of the event channel.
pub struct EventStream {
    rx: broadcast::Receiver<FeedEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` once the feed has shut down
    /// and every buffered event was delivered.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.record_drop(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.record_drop(skipped),
                Err(_) => return None,
            }
        }
    }

    fn record_drop(&self, skipped: u64) {
        let total = self.dropped.fetch_add(skipped, Ordering::Relaxed) + skipped;
        warn!(
            "Event consumer lagged: dropped {} oldest event(s) ({} total)",
            skipped, total
        );
    }
}
