//! Events published to downstream consumers.
//!
//! Every event carries a timestamp. Raw payloads only reach consumers through
//! `FeedEvent::Unrecognized`, which exists for diagnostics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::subscriptions::Topic;

/// Canonical price/volume record extracted from an inbound payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub topic: Topic,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume: Option<f64>,
    /// Location of the matched object inside the payload, e.g. `root.markets[1]`.
    pub source_path: String,
    /// The raw price value when its shape was not a scalar or a pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unparsed_price: Option<Value>,
}

/// Connection state of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Subscription operation that was sent to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    Probe,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Probe => "probe",
        };
        f.write_str(s)
    }
}

/// Everything the core publishes to presentation layers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    // ========== Market Data ==========
    /// Price/volume update extracted from an inbound event.
    Price {
        event_name: String,
        label: Option<String>,
        update: NormalizedEvent,
        received_at: DateTime<Utc>,
    },

    /// Inbound event in which no price record could be located.
    Unrecognized {
        event_name: String,
        payload: Value,
        received_at: DateTime<Utc>,
    },

    // ========== Connection Lifecycle ==========
    /// First successful connection.
    Connected { timestamp: DateTime<Utc> },

    /// Connection lost. `will_retry` is false when the manager went idle.
    Disconnected {
        reason: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },

    /// Connection re-established and subscriptions replayed.
    Reconnected {
        resubscribed: usize,
        timestamp: DateTime<Utc>,
    },

    // ========== Health ==========
    /// A subscribe/unsubscribe/probe transmit failed; local state was still updated.
    TransmitFailed {
        operation: Operation,
        topics: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// No qualifying event within the liveness window.
    Stale {
        /// Time since the last qualifying event, or since monitoring began.
        silent_for: Duration,
        never_observed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    /// Returns the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedEvent::Price { received_at, .. } => *received_at,
            FeedEvent::Unrecognized { received_at, .. } => *received_at,
            FeedEvent::Connected { timestamp } => *timestamp,
            FeedEvent::Disconnected { timestamp, .. } => *timestamp,
            FeedEvent::Reconnected { timestamp, .. } => *timestamp,
            FeedEvent::TransmitFailed { timestamp, .. } => *timestamp,
            FeedEvent::Stale { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the topic for market data events.
    pub fn topic(&self) -> Option<&str> {
        match self {
            FeedEvent::Price { update, .. } => Some(update.topic.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_event_topic() {
        let event = FeedEvent::Price {
            event_name: "newPriceData".to_string(),
            label: None,
            update: NormalizedEvent {
                topic: "0xabc".to_string(),
                yes_price: Some(0.62),
                no_price: Some(0.38),
                volume: None,
                source_path: "root".to_string(),
                unparsed_price: None,
            },
            received_at: Utc::now(),
        };
        assert_eq!(event.topic(), Some("0xabc"));
    }

    #[test]
    fn test_lifecycle_event_has_no_topic() {
        let event = FeedEvent::Connected { timestamp: Utc::now() };
        assert_eq!(event.topic(), None);
    }

    #[test]
    fn test_normalized_event_serialization_skips_empty_diagnostics() {
        let update = NormalizedEvent {
            topic: "0x1".to_string(),
            yes_price: Some(0.9),
            no_price: None,
            volume: Some(1200.0),
            source_path: "root.markets[0]".to_string(),
            unparsed_price: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"source_path\":\"root.markets[0]\""));
        assert!(!json.contains("unparsed_price"));
    }
}
