//! Inbound event dispatch.
//!
//! Event names are not stable across server versions, so names map to
//! handlers through a table and unknown names fall through to the same
//! normalizing handler as the known price events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{normalize, FeedEvent};
use crate::subscriptions::TopicLabels;

/// Price event names seen on the markets namespace.
pub const PRICE_EVENTS: &[&str] = &[
    "newPriceData",
    "marketPriceData",
    "priceUpdate",
    "prices",
    "market_update",
];

/// Generic event names that sometimes carry market data.
pub const GENERIC_EVENTS: &[&str] = &["data", "update", "message"];

/// Outcome of dispatching one inbound event.
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Whether the event counts as substantive data for liveness.
    pub qualifying: bool,
    pub events: Vec<FeedEvent>,
}

type Handler = fn(&Dispatcher, &str, &Value, DateTime<Utc>) -> Dispatched;

/// Name → handler table with an unmatched fallback.
pub struct Dispatcher {
    handlers: HashMap<&'static str, Handler>,
    labels: TopicLabels,
}

impl Dispatcher {
    pub fn new(labels: TopicLabels) -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        handlers.insert("system", Self::on_system);
        handlers.insert("exception", Self::on_exception);
        for name in PRICE_EVENTS.iter().chain(GENERIC_EVENTS) {
            handlers.insert(*name, Self::on_market_data);
        }
        Self { handlers, labels }
    }

    pub fn dispatch(&self, name: &str, data: &Value, received_at: DateTime<Utc>) -> Dispatched {
        match self.handlers.get(name) {
            Some(handler) => handler(self, name, data, received_at),
            None => self.on_unmatched(name, data, received_at),
        }
    }

    fn on_system(&self, _name: &str, data: &Value, _at: DateTime<Utc>) -> Dispatched {
        debug!("[feed] System message: {}", data);
        Dispatched::default()
    }

    fn on_exception(&self, _name: &str, data: &Value, _at: DateTime<Utc>) -> Dispatched {
        warn!("[feed] Server exception: {}", data);
        Dispatched::default()
    }

    fn on_unmatched(&self, name: &str, data: &Value, received_at: DateTime<Utc>) -> Dispatched {
        debug!("[feed] Unmatched event name: {}", name);
        self.on_market_data(name, data, received_at)
    }

    fn on_market_data(&self, name: &str, data: &Value, received_at: DateTime<Utc>) -> Dispatched {
        let mut events: Vec<FeedEvent> = normalize(data)
            .map(|update| FeedEvent::Price {
                event_name: name.to_string(),
                label: self.labels.get(&update.topic),
                update,
                received_at,
            })
            .collect();

        if events.is_empty() {
            debug!("[feed] No price record in {} payload", name);
            events.push(FeedEvent::Unrecognized {
                event_name: name.to_string(),
                payload: data.clone(),
                received_at,
            });
        }

        Dispatched {
            qualifying: true,
            events,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
