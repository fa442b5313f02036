//! Limitless Exchange market feed.
//!
//! Maintains a Socket.IO market-data subscription against the Limitless
//! Exchange, keeps the subscribed markets in line with an external desired
//! list, and turns loosely structured price payloads into typed events.
//!
//! # Architecture
//!
//! - **Single writer**: one actor task owns the connection and the subscribed
//!   topics; everything else reads snapshots or sends commands
//! - **Resilient**: dropped connections are re-established with exponential
//!   backoff and every subscription is replayed
//! - **Schema tolerant**: inbound payloads are searched for price records
//!   instead of being deserialized into fixed structs
//! - **Non-blocking fan-out**: consumers read a bounded, drop-oldest stream
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use limitless_feed::config::FeedConfig;
//! use limitless_feed::connectors::{SessionCredential, SocketIoConnector};
//! use limitless_feed::feed::FeedClient;
//! use limitless_feed::subscriptions::FileTopicSource;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FeedConfig::from_env()?;
//!     let connector = SocketIoConnector::new(&config.ws_url, &config.namespace);
//!     let source = Arc::new(FileTopicSource::new("hourly_markets.json"));
//!
//!     let client = FeedClient::start(connector, &config, source, SessionCredential::from_env()).await?;
//!     let mut events = client.events();
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod events;
pub mod feed;
pub mod subscriptions;
pub mod utils;
pub mod watchers;

// Re-export commonly used types
pub use config::FeedConfig;
pub use events::{ConnectionState, FeedEvent, NormalizedEvent};
pub use feed::{FeedClient, FeedError, FeedManager};
pub use subscriptions::Topic;
