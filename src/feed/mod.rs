//! Connection lifecycle of the market feed.
//!
//! [`FeedManager`] is a handle to an actor task that owns the transport
//! session, the subscribed topics and the connection state. [`FeedClient`]
//! wires the manager together with the background refresh, liveness and
//! probe loops.

mod backoff;
mod client;
pub mod dispatch;
mod manager;
#[cfg(test)]
pub(crate) mod mock;
mod shutdown;

use thiserror::Error;

use crate::events::Operation;

pub use backoff::Backoff;
pub use client::FeedClient;
pub use manager::{FeedManager, ManagerConfig};
pub use shutdown::{Shutdown, ShutdownSignal};

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Failed to connect to {url} after {attempts} attempt(s): {last_error}")]
    ConnectFailure {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{operation} transmit failed: {reason}")]
    TransmitFailure { operation: Operation, reason: String },

    #[error("Feed manager is closed")]
    Closed,
}
