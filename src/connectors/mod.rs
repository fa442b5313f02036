//! Connectors for the Limitless Exchange APIs.
//!
//! Low-level clients only: the Socket.IO WebSocket transport, its wire codec,
//! the session credential and the REST discovery source. Everything received
//! here is raw and goes through the event layer before reaching consumers.

mod auth;
pub mod discovery;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use auth::SessionCredential;
pub use discovery::DiscoveryTopicSource;
pub use transport::{Connector, InboundFrame, OutboundEvent, TransportError, TransportSession};
pub use websocket::{SocketIoConnector, SocketIoSession};
