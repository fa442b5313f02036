//! Transport seam between the lifecycle manager and the wire.
//!
//! A [`Connector`] opens sessions; a [`TransportSession`] carries named events
//! in both directions. The manager only ever holds one session at a time.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::SessionCredential;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection closed by server: {0}")]
    ConnectionClosed(String),

    #[error("Namespace connect rejected: {0}")]
    HandshakeRejected(String),
}

/// Frame received from the remote side, already decoded from the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The remote side acknowledged the connection.
    Connected,
    /// Transport-level heartbeat. Never counts as data.
    Keepalive,
    /// Named event with its payload.
    Event { name: String, data: Value },
    /// Remote side ended the session.
    Disconnected(String),
}

/// Named operation sent to the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub name: String,
    pub data: Value,
}

impl OutboundEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// One open connection.
#[async_trait]
pub trait TransportSession: Send + 'static {
    /// Sends an event.
    async fn send(&mut self, event: OutboundEvent) -> Result<(), TransportError>;

    /// Waits for the next frame. `None` means the stream ended.
    ///
    /// Must be cancel-safe: the manager polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Factory for sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: TransportSession;

    /// Opens a new session. Completing this does not imply the remote side
    /// acknowledged the connection; wait for [`InboundFrame::Connected`].
    async fn open(
        &self,
        credential: Option<&SessionCredential>,
    ) -> Result<Self::Session, TransportError>;

    /// Endpoint description for log lines.
    fn endpoint(&self) -> String;
}
