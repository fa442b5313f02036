//! Scripted in-memory transport for lifecycle tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connectors::{
    Connector, InboundFrame, OutboundEvent, SessionCredential, TransportError, TransportSession,
};

type Inbound = Result<InboundFrame, TransportError>;

#[derive(Default)]
struct SessionRecord {
    sent: Vec<OutboundEvent>,
    closed: bool,
    fail_sends: bool,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
}

#[derive(Default)]
struct MockState {
    failing_opens: u32,
    withhold_ack: bool,
    opens: u32,
    sessions: Vec<SessionRecord>,
}

/// Connector whose sessions are driven from the test body.
///
/// Sessions are numbered in open order. Each one acknowledges the connection
/// immediately unless [`MockConnector::withhold_ack`] was called.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().failing_opens = count;
    }

    pub fn withhold_ack(&self) {
        self.state.lock().withhold_ack = true;
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().opens
    }

    pub fn sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn sent(&self, session: usize) -> Vec<OutboundEvent> {
        self.state.lock().sessions[session].sent.clone()
    }

    pub fn sent_names(&self, session: usize) -> Vec<String> {
        self.sent(session).into_iter().map(|e| e.name).collect()
    }

    pub fn sent_payloads(&self, session: usize) -> Vec<Value> {
        self.sent(session).into_iter().map(|e| e.data).collect()
    }

    pub fn is_closed(&self, session: usize) -> bool {
        self.state.lock().sessions[session].closed
    }

    pub fn fail_sends(&self, session: usize) {
        self.state.lock().sessions[session].fail_sends = true;
    }

    pub fn push(&self, session: usize, frame: InboundFrame) {
        if let Some(tx) = &self.state.lock().sessions[session].inbound {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Ends the inbound stream of a session, as a dropped connection would.
    pub fn drop_session(&self, session: usize) {
        self.state.lock().sessions[session].inbound = None;
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn open(
        &self,
        _credential: Option<&SessionCredential>,
    ) -> Result<Self::Session, TransportError> {
        let mut state = self.state.lock();
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::ConnectionFailed("Connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !state.withhold_ack {
            let _ = tx.send(Ok(InboundFrame::Connected));
        }
        state.sessions.push(SessionRecord {
            inbound: Some(tx),
            ..Default::default()
        });

        Ok(MockSession {
            index: state.sessions.len() - 1,
            rx,
            state: Arc::clone(&self.state),
        })
    }

    fn endpoint(&self) -> String {
        "mock://feed".to_string()
    }
}

pub struct MockSession {
    index: usize,
    rx: mpsc::UnboundedReceiver<Inbound>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send(&mut self, event: OutboundEvent) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let record = &mut state.sessions[self.index];
        if record.fail_sends {
            return Err(TransportError::SendFailed("Broken pipe".to_string()));
        }
        record.sent.push(event);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.state.lock().sessions[self.index].closed = true;
    }
}
