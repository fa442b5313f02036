//! Socket.IO client session over tokio-tungstenite.
//!
//! Handles the Engine.IO layer internally:
//! 1. Engine open → namespace connect (with session auth when present)
//! 2. Engine ping → pong, surfaced as a keepalive
//! 3. Socket.IO events on our namespace → `InboundFrame::Event`
//! 4. No inbound frame within `pingInterval + pingTimeout` → heartbeat timeout
//!
//! Replies are queued and written before the next read or send, so
//! dropping a pending `recv()` never loses a pong or connect packet.
//!
//! Reconnection policy lives in the feed manager; a session is single-use.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::poll_fn;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::transport::{Connector, InboundFrame, OutboundEvent, TransportError, TransportSession};
use super::wire::{self, EnginePacket, SocketPacketKind};
use super::SessionCredential;

/// Default Socket.IO endpoint of the Limitless market feed.
pub const DEFAULT_WS_URL: &str = "wss://ws.limitless.exchange/socket.io/?EIO=4&transport=websocket";

/// Default namespace carrying market prices.
pub const DEFAULT_NAMESPACE: &str = "/markets";

const DEFAULT_ORIGIN: &str = "https://limitless.exchange";
const USER_AGENT: &str = concat!("limitless-feed/", env!("CARGO_PKG_VERSION"));

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Socket.IO sessions against one endpoint and namespace.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    url: String,
    namespace: String,
    origin: String,
}

impl SocketIoConnector {
    pub fn new(url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: namespace.into(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }

    /// Overrides the `Origin` header sent with the upgrade request.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Default for SocketIoConnector {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL, DEFAULT_NAMESPACE)
    }
}

fn header(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::ConnectionFailed(e.to_string()))
}

#[async_trait]
impl Connector for SocketIoConnector {
    type Session = SocketIoSession;

    async fn open(
        &self,
        credential: Option<&SessionCredential>,
    ) -> Result<Self::Session, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert("Origin", header(&self.origin)?);
        headers.insert("User-Agent", header(USER_AGENT)?);
        if let Some(credential) = credential {
            headers.insert("Cookie", header(&credential.cookie_header())?);
        }

        debug!("Opening WebSocket: {}", self.url);
        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!("WebSocket upgraded ({})", response.status());

        Ok(SocketIoSession::new(
            stream,
            self.namespace.clone(),
            credential.map(SessionCredential::namespace_auth),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{} ({})", self.url, self.namespace)
    }
}

/// One Socket.IO connection.
pub struct SocketIoSession {
    stream: Option<WsStream>,
    namespace: String,
    auth: Option<Value>,
    /// Packets waiting to be written.
    outbox: VecDeque<String>,
    /// Frame decoded but not yet handed out.
    ready: Option<InboundFrame>,
    /// `pingInterval + pingTimeout` from the engine handshake.
    heartbeat: Option<Duration>,
    last_inbound: Instant,
}

fn send_failed(e: WsError) -> TransportError {
    TransportError::SendFailed(e.to_string())
}

/// Longest silence the server allows before the connection counts as dead.
fn heartbeat_window(handshake: &Value) -> Option<Duration> {
    let interval = handshake.get("pingInterval")?.as_u64()?;
    let timeout = handshake.get("pingTimeout")?.as_u64()?;
    Some(Duration::from_millis(interval.saturating_add(timeout)))
}

impl SocketIoSession {
    fn new(stream: WsStream, namespace: String, auth: Option<Value>) -> Self {
        Self {
            stream: Some(stream),
            namespace,
            auth,
            outbox: VecDeque::new(),
            ready: None,
            heartbeat: None,
            last_inbound: Instant::now(),
        }
    }

    /// Writes every queued packet. Cancel-safe: a packet leaves the queue
    /// only once the sink has accepted it.
    async fn flush_outbox(&mut self) -> Result<(), TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("Not connected".to_string()))?;

        while !self.outbox.is_empty() {
            poll_fn(|cx| stream.poll_ready_unpin(cx))
                .await
                .map_err(send_failed)?;
            if let Some(text) = self.outbox.pop_front() {
                stream
                    .start_send_unpin(Message::Text(text))
                    .map_err(send_failed)?;
            }
        }
        poll_fn(|cx| stream.poll_flush_unpin(cx))
            .await
            .map_err(send_failed)
    }

    fn is_ours(&self, namespace: &str) -> bool {
        namespace == self.namespace
    }

    /// Handles one text frame. Returns a frame for the caller, or `None` if
    /// the packet was consumed here.
    fn handle_text(&mut self, text: &str) -> Result<Option<InboundFrame>, TransportError> {
        let packet = match wire::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Skipping malformed packet ({}): {}", e, text);
                return Ok(None);
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                debug!("Engine open: {}", handshake);
                self.heartbeat = heartbeat_window(&handshake);
                self.outbox
                    .push_back(wire::encode_connect(&self.namespace, self.auth.as_ref()));
                Ok(None)
            }
            EnginePacket::Ping => {
                self.outbox.push_back(wire::PONG.to_string());
                Ok(Some(InboundFrame::Keepalive))
            }
            EnginePacket::Pong => Ok(Some(InboundFrame::Keepalive)),
            EnginePacket::Noop => Ok(None),
            EnginePacket::Close => Ok(Some(InboundFrame::Disconnected(
                "Engine close packet".to_string(),
            ))),
            EnginePacket::Message(packet) => match packet.kind {
                SocketPacketKind::Connect if self.is_ours(&packet.namespace) => {
                    Ok(Some(InboundFrame::Connected))
                }
                SocketPacketKind::Disconnect if self.is_ours(&packet.namespace) => Ok(Some(
                    InboundFrame::Disconnected("Namespace disconnected by server".to_string()),
                )),
                SocketPacketKind::ConnectError if self.is_ours(&packet.namespace) => {
                    let reason = packet.data.map(|d| d.to_string()).unwrap_or_default();
                    Err(TransportError::HandshakeRejected(reason))
                }
                SocketPacketKind::Event => {
                    let namespace = packet.namespace.clone();
                    match packet.into_event() {
                        Ok((name, data)) => {
                            if !self.is_ours(&namespace) {
                                debug!("Event {} on namespace {}", name, namespace);
                            }
                            Ok(Some(InboundFrame::Event { name, data }))
                        }
                        Err(e) => {
                            debug!("Skipping event packet: {}", e);
                            Ok(None)
                        }
                    }
                }
                SocketPacketKind::Ack => {
                    debug!("Ack {:?}: {:?}", packet.ack_id, packet.data);
                    Ok(None)
                }
                _ => {
                    debug!("Ignoring packet for namespace {}", packet.namespace);
                    Ok(None)
                }
            },
        }
    }
}

#[async_trait]
impl TransportSession for SocketIoSession {
    async fn send(&mut self, event: OutboundEvent) -> Result<(), TransportError> {
        let text = wire::encode_event(&self.namespace, &event.name, &event.data);
        debug!("Sending: {}", text);
        self.outbox.push_back(text);
        self.flush_outbox().await
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            self.stream.as_ref()?;
            if let Err(e) = self.flush_outbox().await {
                return Some(Err(e));
            }
            if let Some(frame) = self.ready.take() {
                return Some(Ok(frame));
            }

            let deadline = self.heartbeat.map(|window| self.last_inbound + window);
            let stream = self.stream.as_mut()?;
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Heartbeat timeout on {}", self.namespace);
                        return Some(Err(TransportError::ReceiveFailed(
                            "Heartbeat timeout".to_string(),
                        )));
                    }
                },
                None => stream.next().await,
            };
            self.last_inbound = Instant::now();

            let msg = match next {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => match self.handle_text(&text) {
                    Ok(frame) => self.ready = frame,
                    Err(e) => return Some(Err(e)),
                },
                // tungstenite answers WebSocket pings itself.
                Message::Ping(_) | Message::Pong(_) => self.ready = Some(InboundFrame::Keepalive),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    return Some(Ok(InboundFrame::Disconnected(reason)));
                }
                Message::Binary(_) => {
                    debug!("Received binary message (ignored)");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        self.outbox.push_back(wire::encode_disconnect(&self.namespace));
        if let Err(e) = self.flush_outbox().await {
            debug!("Namespace disconnect not sent: {}", e);
        }
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                warn!("Error during WebSocket close: {}", e);
            }
        }
        info!("WebSocket closed");
    }
}

impl std::fmt::Debug for SocketIoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoSession")
            .field("namespace", &self.namespace)
            .field("open", &self.stream.is_some())
            .field("authenticated", &self.auth.is_some())
            .field("heartbeat", &self.heartbeat)
            .field("queued", &self.outbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    type ServerStream = WebSocketStream<TcpStream>;

    const HANDSHAKE: &str =
        r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    /// Opens a session against a local server and returns both ends.
    async fn open_pair(credential: Option<SessionCredential>) -> (SocketIoSession, ServerStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!(
            "ws://{}/socket.io/?EIO=4&transport=websocket",
            listener.local_addr().unwrap()
        );
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            accept_async(tcp).await.unwrap()
        });

        let session = SocketIoConnector::new(url, DEFAULT_NAMESPACE)
            .open(credential.as_ref())
            .await
            .unwrap();
        (session, server.await.unwrap())
    }

    async fn server_send(server: &mut ServerStream, text: &str) {
        server.send(Message::Text(text.to_string())).await.unwrap();
    }

    async fn server_recv(server: &mut ServerStream) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), server.next())
                .await
                .expect("timed out waiting for client packet")
                .expect("client went away")
                .unwrap();
            if let Message::Text(text) = msg {
                return text;
            }
        }
    }

    async fn next_frame(session: &mut SocketIoSession) -> Result<InboundFrame, TransportError> {
        tokio::time::timeout(Duration::from_secs(5), session.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
    }

    #[test]
    fn test_default_connector_endpoint() {
        let connector = SocketIoConnector::default();
        assert_eq!(connector.namespace(), "/markets");
        assert!(connector.endpoint().contains("EIO=4"));
    }

    #[test]
    fn test_heartbeat_window_from_handshake() {
        let handshake = json!({"sid": "s1", "pingInterval": 25000, "pingTimeout": 20000});
        assert_eq!(heartbeat_window(&handshake), Some(Duration::from_secs(45)));
        assert_eq!(heartbeat_window(&json!({"sid": "s1"})), None);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let connector = SocketIoConnector::new("not a url", DEFAULT_NAMESPACE);
        assert!(matches!(
            connector.open(None).await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_open_sends_namespace_connect_with_auth() {
        let (mut session, mut server) = open_pair(SessionCredential::new("tok")).await;

        server_send(&mut server, HANDSHAKE).await;
        server_send(&mut server, r#"40/markets,{"sid":"n1"}"#).await;

        assert_eq!(next_frame(&mut session).await.unwrap(), InboundFrame::Connected);
        assert_eq!(server_recv(&mut server).await, r#"40/markets,{"token":"tok"}"#);
        assert_eq!(session.heartbeat, Some(Duration::from_secs(45)));
    }

    #[tokio::test]
    async fn test_engine_ping_is_answered_and_surfaced() {
        let (mut session, mut server) = open_pair(None).await;

        server_send(&mut server, HANDSHAKE).await;
        server_send(&mut server, "2").await;

        assert_eq!(next_frame(&mut session).await.unwrap(), InboundFrame::Keepalive);
        assert_eq!(server_recv(&mut server).await, "40/markets,");
        assert_eq!(server_recv(&mut server).await, "3");
    }

    #[tokio::test]
    async fn test_connect_error_is_rejected() {
        let (mut session, mut server) = open_pair(None).await;

        server_send(&mut server, HANDSHAKE).await;
        server_send(&mut server, r#"44/markets,{"message":"Unauthorized"}"#).await;

        match next_frame(&mut session).await {
            Err(TransportError::HandshakeRejected(reason)) => assert!(reason.contains("Unauthorized")),
            other => panic!("expected handshake rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_pass_through_and_send_uses_namespace() {
        let (mut session, mut server) = open_pair(None).await;

        server_send(&mut server, HANDSHAKE).await;
        server_send(&mut server, r#"42["system",{"message":"hi"}]"#).await;
        server_send(&mut server, r#"42/markets,["newPriceData",{"conditionId":"0x1"}]"#).await;

        assert_eq!(
            next_frame(&mut session).await.unwrap(),
            InboundFrame::Event {
                name: "system".to_string(),
                data: json!({"message": "hi"}),
            }
        );
        assert_eq!(
            next_frame(&mut session).await.unwrap(),
            InboundFrame::Event {
                name: "newPriceData".to_string(),
                data: json!({"conditionId": "0x1"}),
            }
        );

        session
            .send(OutboundEvent::new(
                "subscribe_market_prices",
                json!({"marketAddresses": ["0x1"]}),
            ))
            .await
            .unwrap();
        assert_eq!(server_recv(&mut server).await, "40/markets,");
        assert_eq!(
            server_recv(&mut server).await,
            r#"42/markets,["subscribe_market_prices",{"marketAddresses":["0x1"]}]"#
        );

        session.close().await;
        assert_eq!(server_recv(&mut server).await, "41/markets,");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (mut session, mut server) = open_pair(None).await;

        server_send(
            &mut server,
            r#"0{"sid":"s1","upgrades":[],"pingInterval":100,"pingTimeout":100}"#,
        )
        .await;
        server_send(&mut server, r#"40/markets,{"sid":"n1"}"#).await;
        assert_eq!(next_frame(&mut session).await.unwrap(), InboundFrame::Connected);

        // Pings keep the session alive past the window.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(120)).await;
            server_send(&mut server, "2").await;
            assert_eq!(next_frame(&mut session).await.unwrap(), InboundFrame::Keepalive);
        }

        let started = Instant::now();
        match next_frame(&mut session).await {
            Err(TransportError::ReceiveFailed(reason)) => assert_eq!(reason, "Heartbeat timeout"),
            other => panic!("expected heartbeat timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(server);
    }
}
