//! Socket.IO v4 / Engine.IO v4 text framing.
//!
//! Only the subset used over a plain WebSocket transport is supported:
//! text packets, namespaces, acknowledgement ids. Binary attachments are
//! rejected.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000}   engine open
//! 2 / 3                                engine ping / pong
//! 40/markets,{"sid":".."}              namespace connected
//! 42/markets,["newPriceData",{..}]     event
//! 44/markets,{"message":".."}          namespace connect error
//! ```

use serde_json::Value;
use thiserror::Error;

/// Engine.IO pong packet.
pub const PONG: &str = "3";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown engine packet type: {0:?}")]
    UnknownEnginePacket(char),

    #[error("Unknown socket packet type: {0:?}")]
    UnknownSocketPacket(char),

    #[error("Binary packets are not supported")]
    BinaryUnsupported,

    #[error("Malformed packet payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event packet without a name")]
    MissingEventName,
}

/// Decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Message(SocketPacket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

/// Decoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Splits an event packet into its name and payload. Events with several
    /// arguments carry them as an array; events without arguments carry null.
    pub fn into_event(self) -> Result<(String, Value), WireError> {
        let Some(Value::Array(mut items)) = self.data else {
            return Err(WireError::MissingEventName);
        };
        if items.is_empty() {
            return Err(WireError::MissingEventName);
        }
        let name = match items.remove(0) {
            Value::String(name) => name,
            _ => return Err(WireError::MissingEventName),
        };
        let data = match items.len() {
            0 => Value::Null,
            1 => items.remove(0),
            _ => Value::Array(items),
        };
        Ok((name, data))
    }
}

/// Decodes one text frame.
pub fn decode(text: &str) -> Result<EnginePacket, WireError> {
    let kind = text.chars().next().ok_or(WireError::Empty)?;
    let body = &text[kind.len_utf8()..];
    match kind {
        '0' => {
            let handshake = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(body)?
            };
            Ok(EnginePacket::Open(handshake))
        }
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(body).map(EnginePacket::Message),
        '5' | '6' => Ok(EnginePacket::Noop),
        other => Err(WireError::UnknownEnginePacket(other)),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, WireError> {
    let kind_char = body.chars().next().ok_or(WireError::Empty)?;
    let kind = match kind_char {
        '0' => SocketPacketKind::Connect,
        '1' => SocketPacketKind::Disconnect,
        '2' => SocketPacketKind::Event,
        '3' => SocketPacketKind::Ack,
        '4' => SocketPacketKind::ConnectError,
        '5' | '6' => return Err(WireError::BinaryUnsupported),
        other => return Err(WireError::UnknownSocketPacket(other)),
    };

    let mut rest = &body[kind_char.len_utf8()..];
    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => {
                let ns = &rest[..idx];
                rest = &rest[idx + 1..];
                ns.to_string()
            }
            None => {
                let ns = rest.to_string();
                rest = "";
                ns
            }
        }
    } else {
        "/".to_string()
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = rest[..digits].parse().ok();
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str(rest)?)
    };

    Ok(SocketPacket {
        kind,
        namespace,
        ack_id,
        data,
    })
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// Encodes a namespace connect request, optionally with an auth object.
pub fn encode_connect(namespace: &str, auth: Option<&Value>) -> String {
    let mut packet = format!("40{}", namespace_prefix(namespace));
    if let Some(auth) = auth {
        packet.push_str(&auth.to_string());
    }
    packet
}

/// Encodes a namespace disconnect.
pub fn encode_disconnect(namespace: &str) -> String {
    format!("41{}", namespace_prefix(namespace))
}

/// Encodes an event with a single payload argument.
pub fn encode_event(namespace: &str, name: &str, data: &Value) -> String {
    let args = Value::Array(vec![Value::String(name.to_string()), data.clone()]);
    format!("42{}{}", namespace_prefix(namespace), args)
}
