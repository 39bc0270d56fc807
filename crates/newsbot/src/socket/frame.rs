//! Text framing of the realtime channel.
//!
//! The backend runs Socket.IO (protocol v5) on top of Engine.IO v4. Only the
//! WebSocket transport and the default namespace are used, so every frame is
//! one text message:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2 / 3                                                    ping / pong
//! 40 / 40{"sid":".."}                                      connect / ack
//! 41                                                       disconnect
//! 42["new_message",{..}]                                   event
//! 44{"message":".."}                                       connect error
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors decoding a text frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownType(char),

    #[error("invalid JSON in frame: {0}")]
    InvalidJson(String),

    #[error("malformed event: {0}")]
    InvalidEvent(String),
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    /// Acknowledgement of an emit. The client never requests acks; these are
    /// decoded only so they can be skipped.
    Ack,
    ConnectError(Value),
}

/// Parameters the server announces in the open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// How long the connection may stay silent before it is considered dead.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

impl Packet {
    /// Build an event frame.
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Message(SocketPacket::Event {
            name: name.into(),
            data,
        })
    }

    /// Encode to the text wire form.
    pub fn encode(&self) -> String {
        match self {
            // Clients never send open frames; kept for completeness of the enum.
            Self::Open(h) => format!(
                "0{{\"sid\":{},\"pingInterval\":{},\"pingTimeout\":{}}}",
                Value::String(h.sid.clone()),
                h.ping_interval,
                h.ping_timeout
            ),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()),
        }
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => {
                let handshake: Handshake = serde_json::from_str(rest)
                    .map_err(|e| FrameError::InvalidJson(e.to_string()))?;
                Ok(Self::Open(handshake))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => SocketPacket::decode(rest).map(Self::Message),
            '6' => Ok(Self::Noop),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl SocketPacket {
    fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, data } => {
                let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                format!("2{args}")
            }
            Self::Ack => "3[]".to_string(),
            Self::ConnectError(data) => format!("4{data}"),
        }
    }

    fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let body = strip_ack_id(strip_namespace(chars.as_str()));

        match kind {
            '0' => {
                if body.is_empty() {
                    Ok(Self::Connect(None))
                } else {
                    parse_json(body).map(|v| Self::Connect(Some(v)))
                }
            }
            '1' => Ok(Self::Disconnect),
            '2' => decode_event(body),
            '3' => Ok(Self::Ack),
            '4' => {
                if body.is_empty() {
                    Ok(Self::ConnectError(Value::Null))
                } else {
                    parse_json(body).map(Self::ConnectError)
                }
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

fn decode_event(body: &str) -> Result<SocketPacket, FrameError> {
    let value = parse_json(body)?;
    let Value::Array(mut args) = value else {
        return Err(FrameError::InvalidEvent("expected JSON array".into()));
    };
    if args.is_empty() {
        return Err(FrameError::InvalidEvent("missing event name".into()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(FrameError::InvalidEvent(format!(
                "event name must be a string, got {other}"
            )));
        }
    };
    // Events on this channel carry a single payload argument.
    let data = args.into_iter().next().unwrap_or(Value::Null);
    Ok(SocketPacket::Event { name, data })
}

/// Skip a `/namespace,` prefix. Only the default namespace is joined, so the
/// name itself is irrelevant.
fn strip_namespace(text: &str) -> &str {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => &text[idx + 1..],
            None => "",
        }
    } else {
        text
    }
}

fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json(text: &str) -> Result<Value, FrameError> {
    serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))
}
