//! Relay wire protocol: a versioned envelope around typed events.
//!
//! Every frame is an [`Envelope`], `{"v": 1, "event": {...}}`, whose
//! `event` is externally tagged with the kebab-case event name:
//!
//! ```text
//! {"v":1,"event":{"text-update":"fn main() {}"}}
//! {"v":1,"event":{"cursor-update":{"userId":"u1","range":{...},"color":"#FF6B6B"}}}
//! {"v":1,"event":{"users":[{"id":"u1","name":"Ada","color":"#FF6B6B"}]}}
//! ```
//!
//! Two codecs carry the same envelope: JSON in WebSocket text frames and
//! bincode (standard config) in binary frames. The version is probed
//! before the event body is decoded, so a frame from a newer peer is
//! reported as [`ProtocolError::UnsupportedVersion`] rather than as a
//! generic decode failure.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::identity::{ParticipantId, RoomId};

/// Current envelope version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Codec used for frames sent to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON in text frames.
    #[default]
    Json,
    /// bincode in binary frames.
    Binary,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "binary",
        }
    }
}

impl FromStr for Encoding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "binary" | "bincode" => Ok(Encoding::Binary),
            other => Err(ProtocolError::Decode(format!("unknown encoding {other:?}"))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor selection, 1-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

impl SelectionRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line_number: start_line,
            start_column,
            end_line_number: end_line,
            end_column,
        }
    }

    /// Zero-width selection (a bare caret).
    pub fn caret(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    pub fn is_empty(&self) -> bool {
        self.start_line_number == self.end_line_number && self.start_column == self.end_column
    }
}

impl Default for SelectionRange {
    fn default() -> Self {
        Self::caret(1, 1)
    }
}

/// Selection broadcast from one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub user_id: ParticipantId,
    pub range: SelectionRange,
    pub color: String,
}

/// Chat line, relayed untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: ParticipantId,
    pub name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Explicit join intent. Only `room` is acted on; identity comes from the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room: RoomId,
    pub user_id: Option<ParticipantId>,
    pub name: Option<String>,
    pub color: Option<String>,
}

impl JoinRequest {
    pub fn room(room: impl Into<String>) -> Self {
        Self {
            room: RoomId::new(room),
            user_id: None,
            name: None,
            color: None,
        }
    }
}

/// One roster line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub name: String,
    pub color: String,
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientEvent {
    Join(JoinRequest),
    TextUpdate(String),
    CursorUpdate(CursorUpdate),
    ChatUpdate(ChatMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::TextUpdate(_) => "text-update",
            ClientEvent::CursorUpdate(_) => "cursor-update",
            ClientEvent::ChatUpdate(_) => "chat-update",
        }
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full roster snapshot, sent on every join and leave.
    Users(Vec<RosterEntry>),
    TextUpdate(String),
    CursorUpdate(CursorUpdate),
    ChatUpdate(ChatMessage),
    /// Sent only to the connection whose frame was dropped at ingress.
    Rejected { reason: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Users(_) => "users",
            ServerEvent::TextUpdate(_) => "text-update",
            ServerEvent::CursorUpdate(_) => "cursor-update",
            ServerEvent::ChatUpdate(_) => "chat-update",
            ServerEvent::Rejected { .. } => "rejected",
        }
    }
}

/// A frame ready for (or fresh off) the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Data frames only; control frames yield `None`.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Frame::Text(text.to_string())),
            Message::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

/// Versioned wrapper around every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub v: u16,
    pub event: E,
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u16,
}

impl<E> Envelope<E> {
    pub fn new(event: E) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event,
        }
    }
}

impl<E: Serialize> Envelope<E> {
    /// Serialize with the given codec.
    pub fn encode(&self, encoding: Encoding) -> Result<Frame, ProtocolError> {
        match encoding {
            Encoding::Json => serde_json::to_string(self)
                .map(Frame::Text)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
            Encoding::Binary => bincode::serde::encode_to_vec(self, bincode::config::standard())
                .map(Frame::Binary)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
        }
    }
}

impl<E: DeserializeOwned> Envelope<E> {
    /// Decode either frame kind, checking the version first.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        match frame {
            Frame::Text(text) => Self::decode_json(text),
            Frame::Binary(bytes) => Self::decode_binary(bytes),
        }
    }

    pub fn decode_json(text: &str) -> Result<Self, ProtocolError> {
        let probe: VersionProbe =
            serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        check_version(probe.v)?;
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    pub fn decode_binary(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let config = bincode::config::standard();
        let (version, _): (u16, usize) = bincode::serde::decode_from_slice(bytes, config)
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        check_version(version)?;
        let (envelope, _) = bincode::serde::decode_from_slice(bytes, config)
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(envelope)
    }
}

fn check_version(found: u16) -> Result<(), ProtocolError> {
    if found != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            found,
            expected: PROTOCOL_VERSION,
        });
    }
    Ok(())
}

/// Encode a single event in a fresh envelope.
pub fn encode_event<E: Serialize>(event: &E, encoding: Encoding) -> Result<Frame, ProtocolError> {
    Envelope::new(event).encode(encoding)
}

/// Decode a frame and unwrap its event.
pub fn decode_event<E: DeserializeOwned>(frame: &Frame) -> Result<E, ProtocolError> {
    Envelope::<E>::decode(frame).map(|envelope| envelope.event)
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    ConnectionClosed,
}
