//! WebSocket message codec.
//!
//! Viewers talk to the server with a small JSON envelope,
//! `{"type": "sync-time", "time": 12.5}`. Older pages send the bare text
//! literals `pause` / `unpause` instead. Both shapes decode into [`Message`],
//! which remembers the [`WireFormat`] it arrived in so that it is relayed to
//! other viewers in the same shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message type identifiers understood by the router.
pub mod msg_types {
    /// Seek: carries the playback position in `time`.
    pub const SYNC_TIME: &str = "sync-time";
    pub const PAUSE: &str = "pause";
    pub const PLAY: &str = "play";
    /// Alias of `play` used by the text-literal pages.
    pub const UNPAUSE: &str = "unpause";
}

/// What a message asks the receiving players to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    SyncTime,
    Pause,
    Play,
    /// Any other `type`. Decodes fine, the router ignores it.
    Other(String),
}

impl MessageKind {
    /// Map a `type` string to a kind. Comparison is literal (case sensitive).
    pub fn from_type(msg_type: &str) -> Self {
        match msg_type {
            msg_types::SYNC_TIME => MessageKind::SyncTime,
            msg_types::PAUSE => MessageKind::Pause,
            msg_types::PLAY | msg_types::UNPAUSE => MessageKind::Play,
            other => MessageKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::SyncTime => msg_types::SYNC_TIME,
            MessageKind::Pause => msg_types::PAUSE,
            MessageKind::Play => msg_types::PLAY,
            MessageKind::Other(other) => other,
        }
    }

    /// True for the kinds that get rebroadcast.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, MessageKind::Other(_))
    }

    fn text_literal(&self) -> Option<&'static str> {
        match self {
            MessageKind::Pause => Some(msg_types::PAUSE),
            MessageKind::Play => Some(msg_types::UNPAUSE),
            _ => None,
        }
    }

    fn from_text_literal(text: &str) -> Option<Self> {
        match text.trim() {
            msg_types::PAUSE => Some(MessageKind::Pause),
            msg_types::UNPAUSE => Some(MessageKind::Play),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a message on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WireFormat {
    /// `{"type": "...", "time": ...}`
    #[default]
    Json,
    /// Bare `pause` / `unpause` literals.
    Text,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Json => f.write_str("json"),
            WireFormat::Text => f.write_str("text"),
        }
    }
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Playback position in seconds. Passed through verbatim, never clamped.
    pub time: Option<f64>,
    pub format: WireFormat,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            time: None,
            format: WireFormat::Json,
        }
    }

    pub fn sync_time(time: f64) -> Self {
        Self::new(MessageKind::SyncTime).with_time(time)
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }
}

/// JSON envelope as it travels on the socket.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<f64>,
}

/// Errors produced while decoding an inbound frame.
///
/// None of these close the connection; the frame is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Expected a JSON object with a \"type\" field")]
    NotAnObject,

    #[error("Unknown text literal: {0:?}")]
    UnknownLiteral(String),

    #[error("Invalid message fields: {0}")]
    InvalidFields(String),
}

impl DecodeError {
    /// Short label used for metrics.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::NotAnObject => "not_an_object",
            DecodeError::UnknownLiteral(_) => "unknown_literal",
            DecodeError::InvalidFields(_) => "invalid_fields",
        }
    }
}

/// Decode the payload of one inbound frame.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            // Not JSON at all: the only other accepted shape is a bare literal.
            return std::str::from_utf8(bytes)
                .ok()
                .and_then(MessageKind::from_text_literal)
                .map(|kind| Message::new(kind).with_format(WireFormat::Text))
                .ok_or_else(|| DecodeError::Malformed(e.to_string()));
        }
    };

    match value {
        serde_json::Value::Object(_) => {
            let envelope: Envelope = serde_json::from_value(value)
                .map_err(|e| DecodeError::InvalidFields(e.to_string()))?;
            Ok(Message {
                kind: MessageKind::from_type(&envelope.msg_type),
                time: envelope.time,
                format: WireFormat::Json,
            })
        }
        // `JSON.stringify("pause")` on the page side
        serde_json::Value::String(text) => match MessageKind::from_text_literal(&text) {
            Some(kind) => Ok(Message::new(kind).with_format(WireFormat::Text)),
            None => Err(DecodeError::UnknownLiteral(text)),
        },
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Encode a message in its own wire format.
///
/// A `Text` message whose kind has no literal falls back to JSON.
pub fn encode(message: &Message) -> serde_json::Result<String> {
    if message.format == WireFormat::Text {
        if let Some(literal) = message.kind.text_literal() {
            return Ok(literal.to_string());
        }
    }
    serde_json::to_string(&Envelope {
        msg_type: message.kind.as_str().to_string(),
        time: message.time,
    })
}
