//! Wire protocol shared by the server and clients.
//!
//! Every frame is text. The first frame a client sends is a raw join
//! directive (`init` or a session id); the server answers with the raw
//! session id followed by a `history` message. All later frames are JSON
//! envelopes:
//!
//! ```json
//! { "MsgType": "drawing", "Content": { "kind": "dot", "start": {"x": 1, "y": 2} } }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{CommandPayload, DrawCommand};
use crate::error::ProtocolError;
use crate::log::Snapshot;

/// Join directive asking the server to create a new session.
pub const JOIN_NEW_SESSION: &str = "init";

/// Maximum length of a session id.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Whether `c` may appear in a session id.
#[must_use]
pub fn is_session_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Whether `id` is a well-formed session id: 1-64 characters from
/// `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_SESSION_ID_LEN && id.chars().all(is_session_id_char)
}

/// Envelope message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A committed drawing command.
    #[serde(rename = "drawing")]
    Drawing,
    /// A full session snapshot.
    #[serde(rename = "history")]
    History,
    /// Undo the newest shared command.
    #[serde(rename = "history_undo")]
    HistoryUndo,
    /// Redo the most recently undone command.
    #[serde(rename = "history_redo")]
    HistoryRedo,
    /// Ask the server for a fresh snapshot.
    #[serde(rename = "getHistory")]
    GetHistory,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drawing => "drawing",
            Self::History => "history",
            Self::HistoryUndo => "history_undo",
            Self::HistoryRedo => "history_redo",
            Self::GetHistory => "getHistory",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drawing" => Ok(Self::Drawing),
            "history" => Ok(Self::History),
            "history_undo" => Ok(Self::HistoryUndo),
            "history_redo" => Ok(Self::HistoryRedo),
            "getHistory" => Ok(Self::GetHistory),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// The first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDirective {
    /// `init`: create a session with a server-generated id.
    NewSession,
    /// Join (or create) the session with this id.
    Existing(String),
}

impl JoinDirective {
    /// Parse raw join text. Surrounding whitespace is ignored.
    ///
    /// Returns `None` if the text is neither `init` nor a valid session id.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == JOIN_NEW_SESSION {
            Some(Self::NewSession)
        } else if is_valid_session_id(text) {
            Some(Self::Existing(text.to_string()))
        } else {
            None
        }
    }

    /// The requested session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::NewSession => None,
            Self::Existing(id) => Some(id),
        }
    }

    /// Raw wire text of the directive.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.session_id().unwrap_or(JOIN_NEW_SESSION)
    }
}

/// Incoming envelope before the content is interpreted.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "MsgType")]
    msg_type: String,
    #[serde(rename = "Content", default)]
    content: Value,
}

impl RawEnvelope {
    fn parse(text: &str) -> Result<(MessageType, Value), ProtocolError> {
        let raw: Self = serde_json::from_str(text)?;
        Ok((raw.msg_type.parse()?, raw.content))
    }
}

/// Outgoing envelope; `None` content serializes as `null`.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "MsgType")]
    msg_type: MessageType,
    #[serde(rename = "Content")]
    content: Option<&'a T>,
}

fn encode<T: Serialize>(msg_type: MessageType, content: Option<&T>) -> Result<String, ProtocolError> {
    serde_json::to_string(&Envelope { msg_type, content }).map_err(ProtocolError::Encode)
}

fn decode_command(content: Value) -> Result<DrawCommand, ProtocolError> {
    if content.is_null() {
        return Err(ProtocolError::MissingContent(MessageType::Drawing));
    }
    // Decode the loose payload first so validation failures stay distinct
    // from JSON shape errors.
    let payload: CommandPayload = serde_json::from_value(content)?;
    Ok(DrawCommand::try_from(payload)?)
}

fn looks_like_json(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

fn truncated(text: &str) -> String {
    text.trim().chars().take(MAX_SESSION_ID_LEN).collect()
}

/// Messages a joined client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Commit a drawing command.
    Drawing(DrawCommand),
    /// Undo the newest shared command.
    Undo,
    /// Redo the most recently undone command.
    Redo,
    /// Request a fresh snapshot.
    GetHistory,
}

impl ClientMessage {
    /// Decode a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the text is not an envelope, the type is
    /// unknown or server-only, or a drawing payload is invalid.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let (msg_type, content) = RawEnvelope::parse(text)?;
        match msg_type {
            MessageType::Drawing => decode_command(content).map(Self::Drawing),
            MessageType::HistoryUndo => Ok(Self::Undo),
            MessageType::HistoryRedo => Ok(Self::Redo),
            MessageType::GetHistory => Ok(Self::GetHistory),
            MessageType::History => Err(ProtocolError::UnexpectedType(msg_type)),
        }
    }

    /// The envelope type of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Drawing(_) => MessageType::Drawing,
            Self::Undo => MessageType::HistoryUndo,
            Self::Redo => MessageType::HistoryRedo,
            Self::GetHistory => MessageType::GetHistory,
        }
    }

    /// Encode as a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Drawing(command) => encode(self.message_type(), Some(command)),
            _ => encode::<()>(self.message_type(), None),
        }
    }
}

/// Messages the server sends to joined clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// A command committed by another member.
    Drawing(DrawCommand),
    /// The full session state.
    History(Snapshot),
    /// A member undid the newest command.
    Undo,
    /// A member redid the most recently undone command.
    Redo,
}

impl ServerMessage {
    /// Decode a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the text is not an envelope, the type is
    /// unknown or client-only, or the content does not match the type.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let (msg_type, content) = RawEnvelope::parse(text)?;
        match msg_type {
            MessageType::Drawing => decode_command(content).map(Self::Drawing),
            MessageType::History => {
                if content.is_null() {
                    return Err(ProtocolError::MissingContent(msg_type));
                }
                Ok(Self::History(serde_json::from_value(content)?))
            }
            MessageType::HistoryUndo => Ok(Self::Undo),
            MessageType::HistoryRedo => Ok(Self::Redo),
            MessageType::GetHistory => Err(ProtocolError::UnexpectedType(msg_type)),
        }
    }

    /// The envelope type of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Drawing(_) => MessageType::Drawing,
            Self::History(_) => MessageType::History,
            Self::Undo => MessageType::HistoryUndo,
            Self::Redo => MessageType::HistoryRedo,
        }
    }

    /// Encode as a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Drawing(command) => encode(self.message_type(), Some(command)),
            Self::History(snapshot) => encode(self.message_type(), Some(snapshot)),
            Self::Undo | Self::Redo => encode::<()>(self.message_type(), None),
        }
    }
}

/// Any frame a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Raw join directive.
    Join(JoinDirective),
    /// JSON envelope.
    Message(ClientMessage),
}

impl ClientFrame {
    /// Classify and decode a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if a JSON frame fails to decode or raw text
    /// is not a join directive.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if looks_like_json(text) {
            return ClientMessage::parse(text).map(Self::Message);
        }
        JoinDirective::parse(text)
            .map(Self::Join)
            .ok_or_else(|| ProtocolError::InvalidSessionId(truncated(text)))
    }
}

/// Any frame the server may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Raw session id answering a join.
    SessionId(String),
    /// JSON envelope.
    Message(ServerMessage),
}

impl ServerFrame {
    /// Classify and decode a server frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if a JSON frame fails to decode or raw text
    /// is not a session id.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if looks_like_json(text) {
            return ServerMessage::parse(text).map(Self::Message);
        }
        let id = text.trim();
        if is_valid_session_id(id) {
            Ok(Self::SessionId(id.to_string()))
        } else {
            Err(ProtocolError::InvalidSessionId(truncated(text)))
        }
    }
}
