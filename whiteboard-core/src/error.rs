//! Error types for commands and the wire protocol.

use thiserror::Error;

use crate::command::CommandKind;
use crate::protocol::MessageType;

/// Result type for command construction.
pub type CommandResult<T> = Result<T, CommandError>;

/// Why a drawing command was rejected as invalid.
///
/// A command that fails validation never enters a session log and is
/// never broadcast.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// A geometry field required by the command kind is absent.
    #[error("{kind} command is missing `{field}`")]
    MissingField {
        /// Kind of the rejected command.
        kind: CommandKind,
        /// Name of the missing wire field.
        field: &'static str,
    },

    /// A coordinate, width or radius is NaN or infinite.
    #[error("{kind} command has a non-finite `{field}`")]
    NonFinite {
        /// Kind of the rejected command.
        kind: CommandKind,
        /// Name of the offending wire field.
        field: &'static str,
    },

    /// Line width is zero or negative.
    #[error("line width must be positive, got {0}")]
    InvalidLineWidth(f32),

    /// Circle radius is negative.
    #[error("circle radius must not be negative, got {0}")]
    NegativeRadius(f32),

    /// Pencil stroke without any segment.
    #[error("pencil stroke has no segments")]
    EmptyStroke,
}

/// Errors raised while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text is not a JSON envelope of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `MsgType` names no known message.
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// `MsgType` is known but not valid in this direction.
    #[error("message type `{0}` is not accepted here")]
    UnexpectedType(MessageType),

    /// A message that carries a payload arrived with `Content: null`.
    #[error("`{0}` message requires content")]
    MissingContent(MessageType),

    /// The drawing payload failed validation.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    /// Raw text that is neither JSON nor a usable session id.
    #[error("invalid session id `{0}`")]
    InvalidSessionId(String),

    /// A message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
