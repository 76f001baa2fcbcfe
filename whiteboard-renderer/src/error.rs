//! Renderer error types.

use thiserror::Error;
use whiteboard_core::{CommandError, ProtocolError};

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while rendering or driving a client canvas.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Requested surface dimensions cannot back a pixmap.
    #[error("Invalid surface size {width}x{height}")]
    InvalidSurfaceSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Encoding the surface failed.
    #[error("Failed to encode surface: {0}")]
    Encode(String),

    /// A server frame could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The canvas has not received a session id yet.
    #[error("Not joined to a session")]
    NotJoined,

    /// Pointer input produced an invalid command.
    #[error("Invalid command: {0}")]
    Command(#[from] CommandError),
}
