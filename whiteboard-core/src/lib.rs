//! # Whiteboard Core
//!
//! Core logic for a collaborative whiteboard: the drawing command model,
//! the shared undo/redo session log, and the wire protocol spoken between
//! the relay server and its clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               whiteboard-core               │
//! ├─────────────────────────────────────────────┤
//! │  Command Model   │  Session Log             │
//! │  - Shapes        │  - Ordered log           │
//! │  - Style, Color  │  - Redo stack            │
//! │  - Validation    │  - Snapshots             │
//! ├─────────────────────────────────────────────┤
//! │  Protocol                                   │
//! │  - Join directives, JSON envelopes          │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod color;
pub mod command;
pub mod error;
pub mod log;
pub mod protocol;

pub use color::{Color, ParseColorError};
pub use command::{
    CommandKind, CommandPayload, DrawCommand, Point, Segment, Shape, Style, DEFAULT_LINE_WIDTH,
};
pub use error::{CommandError, CommandResult, ProtocolError};
pub use log::{CommandAccepted, RedoResult, SessionLog, Snapshot, UndoResult};
pub use protocol::{
    is_session_id_char, is_valid_session_id, ClientFrame, ClientMessage, JoinDirective,
    MessageType, ServerFrame, ServerMessage, JOIN_NEW_SESSION, MAX_SESSION_ID_LEN,
};

/// Whiteboard core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
