//! Client-side session mirror.
//!
//! [`ClientReplica`] keeps a local copy of the shared log driven by server
//! messages. [`ClientCanvas`] wires a replica, a [`StrokeBuilder`] and a
//! [`ReplayEngine`] together: pointer events become outbound wire text,
//! inbound wire text becomes rendered output.
//!
//! The server relays a member's own drawings to everyone else but echoes
//! undo and redo to all members. Local drawings are therefore applied
//! optimistically, while local undo and redo only take effect when the
//! echo arrives.
//!
//! An optimistic drawing can land in the server log behind a remote one
//! the replica already appended before it. The two logs then differ in
//! order, and an undo echo would pop different commands. [`ClientCanvas`]
//! notices when that interleaving was possible and answers the next undo
//! or redo echo with a `getHistory` request; the snapshot puts the
//! replica back in server order.

use whiteboard_core::{
    ClientMessage, DrawCommand, JoinDirective, ServerFrame, ServerMessage, SessionLog, Snapshot,
};

use crate::backend::RenderBackend;
use crate::replay::ReplayEngine;
use crate::stroke::{PointerEvent, StrokeBuilder};
use crate::{RenderError, RenderResult};

/// What a server message did to the replica.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaUpdate {
    /// A command was appended; drawing it on top is enough.
    Appended(DrawCommand),
    /// The whole log was replaced by a snapshot.
    Replaced,
    /// The newest entry moved to the redo stack.
    Undone,
    /// The top of the redo stack moved back to the log.
    Redone,
    /// Undo or redo with nothing to move.
    Unchanged,
}

impl ReplicaUpdate {
    /// Whether the surface must be rebuilt from the log.
    #[must_use]
    pub fn needs_replay(&self) -> bool {
        matches!(self, Self::Replaced | Self::Undone | Self::Redone)
    }
}

/// Local mirror of a session's log and redo stack.
#[derive(Debug, Clone, Default)]
pub struct ClientReplica {
    log: SessionLog,
}

impl ClientReplica {
    /// Create an empty replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server message.
    pub fn apply(&mut self, message: &ServerMessage) -> ReplicaUpdate {
        match message {
            ServerMessage::History(snapshot) => {
                self.log = SessionLog::from_snapshot(snapshot.clone());
                ReplicaUpdate::Replaced
            }
            ServerMessage::Drawing(command) => {
                self.log.submit(command.clone());
                ReplicaUpdate::Appended(command.clone())
            }
            ServerMessage::Undo => {
                if self.log.undo().is_applied() {
                    ReplicaUpdate::Undone
                } else {
                    ReplicaUpdate::Unchanged
                }
            }
            ServerMessage::Redo => {
                if self.log.redo().is_applied() {
                    ReplicaUpdate::Redone
                } else {
                    ReplicaUpdate::Unchanged
                }
            }
        }
    }

    /// Record a command drawn locally before the server has seen it.
    pub fn submit_local(&mut self, command: DrawCommand) {
        self.log.submit(command);
    }

    /// Active commands in render order.
    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.log.commands()
    }

    /// Copy of the mirrored state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.log.snapshot()
    }

    /// Number of active commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether no command is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

/// How far the replica's order can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderState {
    /// Matches the last snapshot plus relayed commands.
    InSync,
    /// Local drawings not yet confirmed by a snapshot.
    LocalAhead,
    /// A remote drawing arrived while local drawings were unconfirmed.
    Interleaved,
    /// A snapshot was requested. `dirty` marks local drawings made since,
    /// which the requested snapshot will not contain.
    Resyncing { dirty: bool },
}

/// A drawing surface attached to one session.
pub struct ClientCanvas<B> {
    replica: ClientReplica,
    strokes: StrokeBuilder,
    engine: ReplayEngine<B>,
    session_id: Option<String>,
    ordering: OrderState,
}

impl<B: RenderBackend> ClientCanvas<B> {
    /// Create a canvas rendering onto `backend`.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            replica: ClientReplica::new(),
            strokes: StrokeBuilder::default(),
            engine: ReplayEngine::new(backend),
            session_id: None,
            ordering: OrderState::InSync,
        }
    }

    /// The first frame to send: `init`, or the id of the session to join.
    #[must_use]
    pub fn join_request(session_id: Option<&str>) -> String {
        session_id
            .map_or(JoinDirective::NewSession, |id| {
                JoinDirective::Existing(id.to_string())
            })
            .as_str()
            .to_string()
    }

    /// Feed a pointer event. Returns the wire text to send when the
    /// gesture completed a command.
    ///
    /// # Errors
    ///
    /// Returns an error if the gesture forms an invalid command or drawing
    /// fails.
    pub fn pointer(&mut self, event: PointerEvent) -> RenderResult<Option<String>> {
        match self.strokes.handle(event)? {
            Some(command) => self.commit(command).map(Some),
            None => Ok(None),
        }
    }

    /// Draw a command locally and return its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotJoined`] before the session id arrived, or
    /// an error if drawing or encoding fails.
    pub fn commit(&mut self, command: DrawCommand) -> RenderResult<String> {
        self.ensure_joined()?;
        self.engine.apply(&command)?;
        let text = ClientMessage::Drawing(command.clone()).to_json()?;
        self.replica.submit_local(command);
        self.ordering = match self.ordering {
            OrderState::InSync => OrderState::LocalAhead,
            OrderState::Resyncing { .. } => OrderState::Resyncing { dirty: true },
            other => other,
        };
        Ok(text)
    }

    /// Wipe the shared surface.
    ///
    /// # Errors
    ///
    /// See [`ClientCanvas::commit`].
    pub fn clear(&mut self) -> RenderResult<String> {
        self.commit(DrawCommand::clear())
    }

    /// Wire text asking the session to undo.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotJoined`] before the session id arrived.
    pub fn undo_request(&self) -> RenderResult<String> {
        self.ensure_joined()?;
        Ok(ClientMessage::Undo.to_json()?)
    }

    /// Wire text asking the session to redo.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotJoined`] before the session id arrived.
    pub fn redo_request(&self) -> RenderResult<String> {
        self.ensure_joined()?;
        Ok(ClientMessage::Redo.to_json()?)
    }

    /// Wire text asking for a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotJoined`] before the session id arrived.
    pub fn resync_request(&self) -> RenderResult<String> {
        self.ensure_joined()?;
        Ok(ClientMessage::GetHistory.to_json()?)
    }

    /// Handle one frame from the server.
    ///
    /// Returns wire text to send back when the replica needs a fresh
    /// snapshot to restore server order.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded or rendering fails.
    pub fn receive(&mut self, text: &str) -> RenderResult<Option<String>> {
        match ServerFrame::parse(text)? {
            ServerFrame::SessionId(id) => {
                tracing::debug!(session_id = %id, "Joined session");
                self.session_id = Some(id);
                Ok(None)
            }
            ServerFrame::Message(message) => self.apply(&message),
        }
    }

    /// Apply a decoded server message and update the surface.
    ///
    /// See [`ClientCanvas::receive`] for the returned request.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn apply(&mut self, message: &ServerMessage) -> RenderResult<Option<String>> {
        let update = self.replica.apply(message);
        match &update {
            ReplicaUpdate::Appended(command) => self.engine.apply(command)?,
            update if update.needs_replay() => self.redraw()?,
            _ => {}
        }
        self.track_order(message)
    }

    fn track_order(&mut self, message: &ServerMessage) -> RenderResult<Option<String>> {
        let (next, resync) = match (self.ordering, message) {
            // Local drawings made after the request are missing from it.
            (OrderState::Resyncing { dirty: true }, ServerMessage::History(_)) => {
                (OrderState::Resyncing { dirty: false }, true)
            }
            (_, ServerMessage::History(_)) => (OrderState::InSync, false),
            (OrderState::LocalAhead, ServerMessage::Drawing(_)) => (OrderState::Interleaved, false),
            (OrderState::Interleaved, ServerMessage::Undo | ServerMessage::Redo) => {
                tracing::debug!("Replica order may differ from the session; resyncing");
                (OrderState::Resyncing { dirty: false }, true)
            }
            (current, _) => (current, false),
        };
        self.ordering = next;
        if resync {
            self.resync_request().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Rebuild the surface from the replica.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn redraw(&mut self) -> RenderResult<()> {
        self.engine.replay(self.replica.commands())
    }

    /// Resize the surface and redraw.
    ///
    /// # Errors
    ///
    /// Returns an error if resizing or rendering fails.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.engine.resize(width, height, self.replica.commands())
    }

    fn ensure_joined(&self) -> RenderResult<()> {
        if self.session_id.is_some() {
            Ok(())
        } else {
            Err(RenderError::NotJoined)
        }
    }

    /// Session id received from the server, once joined.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The local mirror of the session.
    #[must_use]
    pub fn replica(&self) -> &ClientReplica {
        &self.replica
    }

    /// The stroke builder, for tool and style changes.
    pub fn strokes_mut(&mut self) -> &mut StrokeBuilder {
        &mut self.strokes
    }

    /// The render backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        self.engine.backend()
    }
}
