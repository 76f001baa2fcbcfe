//! Session registry.
//!
//! Maps session ids to live [`Session`]s and owns their lifecycle. Each
//! session is guarded by its own mutex; the registry map lock is only held
//! for lookup, insert and remove, and never while a session lock is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use whiteboard_core::{
    CommandAccepted, DrawCommand, RedoResult, ServerMessage, SessionLog, Snapshot, UndoResult,
};

use crate::config::SessionConfig;
use crate::metrics::set_sessions_active;
use crate::router;

/// Identifies one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member's outbound queue, drained by its socket task.
pub type Outbound = mpsc::UnboundedSender<Arc<str>>;

/// Mutable state of one session, only reachable through its lock.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) log: SessionLog,
    pub(crate) members: HashMap<ConnectionId, Outbound>,
    emptied_at: Option<Instant>,
    disposed: bool,
}

impl SessionState {
    pub(crate) fn new(log: SessionLog) -> Self {
        Self {
            log,
            members: HashMap::new(),
            emptied_at: None,
            disposed: false,
        }
    }
}

/// One collaborative drawing session.
///
/// Every operation takes the session lock, mutates the log, and queues
/// the resulting broadcast before releasing it.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(id: String, log: SessionLog) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::new(log)),
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!(session_id = %self.id, "Session lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Append a command and relay it to every other member.
    pub fn submit(&self, from: ConnectionId, command: DrawCommand) -> CommandAccepted {
        let mut state = self.lock();
        let accepted = state.log.submit(command.clone());
        router::deliver_to_others(&state, from, &ServerMessage::Drawing(command));
        accepted
    }

    /// Undo the newest command and relay the undo to all members.
    ///
    /// The undo is relayed even when there is nothing to undo, so every
    /// replica runs the same no-op.
    pub fn undo(&self) -> UndoResult {
        let mut state = self.lock();
        let result = state.log.undo();
        router::deliver_to_all(&state, &ServerMessage::Undo);
        result
    }

    /// Redo the most recently undone command and relay the redo to all members.
    pub fn redo(&self) -> RedoResult {
        let mut state = self.lock();
        let result = state.log.redo();
        router::deliver_to_all(&state, &ServerMessage::Redo);
        result
    }

    /// Send the current history to one member.
    pub fn resync(&self, to: ConnectionId) -> bool {
        router::deliver_snapshot(&self.lock(), to)
    }

    /// Copy of the log and redo stack.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.lock().log.snapshot()
    }

    /// Number of connected members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }
}

/// Registry of live sessions.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: SessionConfig,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn new_log(&self) -> SessionLog {
        match self.config.max_log_len {
            Some(max_len) => SessionLog::with_max_len(max_len),
            None => SessionLog::new(),
        }
    }

    /// Attach a connection to a session and queue the join response.
    ///
    /// `None` creates a session with a fresh random id. An unknown id
    /// creates an empty session under that id. The member's queue then
    /// receives the raw session id followed by the `history` snapshot.
    pub fn join_or_create(
        &self,
        id: Option<&str>,
        connection: ConnectionId,
        outbound: Outbound,
    ) -> Arc<Session> {
        loop {
            let session = match id {
                Some(id) => self.get_or_insert(id),
                None => self.insert_generated(),
            };

            let mut state = session.lock();
            if state.disposed {
                drop(state);
                self.remove_if_same(&session);
                continue;
            }

            state.members.insert(connection, outbound.clone());
            state.emptied_at = None;
            router::deliver_text(&state, connection, session.id());
            router::deliver_snapshot(&state, connection);
            tracing::info!(
                session_id = %session.id,
                connection_id = %connection,
                members = state.members.len(),
                "Connection joined session"
            );
            drop(state);
            return session;
        }
    }

    fn get_or_insert(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.write_sessions();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id = %id, "Creating session");
                Arc::new(Session::new(id.to_string(), self.new_log()))
            })
            .clone();
        set_sessions_active(sessions.len());
        session
    }

    fn insert_generated(&self) -> Arc<Session> {
        let mut sessions = self.write_sessions();
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if sessions.contains_key(&id) {
                tracing::warn!(session_id = %id, "Generated session id collided, regenerating");
                continue;
            }
            tracing::info!(session_id = %id, "Creating session");
            let session = Arc::new(Session::new(id.clone(), self.new_log()));
            sessions.insert(id, Arc::clone(&session));
            set_sessions_active(sessions.len());
            return session;
        }
    }

    /// Detach a connection. An emptied session is disposed immediately, or
    /// left for the reaper when a retention period is configured.
    pub fn leave(&self, session: &Arc<Session>, connection: ConnectionId) {
        let dispose = {
            let mut state = session.lock();
            if state.members.remove(&connection).is_none() {
                return;
            }
            tracing::info!(
                session_id = %session.id,
                connection_id = %connection,
                members = state.members.len(),
                "Connection left session"
            );
            if !state.members.is_empty() {
                return;
            }
            if self.config.retention.is_zero() {
                state.disposed = true;
                true
            } else {
                state.emptied_at = Some(Instant::now());
                false
            }
        };
        if dispose {
            self.remove_if_same(session);
        }
    }

    /// Dispose sessions that have been empty for longer than the retention
    /// period. Returns how many were removed.
    pub fn reap_idle(&self) -> usize {
        let candidates: Vec<Arc<Session>> = self.read_sessions().values().cloned().collect();
        let retention = self.config.retention;
        let mut reaped = 0;
        for session in candidates {
            let expired = {
                let mut state = session.lock();
                let expired = state.members.is_empty()
                    && state
                        .emptied_at
                        .is_some_and(|since| since.elapsed() >= retention);
                if expired {
                    state.disposed = true;
                }
                expired
            };
            if expired {
                self.remove_if_same(&session);
                reaped += 1;
            }
        }
        reaped
    }

    fn remove_if_same(&self, session: &Arc<Session>) {
        let mut sessions = self.write_sessions();
        if sessions
            .get(session.id())
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(session.id());
            tracing::info!(session_id = %session.id, "Disposed session");
        }
        set_sessions_active(sessions.len());
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.read_sessions().get(id).cloned()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    /// Ids of live sessions, sorted.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether the session map is usable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.sessions.is_poisoned()
    }

    /// Spawn the background task that disposes expired sessions.
    ///
    /// Returns `None` when sessions are disposed immediately on emptying.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.config.retention.is_zero() {
            return None;
        }
        let period = (self.config.retention / 2).max(Duration::from_millis(100));
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let reaped = registry.reap_idle();
                if reaped > 0 {
                    tracing::debug!(reaped, "Reaped idle sessions");
                }
            }
        }))
    }

    fn read_sessions(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
