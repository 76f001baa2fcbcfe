//! # WebSocket Connection Handling
//!
//! One task per connection drives a [`ConnectionHandler`] state machine:
//!
//! ```text
//! Connecting ──join──► Joined ──close / error / heartbeat timeout / stalled send──► Closed
//! ```
//!
//! ## Message Protocol
//!
//! ### Client -> Server
//!
//! - first frame: raw text `init` or a session id
//! - `{"MsgType": "drawing", "Content": {...}}`
//! - `{"MsgType": "history_undo", "Content": null}`
//! - `{"MsgType": "history_redo", "Content": null}`
//! - `{"MsgType": "getHistory", "Content": null}`
//!
//! ### Server -> Client
//!
//! - raw text session id, once, answering the join
//! - `{"MsgType": "history", "Content": {"Actions": [...], "RedoArr": [...]}}`
//! - `drawing`, `history_undo`, `history_redo` relayed from other members
//!
//! Nothing a client sends closes its connection: rejected frames are
//! logged, counted and dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use whiteboard_core::{
    ClientFrame, ClientMessage, CommandAccepted, JoinDirective, ProtocolError, RedoResult,
    UndoResult,
};

use crate::config::ConnectionConfig;
use crate::metrics::{
    dec_ws_connections, inc_ws_connections, record_command_committed, record_history_op,
    record_log_evictions, record_message_dropped, record_rate_limited, record_validation_failure,
    record_ws_message,
};
use crate::registry::{ConnectionId, Outbound, Registry, Session};
use crate::validation::{validate_message_size, validate_session_id};
use crate::AppState;

/// Per-connection frame allowance.
///
/// A connection may send `burst` frames back to back; after that its
/// allowance grows by `per_second` frames per second, never beyond `burst`.
#[derive(Debug)]
pub struct RateLimiter {
    allowance: f64,
    burst: f64,
    per_second: f64,
    checked_at: Instant,
}

impl RateLimiter {
    /// Create a limiter starting with a full burst allowance.
    #[must_use]
    pub fn new(burst: u32, per_second: u32) -> Self {
        Self {
            allowance: f64::from(burst),
            burst: f64::from(burst),
            per_second: f64::from(per_second),
            checked_at: Instant::now(),
        }
    }

    /// Create a limiter from connection settings.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.rate_limit_burst, config.rate_limit_sustained)
    }

    /// Whether one more frame may be handled now.
    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    fn try_consume_at(&mut self, now: Instant) -> bool {
        let earned = now.saturating_duration_since(self.checked_at).as_secs_f64() * self.per_second;
        self.allowance = (self.allowance + earned).min(self.burst);
        self.checked_at = now;

        if self.allowance < 1.0 {
            return false;
        }
        self.allowance -= 1.0;
        true
    }
}

/// Protocol state of one connection.
#[derive(Debug)]
pub enum ConnectionState {
    /// Waiting for the join directive.
    Connecting,
    /// Member of a session.
    Joined(Arc<Session>),
    /// Left its session; everything is dropped.
    Closed,
}

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Envelope received before the join directive.
    NotJoined,
    /// A second join directive.
    AlreadyJoined,
    /// Raw text that is neither `init` nor a valid session id.
    InvalidJoin,
    /// Unparseable frame or unknown message type.
    Malformed,
    /// A drawing whose command failed validation.
    InvalidCommand,
    /// The connection already left its session.
    Closed,
}

impl DropReason {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotJoined => "not_joined",
            Self::AlreadyJoined => "already_joined",
            Self::InvalidJoin => "invalid_join",
            Self::Malformed => "malformed",
            Self::InvalidCommand => "invalid_command",
            Self::Closed => "closed",
        }
    }
}

/// Result of handling one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Joined the session with this id.
    Joined(String),
    /// A drawing was appended to the log.
    Committed(CommandAccepted),
    /// An undo was applied (possibly as a no-op).
    Undo(UndoResult),
    /// A redo was applied (possibly as a no-op).
    Redo(RedoResult),
    /// The history was re-sent to this connection.
    Resynced,
    /// The frame was dropped.
    Dropped(DropReason),
}

/// Per-connection protocol state machine.
///
/// Owns the connection's outbound queue sender; the socket task drains
/// the matching receiver. Dropping the handler leaves the session.
#[derive(Debug)]
pub struct ConnectionHandler {
    id: ConnectionId,
    registry: Arc<Registry>,
    outbound: Outbound,
    state: ConnectionState,
}

impl ConnectionHandler {
    /// Create a handler in the `Connecting` state.
    #[must_use]
    pub fn new(registry: Arc<Registry>, outbound: Outbound) -> Self {
        Self {
            id: ConnectionId::new(),
            registry,
            outbound,
            state: ConnectionState::Connecting,
        }
    }

    /// This connection's id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The joined session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        match &self.state {
            ConnectionState::Joined(session) => Some(session),
            ConnectionState::Connecting | ConnectionState::Closed => None,
        }
    }

    /// Handle one inbound text frame.
    pub fn handle_text(&mut self, text: &str) -> HandleOutcome {
        let session = match &self.state {
            ConnectionState::Joined(session) => Some(Arc::clone(session)),
            ConnectionState::Connecting => None,
            ConnectionState::Closed => return self.dropped(DropReason::Closed),
        };

        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(ProtocolError::InvalidSessionId(_)) if session.is_none() => {
                if let Err(e) = validate_session_id(text.trim()) {
                    record_validation_failure(e.kind());
                    tracing::warn!(connection_id = %self.id, "Rejected join directive: {}", e);
                }
                return self.dropped(DropReason::InvalidJoin);
            }
            Err(e @ ProtocolError::InvalidCommand(_)) => {
                tracing::warn!(connection_id = %self.id, "Rejected drawing: {}", e);
                return self.dropped(DropReason::InvalidCommand);
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.id, "Failed to parse client message: {}", e);
                return self.dropped(DropReason::Malformed);
            }
        };

        match (session, frame) {
            (None, ClientFrame::Join(directive)) => {
                record_ws_message("inbound", "join");
                self.join(&directive)
            }
            (None, ClientFrame::Message(message)) => {
                tracing::debug!(
                    connection_id = %self.id,
                    msg_type = %message.message_type(),
                    "Message before join"
                );
                self.dropped(DropReason::NotJoined)
            }
            (Some(_), ClientFrame::Join(_)) => self.dropped(DropReason::AlreadyJoined),
            (Some(session), ClientFrame::Message(message)) => {
                record_ws_message("inbound", message.message_type().as_str());
                self.dispatch(&session, message)
            }
        }
    }

    fn join(&mut self, directive: &JoinDirective) -> HandleOutcome {
        let session =
            self.registry
                .join_or_create(directive.session_id(), self.id, self.outbound.clone());
        let id = session.id().to_string();
        self.state = ConnectionState::Joined(session);
        HandleOutcome::Joined(id)
    }

    fn dispatch(&self, session: &Session, message: ClientMessage) -> HandleOutcome {
        match message {
            ClientMessage::Drawing(command) => {
                let kind = command.kind().as_str();
                let accepted = session.submit(self.id, command);
                record_command_committed(kind);
                record_log_evictions(accepted.evicted);
                tracing::debug!(
                    session_id = %session.id(),
                    connection_id = %self.id,
                    kind,
                    position = accepted.position,
                    "Committed drawing"
                );
                HandleOutcome::Committed(accepted)
            }
            ClientMessage::Undo => {
                let result = session.undo();
                record_history_op("undo", result.is_applied());
                HandleOutcome::Undo(result)
            }
            ClientMessage::Redo => {
                let result = session.redo();
                record_history_op("redo", result.is_applied());
                HandleOutcome::Redo(result)
            }
            ClientMessage::GetHistory => {
                session.resync(self.id);
                HandleOutcome::Resynced
            }
        }
    }

    fn dropped(&self, reason: DropReason) -> HandleOutcome {
        record_message_dropped(reason.as_str());
        tracing::debug!(connection_id = %self.id, reason = reason.as_str(), "Dropped message");
        HandleOutcome::Dropped(reason)
    }

    /// Leave the session, if joined. Idempotent.
    pub fn close(&mut self) {
        if let ConnectionState::Joined(session) =
            std::mem::replace(&mut self.state, ConnectionState::Closed)
        {
            self.registry.leave(&session, self.id);
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply the rate limit and size limit to an inbound frame.
///
/// Returns `None` if the frame was dropped before reaching the handler.
pub fn admit(
    handler: &mut ConnectionHandler,
    limiter: &mut RateLimiter,
    config: &ConnectionConfig,
    text: &str,
) -> Option<HandleOutcome> {
    if !limiter.try_consume() {
        tracing::warn!(connection_id = %handler.id(), "Rate limit exceeded");
        record_rate_limited("websocket");
        record_message_dropped("rate_limited");
        return None;
    }
    if let Err(e) = validate_message_size(text.len(), config.max_message_bytes) {
        tracing::warn!(connection_id = %handler.id(), "Message rejected: {}", e);
        record_validation_failure(e.kind());
        record_message_dropped("too_large");
        return None;
    }
    Some(handler.handle_text(text))
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Send one frame. With a heartbeat configured, a peer that stops reading
/// for a whole period fails the send instead of blocking the connection.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    message: Message,
    deadline: Option<Duration>,
) -> Result<(), &'static str> {
    let send = sender.send(message);
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err("send failed"),
            Err(_) => Err("send stalled"),
        },
        None => send.await.map_err(|_| "send failed"),
    }
}

/// Drive one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let config = state.config.connection.clone();
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Arc<str>>();

    let mut handler = ConnectionHandler::new(Arc::clone(&state.registry), outbound);
    let connection_id = handler.id();
    let mut rate_limiter = RateLimiter::from_config(&config);

    let mut heartbeat = config.heartbeat.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut last_seen = Instant::now();

    inc_ws_connections();
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        last_seen = Instant::now();
                        match msg {
                            Message::Text(text) => {
                                if let Some(outcome) =
                                    admit(&mut handler, &mut rate_limiter, &config, text.as_str())
                                {
                                    tracing::trace!(connection_id = %connection_id, ?outcome, "Handled message");
                                }
                            }
                            Message::Binary(_) => {
                                tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
                                record_message_dropped("binary");
                            }
                            Message::Close(_) => break "closed by client",
                            // Pings are answered by the transport.
                            Message::Ping(_) | Message::Pong(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %connection_id, "WebSocket error: {}", e);
                        break "transport error";
                    }
                    None => break "stream ended",
                }
            }
            Some(text) = outbound_rx.recv() => {
                let frame = Message::Text(text.to_string().into());
                if let Err(reason) = send_frame(&mut sender, frame, config.heartbeat).await {
                    tracing::warn!(connection_id = %connection_id, reason, "Dropping connection");
                    break reason;
                }
            }
            () = tick(heartbeat.as_mut()) => {
                if let Some(period) = config.heartbeat {
                    if last_seen.elapsed() > period * 2 {
                        tracing::warn!(connection_id = %connection_id, "Connection lost: no traffic for two heartbeat periods");
                        break "heartbeat timeout";
                    }
                }
                if let Err(reason) = send_frame(&mut sender, Message::Ping(Bytes::new()), config.heartbeat).await {
                    tracing::warn!(connection_id = %connection_id, reason, "Dropping connection");
                    break reason;
                }
            }
        }
    };

    handler.close();
    dec_ws_connections();
    tracing::info!(connection_id = %connection_id, reason, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use whiteboard_core::{Color, DrawCommand, Point, ServerMessage, Snapshot, Style};

    fn handler(registry: &Arc<Registry>) -> (ConnectionHandler, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandler::new(Arc::clone(registry), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Arc<str>>) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    fn line() -> DrawCommand {
        DrawCommand::line(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Style::new(2.0, Color::BLACK),
        )
        .expect("line")
    }

    fn drawing_text() -> String {
        ServerMessage::Drawing(line()).to_json().expect("encode")
    }

    #[test]
    fn test_init_joins_new_session() {
        let registry = Arc::new(Registry::default());
        let (mut conn, mut rx) = handler(&registry);

        let outcome = conn.handle_text("init");
        let HandleOutcome::Joined(id) = outcome else {
            panic!("expected join, got {outcome:?}");
        };
        assert!(conn.session().is_some());

        let frames = drain(&mut rx);
        assert_eq!(&*frames[0], id);
        assert_eq!(
            ServerMessage::parse(&frames[1]).expect("history"),
            ServerMessage::History(Snapshot::default())
        );
    }

    #[test]
    fn test_invalid_join_stays_connecting() {
        let registry = Arc::new(Registry::default());
        let (mut conn, mut rx) = handler(&registry);

        assert_eq!(
            conn.handle_text("not a valid id!"),
            HandleOutcome::Dropped(DropReason::InvalidJoin)
        );
        assert_eq!(
            conn.handle_text(&"x".repeat(65)),
            HandleOutcome::Dropped(DropReason::InvalidJoin)
        );
        assert_eq!(
            conn.handle_text(""),
            HandleOutcome::Dropped(DropReason::InvalidJoin)
        );
        assert!(matches!(conn.state(), ConnectionState::Connecting));
        assert!(drain(&mut rx).is_empty());

        assert_eq!(
            conn.handle_text("room"),
            HandleOutcome::Joined("room".to_string())
        );
    }

    #[test]
    fn test_envelope_before_join_dropped() {
        let registry = Arc::new(Registry::default());
        let (mut conn, _rx) = handler(&registry);

        assert_eq!(
            conn.handle_text(&drawing_text()),
            HandleOutcome::Dropped(DropReason::NotJoined)
        );
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_second_join_dropped() {
        let registry = Arc::new(Registry::default());
        let (mut conn, _rx) = handler(&registry);
        conn.handle_text("room");

        assert_eq!(
            conn.handle_text("other"),
            HandleOutcome::Dropped(DropReason::AlreadyJoined)
        );
        assert_eq!(registry.session_ids(), vec!["room"]);
    }

    #[test]
    fn test_drawing_relayed_to_others_only() {
        let registry = Arc::new(Registry::default());
        let (mut a, mut rx_a) = handler(&registry);
        let (mut b, mut rx_b) = handler(&registry);
        a.handle_text("room");
        b.handle_text("room");
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = a.handle_text(&drawing_text());
        assert_eq!(
            outcome,
            HandleOutcome::Committed(CommandAccepted {
                position: 0,
                evicted: 0
            })
        );
        assert!(drain(&mut rx_a).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            ServerMessage::parse(&frames[0]).expect("decode"),
            ServerMessage::Drawing(line())
        );
    }

    #[test]
    fn test_undo_redo_outcomes() {
        let registry = Arc::new(Registry::default());
        let (mut a, _rx_a) = handler(&registry);
        a.handle_text("room");
        a.handle_text(&drawing_text());

        let undo = r#"{"MsgType":"history_undo","Content":null}"#;
        let redo = r#"{"MsgType":"history_redo","Content":null}"#;

        assert_eq!(
            a.handle_text(undo),
            HandleOutcome::Undo(UndoResult::Undone {
                command: line(),
                remaining: 0
            })
        );
        assert_eq!(
            a.handle_text(undo),
            HandleOutcome::Undo(UndoResult::NothingToUndo)
        );
        assert_eq!(
            a.handle_text(redo),
            HandleOutcome::Redo(RedoResult::Redone {
                command: line(),
                log_len: 1
            })
        );
    }

    #[test]
    fn test_malformed_and_invalid_commands_dropped() {
        let registry = Arc::new(Registry::default());
        let (mut a, _rx_a) = handler(&registry);
        a.handle_text("room");

        assert_eq!(
            a.handle_text("{not json"),
            HandleOutcome::Dropped(DropReason::Malformed)
        );
        assert_eq!(
            a.handle_text(r#"{"MsgType":"scribble","Content":null}"#),
            HandleOutcome::Dropped(DropReason::Malformed)
        );
        assert_eq!(
            a.handle_text(r#"{"MsgType":"drawing","Content":{"kind":"line","start":{"x":0,"y":0}}}"#),
            HandleOutcome::Dropped(DropReason::InvalidCommand)
        );
        let session = a.session().expect("joined");
        assert!(session.snapshot().log.is_empty());
    }

    #[test]
    fn test_get_history_resyncs_requester() {
        let registry = Arc::new(Registry::default());
        let (mut a, mut rx_a) = handler(&registry);
        a.handle_text("room");
        a.handle_text(&drawing_text());
        drain(&mut rx_a);

        assert_eq!(
            a.handle_text(r#"{"MsgType":"getHistory","Content":null}"#),
            HandleOutcome::Resynced
        );
        let frames = drain(&mut rx_a);
        match ServerMessage::parse(&frames[0]).expect("decode") {
            ServerMessage::History(snapshot) => assert_eq!(snapshot.log, vec![line()]),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_close_and_drop_leave_session() {
        let registry = Arc::new(Registry::new(SessionConfig::default()));
        let (mut a, _rx_a) = handler(&registry);
        let (mut b, _rx_b) = handler(&registry);
        a.handle_text("room");
        b.handle_text("room");

        a.close();
        a.close();
        assert!(matches!(a.state(), ConnectionState::Closed));
        assert_eq!(
            a.handle_text(&drawing_text()),
            HandleOutcome::Dropped(DropReason::Closed)
        );
        assert!(registry.get("room").is_some());

        drop(b);
        assert!(registry.get("room").is_none());
    }

    #[test]
    fn test_admit_drops_oversized() {
        let registry = Arc::new(Registry::default());
        let (mut a, _rx_a) = handler(&registry);
        let mut limiter = RateLimiter::new(10, 1);
        let config = ConnectionConfig {
            max_message_bytes: 8,
            ..ConnectionConfig::default()
        };

        assert_eq!(admit(&mut a, &mut limiter, &config, "0123456789"), None);
        assert!(matches!(a.state(), ConnectionState::Connecting));
        assert_eq!(
            admit(&mut a, &mut limiter, &config, "room"),
            Some(HandleOutcome::Joined("room".to_string()))
        );
    }

    #[test]
    fn test_admit_drops_over_rate() {
        let registry = Arc::new(Registry::default());
        let (mut a, _rx_a) = handler(&registry);
        let mut limiter = RateLimiter::new(1, 0);
        let config = ConnectionConfig::default();

        assert!(admit(&mut a, &mut limiter, &config, "room").is_some());
        assert_eq!(admit(&mut a, &mut limiter, &config, &drawing_text()), None);
    }

    #[test]
    fn test_drawing_flood_beyond_burst_is_dropped() {
        let registry = Arc::new(Registry::default());
        let (mut a, _rx_a) = handler(&registry);
        let mut limiter = RateLimiter::new(4, 0);
        let config = ConnectionConfig::default();

        assert!(admit(&mut a, &mut limiter, &config, "room").is_some());
        let text = drawing_text();
        let admitted = (0..10)
            .filter(|_| admit(&mut a, &mut limiter, &config, &text).is_some())
            .count();

        assert_eq!(admitted, 3);
        let session = registry.get("room").expect("session");
        assert_eq!(session.snapshot().log.len(), 3);
    }

    #[test]
    fn test_quiet_connection_earns_frames_back() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(2, 10);
        limiter.checked_at = start;
        assert!(limiter.try_consume_at(start));
        assert!(limiter.try_consume_at(start));
        assert!(!limiter.try_consume_at(start));

        // 10 frames per second: 200ms buys two more.
        let later = start + Duration::from_millis(200);
        assert!(limiter.try_consume_at(later));
        assert!(limiter.try_consume_at(later));
        assert!(!limiter.try_consume_at(later));
    }

    #[test]
    fn test_idle_connection_cannot_bank_beyond_burst() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(3, 10);
        limiter.checked_at = start;

        let much_later = start + Duration::from_secs(60);
        let allowed = (0..10)
            .filter(|_| limiter.try_consume_at(much_later))
            .count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn test_default_limits_allow_a_hundred_frame_burst() {
        let now = Instant::now();
        let mut limiter = RateLimiter::from_config(&ConnectionConfig::default());
        limiter.checked_at = now;
        let allowed = (0..150).filter(|_| limiter.try_consume_at(now)).count();
        assert_eq!(allowed, 100);
    }
}
