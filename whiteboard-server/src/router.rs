//! Fan-out of server messages to session members.
//!
//! Every function here runs with the session lock held and only enqueues
//! onto member channels, so recipients observe messages in the order the
//! log was mutated.

use std::sync::Arc;

use whiteboard_core::ServerMessage;

use crate::metrics::record_ws_message;
use crate::registry::{ConnectionId, SessionState};

/// Serialize `message` once for sharing across recipients.
fn encode(message: &ServerMessage) -> Option<Arc<str>> {
    match message.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!(
                msg_type = %message.message_type(),
                "Failed to serialize server message: {}",
                e
            );
            None
        }
    }
}

fn enqueue(
    state: &SessionState,
    to: ConnectionId,
    text: &Arc<str>,
    msg_type: &'static str,
) -> bool {
    let Some(outbound) = state.members.get(&to) else {
        return false;
    };
    if outbound.send(Arc::clone(text)).is_err() {
        tracing::debug!(connection_id = %to, "Skipping member with closed queue");
        return false;
    }
    record_ws_message("outbound", msg_type);
    true
}

/// Deliver `message` to every member except `sender`.
///
/// Returns the number of members it was queued for.
pub fn deliver_to_others(
    state: &SessionState,
    sender: ConnectionId,
    message: &ServerMessage,
) -> usize {
    let Some(text) = encode(message) else {
        return 0;
    };
    let msg_type = message.message_type().as_str();
    state
        .members
        .keys()
        .filter(|id| **id != sender)
        .filter(|id| enqueue(state, **id, &text, msg_type))
        .count()
}

/// Deliver `message` to every member, the sender included.
///
/// Returns the number of members it was queued for.
pub fn deliver_to_all(state: &SessionState, message: &ServerMessage) -> usize {
    let Some(text) = encode(message) else {
        return 0;
    };
    let msg_type = message.message_type().as_str();
    state
        .members
        .keys()
        .filter(|id| enqueue(state, **id, &text, msg_type))
        .count()
}

/// Deliver the current log and redo stack to one member.
pub fn deliver_snapshot(state: &SessionState, to: ConnectionId) -> bool {
    let message = ServerMessage::History(state.log.snapshot());
    encode(&message).is_some_and(|text| enqueue(state, to, &text, "history"))
}

/// Deliver raw text (the join response) to one member.
pub fn deliver_text(state: &SessionState, to: ConnectionId, text: &str) -> bool {
    enqueue(state, to, &Arc::from(text), "session_id")
}
