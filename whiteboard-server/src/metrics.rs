//! Prometheus metrics for whiteboard-server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// Metric names as constants for consistency
const WS_CONNECTIONS_ACTIVE: &str = "whiteboard_ws_connections_active";
const SESSIONS_ACTIVE: &str = "whiteboard_sessions_active";
const WS_MESSAGES_TOTAL: &str = "whiteboard_ws_messages_total";
const COMMANDS_COMMITTED_TOTAL: &str = "whiteboard_commands_committed_total";
const HISTORY_OPS_TOTAL: &str = "whiteboard_history_ops_total";
const MESSAGES_DROPPED_TOTAL: &str = "whiteboard_messages_dropped_total";
const VALIDATION_FAILURES_TOTAL: &str = "whiteboard_validation_failures_total";
const RATE_LIMITED_TOTAL: &str = "whiteboard_rate_limited_total";
const LOG_EVICTIONS_TOTAL: &str = "whiteboard_log_evictions_total";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Increment active WebSocket connections.
pub fn inc_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement active WebSocket connections.
pub fn dec_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Update the live session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_active(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

/// Record a WebSocket message.
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `msg_type` - Envelope type (e.g., "drawing", "history_undo"), or "join"/"session_id"
pub fn record_ws_message(direction: &'static str, msg_type: &'static str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction,
        "type" => msg_type
    )
    .increment(1);
}

/// Record a committed drawing command.
pub fn record_command_committed(kind: &'static str) {
    counter!(COMMANDS_COMMITTED_TOTAL, "kind" => kind).increment(1);
}

/// Record an undo or redo.
///
/// # Arguments
///
/// * `op` - "undo" or "redo"
/// * `applied` - Whether an entry moved (false for the no-op outcome)
pub fn record_history_op(op: &'static str, applied: bool) {
    counter!(
        HISTORY_OPS_TOTAL,
        "op" => op,
        "outcome" => if applied { "applied" } else { "noop" }
    )
    .increment(1);
}

/// Record a dropped inbound message.
///
/// # Arguments
///
/// * `reason` - Why it was dropped (malformed, not_joined, ...)
pub fn record_message_dropped(reason: &'static str) {
    counter!(MESSAGES_DROPPED_TOTAL, "reason" => reason).increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `validation_type` - Type of validation that failed (session_id, message_size)
pub fn record_validation_failure(validation_type: &'static str) {
    counter!(VALIDATION_FAILURES_TOTAL, "type" => validation_type).increment(1);
}

/// Record a rate-limited message.
///
/// # Arguments
///
/// * `source` - Source of the rate-limited request (websocket, http, etc.)
pub fn record_rate_limited(source: &'static str) {
    counter!(RATE_LIMITED_TOTAL, "source" => source).increment(1);
}

/// Record entries evicted from the front of a bounded log.
pub fn record_log_evictions(count: usize) {
    if count > 0 {
        counter!(LOG_EVICTIONS_TOTAL).increment(count as u64);
    }
}
