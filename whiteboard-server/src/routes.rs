//! HTTP and WebSocket route handlers.

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;

use crate::connection::handle_socket;
use crate::validation::validate_session_id;
use crate::AppState;

/// Session listing response.
#[derive(Debug, Serialize)]
pub struct SessionList {
    /// Live session ids, sorted.
    pub sessions: Vec<String>,
    /// Number of live sessions.
    pub count: usize,
}

/// Upgrade to the drawing protocol.
#[tracing::instrument(name = "websocket_connect", skip(ws, state))]
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Connectivity check.
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

/// List live sessions.
#[tracing::instrument(name = "list_sessions", skip(state))]
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    let sessions = state.registry.session_ids();
    Json(SessionList {
        count: sessions.len(),
        sessions,
    })
}

/// Current log and redo stack of one session.
#[tracing::instrument(name = "get_session_history", skip(state))]
pub async fn get_session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Err(e) = validate_session_id(&session_id) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
    }
    match state.registry.get(&session_id) {
        Some(session) => Json(session.snapshot()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("session not found: {session_id}") })),
        )
            .into_response(),
    }
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "metrics", skip(handle))]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
