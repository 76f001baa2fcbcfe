//! # Whiteboard Server Library
//!
//! Session registry, connection handling and HTTP routes for the
//! whiteboard relay. This library is used by both the binary and
//! integration tests.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod config;
pub mod connection;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod routes;
pub mod validation;

pub use config::{CliArgs, ConnectionConfig, ServerConfig, SessionConfig};
pub use connection::{ConnectionHandler, ConnectionState, DropReason, HandleOutcome};
pub use registry::{ConnectionId, Registry, Session};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live sessions.
    pub registry: Arc<Registry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create state with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.session.clone())),
            config: Arc::new(config),
        }
    }

    /// Get a reference to the session registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Build a CORS layer that only allows localhost origins, or any origin
/// when configured to.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_any {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers(Any);
    }

    let port = config.addr.port();
    let localhost_origins = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
        // Common development ports for dev servers
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(), // Vite
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8080".to_string(),
    ];

    let origins: Vec<HeaderValue> = localhost_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Build the application router.
///
/// `/metrics` is only mounted when a Prometheus handle is supplied.
pub fn build_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let cors = build_cors_layer(&state.config);

    let mut app = Router::new()
        // Drawing protocol (the original path and an alias)
        .route("/canvas", get(routes::websocket_handler))
        .route("/ws", get(routes::websocket_handler))
        // Health check endpoints (Kubernetes probes)
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health", get(health::readiness))
        .route("/ping", get(routes::ping))
        .route("/api/sessions", get(routes::list_sessions))
        .route(
            "/api/sessions/{session_id}/history",
            get(routes::get_session_history),
        )
        .with_state(state);

    if let Some(handle) = metrics {
        let metrics_router = Router::new()
            .route("/metrics", get(routes::metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_router);
    }

    app
        // Request ID for distributed tracing correlation
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        // Structured request tracing with timing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
