//! # Whiteboard Server
//!
//! Relay server for the collaborative whiteboard. Clients connect over
//! WebSocket at `/canvas`, join a session, and exchange drawing commands.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whiteboard_server::metrics;
use whiteboard_server::{build_router, AppState, CliArgs, ServerConfig};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,whiteboard_server=debug,tower_http=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output (recommended for production).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,whiteboard_server=debug,tower_http=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    // Use JSON format in production (RUST_LOG_FORMAT=json)
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from(CliArgs::parse());

    init_tracing();

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
    tracing::info!("Prometheus metrics initialized");

    let addr = config.addr;
    tracing::info!(
        max_log_len = ?config.session.max_log_len,
        retention_secs = config.session.retention.as_secs(),
        heartbeat = ?config.connection.heartbeat,
        cors_any = config.cors_any,
        "Loaded configuration"
    );

    let state = AppState::new(config);
    let _reaper = state.registry.spawn_reaper();
    let app = build_router(state, Some(metrics_handle));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Whiteboard server listening on http://{}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/canvas", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Whiteboard server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
