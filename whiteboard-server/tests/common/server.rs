//! Test server harness for integration tests.
//!
//! Provides a way to spin up a real Axum server on a random port
//! for integration testing with WebSocket and HTTP clients.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use whiteboard_server::{build_router, AppState, ServerConfig};

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server on a random available port with heartbeats
    /// disabled.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start() -> Self {
        let mut config = ServerConfig::default();
        config.connection.heartbeat = None;
        Self::start_with(config).await
    }

    /// Start a test server with the given configuration. The bind address
    /// is replaced with a free localhost port.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start_with(mut config: ServerConfig) -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        config.addr = SocketAddr::from(([127, 0, 0, 1], port));

        let listener = TcpListener::bind(config.addr)
            .await
            .expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        let state = AppState::new(config);
        let app = build_router(state.clone(), None);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Get the server's socket address.
    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the WebSocket URL for connecting to the server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/canvas", self.addr)
    }

    /// Get an HTTP URL for `path`.
    #[allow(dead_code)]
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Get access to the application state (for test assertions).
    #[allow(dead_code)]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(tokio::time::Duration::from_secs(5), self.handle).await;
    }
}
