//! Server configuration.
//!
//! Command-line flags (with environment fallbacks) are parsed into
//! [`CliArgs`] and converted into a [`ServerConfig`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::validation::MAX_WS_MESSAGE_SIZE;

/// Default port for the whiteboard server.
pub const DEFAULT_PORT: u16 = 8079;
/// Default burst capacity for rate limiting (messages).
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;
/// Default sustained rate for rate limiting (messages per second).
pub const DEFAULT_RATE_LIMIT_SUSTAINED: u32 = 20;
/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Command-line arguments for whiteboard-server.
#[derive(Debug, Clone, Parser)]
#[command(name = "whiteboard-server")]
#[command(about = "Collaborative whiteboard relay server")]
#[command(version)]
pub struct CliArgs {
    /// Address to bind
    #[arg(long, env = "WHITEBOARD_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "WHITEBOARD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Keep at most this many active commands per session (oldest evicted)
    #[arg(long, env = "WHITEBOARD_MAX_LOG_LEN")]
    pub max_log_len: Option<usize>,

    /// Keep empty sessions this long before disposing them (0 = immediately)
    #[arg(long, env = "WHITEBOARD_SESSION_RETENTION_SECS", default_value_t = 0)]
    pub session_retention_secs: u64,

    /// Ping interval; connections silent for two intervals are closed (0 = off)
    #[arg(long, env = "WHITEBOARD_HEARTBEAT_SECS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub heartbeat_secs: u64,

    /// Largest accepted inbound message in bytes
    #[arg(long, env = "WHITEBOARD_MAX_MESSAGE_BYTES", default_value_t = MAX_WS_MESSAGE_SIZE)]
    pub max_message_bytes: usize,

    /// Per-connection burst capacity (messages)
    #[arg(long, env = "WS_RATE_LIMIT_BURST", default_value_t = DEFAULT_RATE_LIMIT_BURST)]
    pub rate_limit_burst: u32,

    /// Per-connection sustained rate (messages per second)
    #[arg(long, env = "WS_RATE_LIMIT_SUSTAINED", default_value_t = DEFAULT_RATE_LIMIT_SUSTAINED)]
    pub rate_limit_sustained: u32,

    /// Accept requests from any origin instead of localhost only
    #[arg(long, env = "WHITEBOARD_CORS_ANY")]
    pub cors_any: bool,
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Log length bound; `None` is unbounded.
    pub max_log_len: Option<usize>,
    /// How long an empty session survives. Zero disposes immediately.
    pub retention: Duration,
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Ping interval; `None` disables heartbeats.
    pub heartbeat: Option<Duration>,
    /// Largest accepted inbound message in bytes.
    pub max_message_bytes: usize,
    /// Token bucket capacity.
    pub rate_limit_burst: u32,
    /// Token bucket refill per second.
    pub rate_limit_sustained: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat: Some(Duration::from_secs(DEFAULT_HEARTBEAT_SECS)),
            max_message_bytes: MAX_WS_MESSAGE_SIZE,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_sustained: DEFAULT_RATE_LIMIT_SUSTAINED,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Session lifecycle settings.
    pub session: SessionConfig,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
    /// Allow any CORS origin.
    pub cors_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            session: SessionConfig::default(),
            connection: ConnectionConfig::default(),
            cors_any: false,
        }
    }
}

impl From<CliArgs> for ServerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            addr: SocketAddr::new(args.host, args.port),
            session: SessionConfig {
                max_log_len: args.max_log_len,
                retention: Duration::from_secs(args.session_retention_secs),
            },
            connection: ConnectionConfig {
                heartbeat: (args.heartbeat_secs > 0)
                    .then(|| Duration::from_secs(args.heartbeat_secs)),
                max_message_bytes: args.max_message_bytes,
                rate_limit_burst: args.rate_limit_burst,
                rate_limit_sustained: args.rate_limit_sustained,
            },
            cors_any: args.cors_any,
        }
    }
}
