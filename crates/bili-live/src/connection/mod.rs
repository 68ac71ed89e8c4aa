//! Reconnecting live-room connection.

mod live;
mod transport;

pub use live::{LiveChat, LiveConnection};
pub use transport::{
    Connector, DEFAULT_WS_URL, FrameReader, FrameWriter, Transport, WebSocketConnector,
};

use std::time::Duration;

/// Interval between heartbeat frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on opening a socket, TLS and WebSocket upgrade included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Upper bound on a single read. Must exceed the heartbeat interval, since
/// the heartbeat reply is the only traffic an idle room produces.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(40);

/// Upper bound on a single write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection attempts allowed for the initial handshake and for each
/// reconnect episode.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Timing and retry settings for a [`LiveConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Lifecycle of a [`LiveConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Streaming,
    Reconnecting,
    Stopped,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Handshaking => "handshaking",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
