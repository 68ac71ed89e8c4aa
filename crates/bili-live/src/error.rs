//! Error types for the live-room protocol and connection layer.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors produced while decoding a single frame or notification record.
///
/// None of these are fatal to a connection: the offending frame or record is
/// logged and skipped.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Buffer shorter than the fixed header.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame body does not match what the operation requires.
    #[error("Malformed body: {0}")]
    MalformedBody(String),

    /// Notification body carried a protocol version we cannot interpret.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(u16),

    /// A `DANMU_MSG` record without the speaker/content layout.
    #[error("Malformed chat record: {0}")]
    MalformedChatRecord(String),

    /// A notification fragment that is not valid JSON.
    #[error("Invalid notification JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// zlib inflate failure.
    #[error("Decompression failed: {0}")]
    Decompress(#[from] std::io::Error),
}

impl CodecError {
    pub fn malformed_frame(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    pub fn malformed_body(msg: impl Into<String>) -> Self {
        Self::MalformedBody(msg.into())
    }

    pub fn malformed_chat(msg: impl Into<String>) -> Self {
        Self::MalformedChatRecord(msg.into())
    }
}

/// Errors surfaced by the status client and live connections.
#[derive(Error, Debug)]
pub enum LiveError {
    /// Socket-level failure (connect, send, read, deadline).
    #[error("Socket error: {0}")]
    Socket(String),

    /// Status query for one account failed in the current poll cycle.
    #[error("Status query failed for account {account_id}: {reason}")]
    StatusQueryFailed { account_id: u64, reason: String },

    /// Initial connection could not be established within the attempt bound.
    #[error("Initialization failed after {attempts} attempts: {last_error}")]
    InitializationFailed { attempts: u32, last_error: String },

    /// HTTP transport errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Codec errors bubbled up from frame handling.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The connection was stopped.
    #[error("Connection closed")]
    Closed,
}

impl LiveError {
    /// Create a socket error.
    pub fn socket(msg: impl Into<String>) -> Self {
        Self::Socket(msg.into())
    }

    /// Create a status query error.
    pub fn status_query(account_id: u64, reason: impl Into<String>) -> Self {
        Self::StatusQueryFailed {
            account_id,
            reason: reason.into(),
        }
    }
}
