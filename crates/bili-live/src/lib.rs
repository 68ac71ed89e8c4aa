//! Bilibili live-room client.
//!
//! ## Modules
//!
//! - [`codec`] - binary frame layout and notification decoding
//! - [`api`] - account status lookups over HTTP
//! - [`connection`] - reconnecting per-room message connection
//! - [`error`] - error types

pub mod api;
pub mod codec;
pub mod connection;
pub mod error;

pub use api::{AccountProfile, BiliApiClient, LiveRoom, StatusSource};
pub use connection::{
    ConnectionConfig, ConnectionState, Connector, LiveChat, LiveConnection, WebSocketConnector,
};
pub use error::{CodecError, LiveError, Result};
