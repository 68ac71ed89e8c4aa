//! Socket seam used by [`LiveConnection`](super::LiveConnection).
//!
//! A [`Connector`] opens a fresh socket and hands back its two halves. The
//! write half is shared between the heartbeat and handshake paths; the read
//! half is owned by the read loop.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::{LiveError, Result};

/// Default live message endpoint.
pub const DEFAULT_WS_URL: &str = "wss://broadcastlv.chat.bilibili.com:2245/sub";

/// Write half of a socket.
#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, frame: Bytes) -> Result<()>;
}

/// Read half of a socket.
#[async_trait]
pub trait FrameReader: Send {
    /// Next binary frame. `Ok(None)` means the peer closed the socket.
    async fn next_frame(&mut self) -> Result<Option<Bytes>>;
}

/// Both halves of a freshly opened socket.
pub struct Transport {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

/// Opens sockets to the live message service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Transport>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsWriter(SplitSink<WsStream, Message>);

struct WsReader(SplitStream<WsStream>);

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.0
            .send(Message::Binary(frame))
            .await
            .map_err(|e| LiveError::socket(format!("send failed: {e}")))
    }
}

#[async_trait]
impl FrameReader for WsReader {
    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return Ok(None);
                }
                // Ping/pong are answered by tungstenite; text frames are not used.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(LiveError::socket(format!("read failed: {e}"))),
                None => return Ok(None),
            }
        }
    }
}

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Transport> {
        info!("Connecting to WebSocket: {}", self.url);
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LiveError::socket(format!("connect failed: {e}")))?;

        let (sink, stream) = stream.split();
        Ok(Transport {
            writer: Box::new(WsWriter(sink)),
            reader: Box::new(WsReader(stream)),
        })
    }
}
