//! Per-room live connection.
//!
//! A connection runs two workers over one socket:
//! - the heartbeat worker, which writes a heartbeat frame every interval
//! - the read loop, which decodes frames and forwards chat records
//!
//! Writes go through the session mutex. Either worker that hits a socket
//! failure reconnects while holding that mutex, so heartbeat and handshake
//! writes never interleave. A reconnect replaces the whole socket; the read
//! loop picks up the new read half through the generation channel.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::transport::{Connector, FrameReader, FrameWriter, Transport};
use super::{ConnectionConfig, ConnectionState};
use crate::codec::{self, DecodedEvent};
use crate::error::{LiveError, Result};

/// A chat message observed in a live room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveChat {
    pub account_id: u64,
    pub room_id: u64,
    pub speaker: String,
    pub text: String,
}

/// Write side of the current socket.
struct Session {
    writer: Box<dyn FrameWriter>,
    generation: u64,
    /// Read half of a socket opened by a reconnect, waiting for the read loop.
    fresh_reader: Option<Box<dyn FrameReader>>,
}

struct Shared<E> {
    account_id: u64,
    room_id: u64,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    session: Mutex<Session>,
    generation: watch::Sender<u64>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    events: mpsc::Sender<E>,
}

/// Why the read loop left its current socket.
enum ReadOutcome {
    Frame(Bytes),
    Failed(String),
    Superseded,
}

/// Open a socket and join the room.
async fn handshake(
    connector: &dyn Connector,
    room_id: u64,
    config: &ConnectionConfig,
) -> Result<Transport> {
    let mut transport = timeout(config.connect_timeout, connector.connect())
        .await
        .map_err(|_| LiveError::socket("connect timed out"))??;
    timeout(
        config.write_timeout,
        transport.writer.send(codec::join_room_frame(room_id)),
    )
    .await
    .map_err(|_| LiveError::socket("join request timed out"))??;
    Ok(transport)
}

/// Handle to a running connection.
pub struct LiveConnection {
    account_id: u64,
    room_id: u64,
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveConnection {
    /// Establish the connection and start its workers.
    ///
    /// The initial handshake is retried up to `config.max_attempts` times
    /// before giving up with [`LiveError::InitializationFailed`].
    pub async fn start<E>(
        account_id: u64,
        room_id: u64,
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
        events: mpsc::Sender<E>,
    ) -> Result<Self>
    where
        E: From<LiveChat> + Send + 'static,
    {
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        info!(account_id, room_id, "Starting live connection");
        state_tx.send_replace(ConnectionState::Handshaking);

        let mut last_error = String::new();
        let mut transport = None;
        for attempt in 1..=config.max_attempts {
            match handshake(connector.as_ref(), room_id, &config).await {
                Ok(t) => {
                    transport = Some(t);
                    break;
                }
                Err(e) => {
                    error!(
                        account_id,
                        room_id,
                        attempt,
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Failed to initialize live connection, retrying"
                    );
                    last_error = e.to_string();
                }
            }
        }

        let Some(Transport { writer, reader }) = transport else {
            state_tx.send_replace(ConnectionState::Stopped);
            return Err(LiveError::InitializationFailed {
                attempts: config.max_attempts,
                last_error,
            });
        };

        let cancel = CancellationToken::new();
        let (generation, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            account_id,
            room_id,
            connector,
            config,
            session: Mutex::new(Session {
                writer,
                generation: 0,
                fresh_reader: None,
            }),
            generation,
            state: state_tx.clone(),
            cancel: cancel.clone(),
            events,
        });

        state_tx.send_replace(ConnectionState::Streaming);
        let heartbeat = tokio::spawn(shared.clone().heartbeat_loop());
        let read_loop = tokio::spawn(shared.read_loop(reader));
        info!(account_id, room_id, "Live connection started");

        Ok(Self {
            account_id,
            room_id,
            cancel,
            state,
            state_tx,
            workers: Mutex::new(vec![heartbeat, read_loop]),
        })
    }

    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the connection has terminated, either stopped or given up.
    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection stops, including when it gives up
    /// reconnecting on its own.
    pub async fn terminated(&self) {
        self.cancel.cancelled().await
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop both workers and wait for them to exit.
    ///
    /// Idempotent. No event from this connection is emitted after it returns.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(e) = worker.await
                && e.is_panic()
            {
                error!(account_id = self.account_id, "Live connection worker panicked");
            }
        }
        self.state_tx.send_replace(ConnectionState::Stopped);
        debug!(account_id = self.account_id, room_id = self.room_id, "Live connection stopped");
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<E> Shared<E>
where
    E: From<LiveChat> + Send + 'static,
{
    /// Replace the socket. Must be called with the session lock held.
    ///
    /// Returns `false` when attempts are exhausted or the connection was
    /// cancelled; in the former case the connection terminates itself.
    async fn reconnect(&self, session: &mut Session) -> bool {
        self.state.send_replace(ConnectionState::Reconnecting);
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return false;
            }
            warn!(
                room_id = self.room_id,
                attempt, max_attempts, "Trying to reconnect live room"
            );

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                result = handshake(self.connector.as_ref(), self.room_id, &self.config) => result,
            };

            match result {
                Ok(Transport { writer, reader }) => {
                    session.writer = writer;
                    session.fresh_reader = Some(reader);
                    session.generation += 1;
                    self.generation.send_replace(session.generation);
                    self.state.send_replace(ConnectionState::Streaming);
                    info!(room_id = self.room_id, attempt, "Reconnected to live room");
                    return true;
                }
                Err(e) => {
                    error!(room_id = self.room_id, attempt, error = %e, "Reconnect failed");
                }
            }
        }

        error!(
            account_id = self.account_id,
            room_id = self.room_id,
            "Unable to reconnect, stopping live connection"
        );
        self.state.send_replace(ConnectionState::Stopped);
        self.cancel.cancel();
        false
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(room_id = self.room_id, "Heartbeat worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut session = self.session.lock().await;
            if self.cancel.is_cancelled() {
                break;
            }
            let sent = timeout(
                self.config.write_timeout,
                session.writer.send(codec::heartbeat_frame()),
            )
            .await;

            match sent {
                Ok(Ok(())) => trace!(room_id = self.room_id, "Sent heartbeat"),
                Ok(Err(e)) => {
                    error!(room_id = self.room_id, error = %e, "Failed to send heartbeat");
                    if !self.reconnect(&mut session).await {
                        break;
                    }
                    ticker.reset_immediately();
                }
                Err(_) => {
                    error!(room_id = self.room_id, "Heartbeat send timed out");
                    if !self.reconnect(&mut session).await {
                        break;
                    }
                    ticker.reset_immediately();
                }
            }
        }

        debug!(room_id = self.room_id, "Heartbeat worker stopped");
    }

    async fn read_loop(self: Arc<Self>, mut reader: Box<dyn FrameReader>) {
        let mut generation = 0;
        let mut generation_rx = self.generation.subscribe();
        debug!(room_id = self.room_id, "Read loop started");

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = generation_rx.changed() => match changed {
                    Ok(()) => ReadOutcome::Superseded,
                    Err(_) => break,
                },
                read = timeout(self.config.read_timeout, reader.next_frame()) => match read {
                    Ok(Ok(Some(frame))) => ReadOutcome::Frame(frame),
                    Ok(Ok(None)) => ReadOutcome::Failed("socket closed".to_string()),
                    Ok(Err(e)) => ReadOutcome::Failed(e.to_string()),
                    Err(_) => ReadOutcome::Failed("read timed out".to_string()),
                },
            };

            match outcome {
                ReadOutcome::Frame(frame) => {
                    if !self.handle_frame(&frame).await {
                        break;
                    }
                }
                ReadOutcome::Failed(reason) => {
                    error!(room_id = self.room_id, reason = %reason, "Failed to read message");
                    let mut session = self.session.lock().await;
                    if session.generation == generation && !self.reconnect(&mut session).await {
                        break;
                    }
                    if let Some(fresh) = session.fresh_reader.take() {
                        reader = fresh;
                        generation = session.generation;
                    }
                    generation_rx.borrow_and_update();
                }
                ReadOutcome::Superseded => {
                    let mut session = self.session.lock().await;
                    if let Some(fresh) = session.fresh_reader.take() {
                        reader = fresh;
                        generation = session.generation;
                    }
                    generation_rx.borrow_and_update();
                }
            }
        }

        debug!(room_id = self.room_id, "Read loop stopped");
    }

    /// Decode one frame and forward its chat records.
    ///
    /// Returns `false` when the loop should exit.
    async fn handle_frame(&self, frame: &[u8]) -> bool {
        let event = match codec::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(room_id = self.room_id, error = %e, "Failed to decode message");
                return true;
            }
        };

        match event {
            DecodedEvent::RoomJoinAck => info!(room_id = self.room_id, "Joined live room"),
            DecodedEvent::ViewerCount(count) => {
                debug!(room_id = self.room_id, count, "Viewer count updated")
            }
            DecodedEvent::ChatNotification(batch) => {
                for failure in &batch.failures {
                    warn!(room_id = self.room_id, error = %failure, "Skipping notification record");
                }
                for record in batch.records {
                    info!(
                        room_id = self.room_id,
                        speaker = %record.speaker,
                        text = %record.text,
                        "Danmu received"
                    );
                    let chat = LiveChat {
                        account_id: self.account_id,
                        room_id: self.room_id,
                        speaker: record.speaker,
                        text: record.text,
                    };
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return false,
                        sent = self.events.send(E::from(chat)) => {
                            if sent.is_err() {
                                debug!(room_id = self.room_id, "Event pipeline closed");
                                return false;
                            }
                        }
                    }
                }
            }
            DecodedEvent::Other(operation) => {
                debug!(room_id = self.room_id, ?operation, "Unhandled operation")
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::codec::{LiveFramePacket, Operation, ProtocolVersion, encode};

    type Feed = mpsc::UnboundedSender<Result<Bytes>>;

    struct FakeWriter {
        sent: Arc<StdMutex<Vec<Bytes>>>,
        broken: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameWriter for FakeWriter {
        async fn send(&mut self, frame: Bytes) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(LiveError::socket("broken pipe"));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
    }

    struct FakeReader(mpsc::UnboundedReceiver<Result<Bytes>>);

    #[async_trait]
    impl FrameReader for FakeReader {
        async fn next_frame(&mut self) -> Result<Option<Bytes>> {
            match self.0.recv().await {
                Some(Ok(frame)) => Ok(Some(frame)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    /// Connector whose attempts succeed according to `accept(attempt)`.
    struct FakeConnector {
        attempts: AtomicU32,
        accept: Box<dyn Fn(u32) -> bool + Send + Sync>,
        sent: Arc<StdMutex<Vec<Bytes>>>,
        sockets: StdMutex<Vec<(Feed, Arc<AtomicBool>)>>,
    }

    impl FakeConnector {
        fn new(accept: impl Fn(u32) -> bool + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                attempts: AtomicU32::new(0),
                accept: Box::new(accept),
                sent: Arc::new(StdMutex::new(Vec::new())),
                sockets: StdMutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        fn socket(&self, index: usize) -> (Feed, Arc<AtomicBool>) {
            self.sockets.lock().unwrap()[index].clone()
        }

        fn socket_count(&self) -> usize {
            self.sockets.lock().unwrap().len()
        }

        fn latest(&self) -> Feed {
            self.sockets.lock().unwrap().last().unwrap().0.clone()
        }

        fn sent_operations(&self) -> Vec<Operation> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|frame| LiveFramePacket::parse(frame).unwrap().operation)
                .collect()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Transport> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if !(self.accept)(attempt) {
                return Err(LiveError::socket("connection refused"));
            }
            let (feed, rx) = mpsc::unbounded_channel();
            let broken = Arc::new(AtomicBool::new(false));
            self.sockets.lock().unwrap().push((feed, broken.clone()));
            Ok(Transport {
                writer: Box::new(FakeWriter {
                    sent: self.sent.clone(),
                    broken,
                }),
                reader: Box::new(FakeReader(rx)),
            })
        }
    }

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(1),
            max_attempts: 10,
        }
    }

    fn chat_frame(speaker: &str, text: &str) -> Bytes {
        let json = serde_json::json!({
            "cmd": "DANMU_MSG",
            "info": [[], text, [1, speaker]]
        });
        encode(
            &serde_json::to_vec(&json).unwrap(),
            Operation::Notification,
            ProtocolVersion::PlainJson,
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_start_joins_room_then_sends_heartbeat() {
        let connector = FakeConnector::new(|_| true);
        let (tx, _rx) = mpsc::channel::<LiveChat>(16);

        let conn = LiveConnection::start(1, 100, connector.clone(), test_config(), tx)
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::Streaming);

        wait_until(|| connector.sent_operations().len() >= 2).await;
        assert_eq!(
            connector.sent_operations()[..2],
            [Operation::JoinRoom, Operation::Heartbeat]
        );

        conn.stop().await;
        assert_eq!(conn.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_forwards_only_chat_records() {
        let connector = FakeConnector::new(|_| true);
        let (tx, mut rx) = mpsc::channel::<LiveChat>(16);
        let conn = LiveConnection::start(7, 700, connector.clone(), test_config(), tx)
            .await
            .unwrap();

        let feed = connector.latest();
        feed.send(Ok(encode(b"{}", Operation::JoinRoomReply, ProtocolVersion::PlainJson)))
            .unwrap();
        feed.send(Ok(encode(
            &42u32.to_be_bytes(),
            Operation::HeartbeatReply,
            ProtocolVersion::RawUint32,
        )))
        .unwrap();
        feed.send(Ok(Bytes::from_static(b"short"))).unwrap();
        feed.send(Ok(chat_frame("alice", "hello"))).unwrap();

        let chat = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            chat,
            LiveChat {
                account_id: 7,
                room_id: 700,
                speaker: "alice".to_string(),
                text: "hello".to_string(),
            }
        );

        conn.stop().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty | TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_initialization_gives_up_after_max_attempts() {
        let connector = FakeConnector::new(|_| false);
        let (tx, _rx) = mpsc::channel::<LiveChat>(16);

        let result = LiveConnection::start(1, 100, connector.clone(), test_config(), tx).await;

        assert!(matches!(
            result,
            Err(LiveError::InitializationFailed { attempts: 10, .. })
        ));
        assert_eq!(connector.attempts(), 10);
    }

    /// Connector whose connects never complete, like a blackholed host.
    #[derive(Default)]
    struct HangingConnector {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self) -> Result<Transport> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_connect_times_out_each_attempt() {
        let connector = Arc::new(HangingConnector::default());
        let (tx, _rx) = mpsc::channel::<LiveChat>(16);

        let result = tokio::time::timeout(
            Duration::from_secs(60),
            LiveConnection::start(1, 100, connector.clone(), test_config(), tx),
        )
        .await
        .expect("start should give up on its own");

        assert!(matches!(
            result,
            Err(LiveError::InitializationFailed { attempts: 10, .. })
        ));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_ten_attempts() {
        // Only the initial connection succeeds.
        let connector = FakeConnector::new(|attempt| attempt == 1);
        let (tx, _rx) = mpsc::channel::<LiveChat>(16);
        let conn = LiveConnection::start(1, 100, connector.clone(), test_config(), tx)
            .await
            .unwrap();

        // Closing the feed makes the read loop see a closed socket.
        let (feed, _) = connector.socket(0);
        drop(feed);
        connector.sockets.lock().unwrap().clear();

        tokio::time::timeout(Duration::from_secs(5), conn.terminated())
            .await
            .expect("connection should terminate");
        assert_eq!(conn.state(), ConnectionState::Stopped);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.attempts(), 1 + 10);

        conn.stop().await;
        assert_eq!(connector.attempts(), 1 + 10);
    }

    #[tokio::test]
    async fn test_heartbeat_failure_swaps_reader() {
        let connector = FakeConnector::new(|_| true);
        let (tx, mut rx) = mpsc::channel::<LiveChat>(16);
        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_millis(20),
            ..test_config()
        };
        let conn = LiveConnection::start(3, 300, connector.clone(), config, tx)
            .await
            .unwrap();

        let (_, broken) = connector.socket(0);
        broken.store(true, Ordering::SeqCst);

        wait_until(|| connector.socket_count() >= 2).await;
        let (feed, _) = connector.socket(1);
        feed.send(Ok(chat_frame("bob", "after reconnect"))).unwrap();

        let chat = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.text, "after reconnect");
        assert_eq!(conn.state(), ConnectionState::Streaming);

        conn.stop().await;
    }

    #[tokio::test]
    async fn test_no_events_after_stop_under_socket_errors() {
        let connector = FakeConnector::new(|_| true);
        let (tx, mut rx) = mpsc::channel::<LiveChat>(1024);
        let conn = LiveConnection::start(9, 900, connector.clone(), test_config(), tx)
            .await
            .unwrap();

        let producer_connector = connector.clone();
        let producer = tokio::spawn(async move {
            for i in 0u32.. {
                let feed = producer_connector.latest();
                let item = if i % 7 == 0 {
                    Err(LiveError::socket("reset by peer"))
                } else {
                    Ok(chat_frame("spammer", "msg"))
                };
                if feed.send(item).is_err() {
                    tokio::task::yield_now().await;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        wait_until(|| connector.socket_count() >= 3).await;
        conn.stop().await;

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            rx.try_recv(),
            Err(TryRecvError::Empty | TryRecvError::Disconnected)
        ));

        producer.abort();
        // Stopping twice is a no-op.
        conn.stop().await;
        assert_eq!(conn.state(), ConnectionState::Stopped);
    }
}
