//! Connection registry: at most one live connection per account.
//!
//! All opens and closes go through one async lock. The account snapshot lock
//! is never taken while it is held.

use std::collections::HashMap;
use std::sync::Arc;

use bili_live::{ConnectionConfig, ConnectionState, Connector, LiveConnection};
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::pipeline::PipelineEvent;

type ConnectionMap = Arc<Mutex<HashMap<u64, Arc<LiveConnection>>>>;

pub struct ConnectionRegistry {
    connections: ConnectionMap,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    events: mpsc::Sender<PipelineEvent>,
    /// Detached stop and reaper tasks.
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            connector,
            config,
            events,
            background: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Open a connection for `account_id`, replacing any existing one.
    ///
    /// A stale connection is fully stopped before the new one starts.
    pub async fn open(&self, account_id: u64, room_id: u64) -> Result<()> {
        let mut connections = self.connections.lock().await;

        if let Some(stale) = connections.remove(&account_id) {
            warn!(
                account_id,
                room_id = stale.room_id(),
                state = %stale.state(),
                "Stopping stale live connection"
            );
            stale.stop().await;
        }

        let conn = LiveConnection::start(
            account_id,
            room_id,
            self.connector.clone(),
            self.config.clone(),
            self.events.clone(),
        )
        .await?;
        let conn = Arc::new(conn);
        connections.insert(account_id, conn.clone());
        drop(connections);

        self.track(tokio::spawn(reap_on_termination(
            self.connections.clone(),
            account_id,
            conn,
        )));
        info!(account_id, room_id, "Live connection registered");
        Ok(())
    }

    /// Detach the connection for `account_id` and stop it in the background.
    ///
    /// Returns once the connection is out of the registry; use
    /// [`Self::shutdown`] to wait for background stops.
    pub async fn close(&self, account_id: u64) -> bool {
        let Some(conn) = self.connections.lock().await.remove(&account_id) else {
            debug!(account_id, "No live connection to close");
            return false;
        };

        self.track(tokio::spawn(async move {
            conn.stop().await;
            info!(account_id, "Live connection closed");
        }));
        true
    }

    pub async fn contains(&self, account_id: u64) -> bool {
        self.connections.lock().await.contains_key(&account_id)
    }

    pub async fn state(&self, account_id: u64) -> Option<ConnectionState> {
        self.connections
            .lock()
            .await
            .get(&account_id)
            .map(|conn| conn.state())
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every connection and wait for all background stops.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.lock().await.drain().collect();
        info!(count = connections.len(), "Stopping live connections");

        join_all(connections.iter().map(|(_, conn)| conn.stop())).await;

        let background: Vec<_> = self.background.lock().drain(..).collect();
        for result in join_all(background).await {
            if let Err(e) = result
                && e.is_panic()
            {
                error!("Connection background task panicked");
            }
        }
    }
}

/// Drop a connection from the registry once it gives up on its own.
async fn reap_on_termination(connections: ConnectionMap, account_id: u64, conn: Arc<LiveConnection>) {
    conn.terminated().await;

    let mut map = connections.lock().await;
    if map
        .get(&account_id)
        .is_some_and(|current| Arc::ptr_eq(current, &conn))
    {
        map.remove(&account_id);
        drop(map);
        warn!(account_id, "Live connection terminated, removed from registry");
        conn.stop().await;
    }
}
