//! The relay subsystem.
//!
//! Wires the poller, the pipeline dispatcher and the connection registry
//! together and owns their lifetimes.

use std::sync::Arc;
use std::time::Duration;

use bili_live::{BiliApiClient, Connector, StatusSource, WebSocketConnector};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::accounts::{AccountStore, TrackedAccount};
use crate::config::RelayConfig;
use crate::monitor::StatusPoller;
use crate::notification::{self, MessageSink};
use crate::pipeline::{self, DEFAULT_PIPELINE_CAPACITY, Dispatcher};
use crate::registry::ConnectionRegistry;
use crate::subscription::SubscriptionIndex;
use crate::utils::http_client::build_client;

/// Running relay. Dropping it without [`LiveRelay::shutdown`] only cancels
/// the workers.
pub struct LiveRelay {
    index: Arc<SubscriptionIndex>,
    store: Arc<AccountStore>,
    registry: Arc<ConnectionRegistry>,
    poller_cancel: CancellationToken,
    dispatcher_cancel: CancellationToken,
    poller: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

/// Collaborators a relay is built from.
pub struct RelayParts {
    pub status_source: Arc<dyn StatusSource>,
    pub connector: Arc<dyn Connector>,
    pub sink: Arc<dyn MessageSink>,
}

impl RelayParts {
    /// Production collaborators described by `config`.
    pub fn from_config(config: &RelayConfig) -> Self {
        let timeout = Duration::from_secs(config.api.request_timeout_secs);
        let status_source = BiliApiClient::with_client(
            build_client(timeout),
            config.api.user_info_url.clone(),
            timeout,
        );
        Self {
            status_source: Arc::new(status_source),
            connector: Arc::new(WebSocketConnector::new(config.connection.url.clone())),
            sink: notification::build_sink(&config.sink),
        }
    }
}

impl LiveRelay {
    /// Build the subsystem and start the poller and dispatcher.
    pub fn start(config: &RelayConfig, parts: RelayParts) -> Self {
        let index = Arc::new(SubscriptionIndex::new(&config.subscriptions));
        let store = Arc::new(AccountStore::from_index(&index));
        let (events_tx, events_rx) = pipeline::channel(DEFAULT_PIPELINE_CAPACITY);

        let registry = Arc::new(ConnectionRegistry::new(
            parts.connector,
            config.connection.to_connection_config(),
            events_tx.clone(),
        ));

        let dispatcher = Dispatcher::new(
            index.clone(),
            store.clone(),
            registry.clone(),
            parts.sink,
            config.danmu_forward_keywords.clone(),
        );
        let poller = StatusPoller::new(
            parts.status_source,
            store.clone(),
            events_tx,
            config.polling_interval(),
        );

        let poller_cancel = CancellationToken::new();
        let dispatcher_cancel = CancellationToken::new();
        let dispatcher = tokio::spawn(dispatcher.run(events_rx, dispatcher_cancel.clone()));
        let poller = tokio::spawn(poller.run(poller_cancel.clone()));

        info!(
            accounts = index.accounts().len(),
            groups = index.groups().len(),
            "Live relay started"
        );

        Self {
            index,
            store,
            registry,
            poller_cancel,
            dispatcher_cancel,
            poller: Some(poller),
            dispatcher: Some(dispatcher),
        }
    }

    pub fn index(&self) -> &SubscriptionIndex {
        &self.index
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Snapshot of one tracked account.
    pub fn account(&self, account_id: u64) -> Option<TrackedAccount> {
        self.store.get(account_id)
    }

    /// Accounts followed by `group_id` with their latest snapshots.
    pub fn subscriptions_for_group(&self, group_id: i64) -> Vec<TrackedAccount> {
        self.store.subscriptions_for_group(&self.index, group_id)
    }

    /// Stop the poller, then the dispatcher, then every live connection.
    pub async fn shutdown(mut self) {
        info!("Shutting down live relay");

        self.poller_cancel.cancel();
        if let Some(poller) = self.poller.take()
            && let Err(e) = poller.await
        {
            error!(error = %e, "Status poller task failed");
        }

        self.dispatcher_cancel.cancel();
        if let Some(dispatcher) = self.dispatcher.take()
            && let Err(e) = dispatcher.await
        {
            error!(error = %e, "Dispatcher task failed");
        }

        self.registry.shutdown().await;
        info!("Live relay stopped");
    }
}

impl Drop for LiveRelay {
    fn drop(&mut self) {
        self.poller_cancel.cancel();
        self.dispatcher_cancel.cancel();
    }
}
