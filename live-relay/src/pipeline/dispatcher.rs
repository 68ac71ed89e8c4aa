//! Pipeline consumer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineEvent;
use crate::accounts::{AccountStore, TrackedAccount};
use crate::notification::{MessageSink, messages};
use crate::registry::ConnectionRegistry;
use crate::subscription::SubscriptionIndex;

/// Drains pipeline events in arrival order and performs their side effects.
pub struct Dispatcher {
    index: Arc<SubscriptionIndex>,
    store: Arc<AccountStore>,
    registry: Arc<ConnectionRegistry>,
    sink: Arc<dyn MessageSink>,
    keywords: Vec<String>,
}

impl Dispatcher {
    pub fn new(
        index: Arc<SubscriptionIndex>,
        store: Arc<AccountStore>,
        registry: Arc<ConnectionRegistry>,
        sink: Arc<dyn MessageSink>,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            index,
            store,
            registry,
            sink,
            keywords,
        }
    }

    /// Consume events until `cancel` fires or every producer is gone.
    pub async fn run(self, mut events: mpsc::Receiver<PipelineEvent>, cancel: CancellationToken) {
        info!(sink = self.sink.name(), "Event dispatcher started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }

        info!("Event dispatcher stopped");
    }

    pub async fn handle(&self, event: PipelineEvent) {
        debug!(
            event_type = event.event_type(),
            account_id = event.account_id(),
            "Dispatching event"
        );

        match event {
            PipelineEvent::LiveStarted(account) => {
                self.broadcast(account.id, &messages::live_started(&account))
                    .await;

                if account.room_id == 0 {
                    error!(account_id = account.id, "Account is live without a room id");
                    return;
                }
                if let Err(e) = self.registry.open(account.id, account.room_id).await {
                    error!(
                        account_id = account.id,
                        room_id = account.room_id,
                        error = %e,
                        "Failed to start live connection"
                    );
                }
            }
            PipelineEvent::LiveStopped(account) => {
                self.broadcast(account.id, &messages::live_stopped(&account))
                    .await;
                self.registry.close(account.id).await;
            }
            PipelineEvent::ChatMessage {
                account_id,
                speaker,
                text,
            } => {
                if !messages::matches_keywords(&text, &self.keywords) {
                    return;
                }
                let account = self
                    .store
                    .get(account_id)
                    .unwrap_or_else(|| TrackedAccount::new(account_id));
                self.broadcast(account_id, &messages::danmu_relay(&account, &speaker, &text))
                    .await;
            }
        }
    }

    /// Send `text` to every group following `account_id`.
    async fn broadcast(&self, account_id: u64, text: &str) {
        let Some(groups) = self.index.groups_of(account_id) else {
            error!(account_id, "Account is not in the subscription index");
            return;
        };

        for &group_id in groups {
            if let Err(e) = self.sink.send(group_id, text).await {
                warn!(account_id, group_id, error = %e, "Failed to deliver notification");
            }
        }
    }
}
