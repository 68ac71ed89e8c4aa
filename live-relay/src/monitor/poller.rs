//! Periodic status poller.
//!
//! Every tick queries each tracked account in turn, refreshes its snapshot
//! and emits a pipeline event when the live flag flips.

use std::sync::Arc;
use std::time::Duration;

use bili_live::StatusSource;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::accounts::{AccountStore, LiveStatus, TrackedAccount};
use crate::pipeline::PipelineEvent;

/// Map a status change to the event it produces, if any.
pub fn detect_transition(
    previous: LiveStatus,
    account: &TrackedAccount,
) -> Option<PipelineEvent> {
    match (previous, account.status) {
        (LiveStatus::Unknown | LiveStatus::Offline, LiveStatus::Live) => {
            Some(PipelineEvent::LiveStarted(account.clone()))
        }
        (LiveStatus::Live, LiveStatus::Offline) => {
            Some(PipelineEvent::LiveStopped(account.clone()))
        }
        _ => None,
    }
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    store: Arc<AccountStore>,
    events: mpsc::Sender<PipelineEvent>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        store: Arc<AccountStore>,
        events: mpsc::Sender<PipelineEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            events,
            interval,
        }
    }

    /// Poll every account once and return the transitions found.
    ///
    /// A failed query keeps the cached snapshot untouched.
    pub async fn poll_once(&self) -> Vec<PipelineEvent> {
        let mut transitions = Vec::new();

        for account_id in self.store.ids() {
            let profile = match self.source.fetch_profile(account_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    error!(account_id, error = %e, "Failed to query live status");
                    continue;
                }
            };

            let (previous, account) = self.store.update(account_id, profile);
            debug!(
                account_id,
                name = %account.name,
                status = %account.status,
                "Polled live status"
            );

            if let Some(event) = detect_transition(previous, &account) {
                info!(
                    account_id,
                    name = %account.name,
                    from = %previous,
                    to = %account.status,
                    "Live status changed"
                );
                transitions.push(event);
            }
        }

        transitions
    }

    /// Poll on every tick until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Status poller started");

        'outer: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let transitions = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                transitions = self.poll_once() => transitions,
            };

            for event in transitions {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    sent = self.events.send(event) => {
                        if sent.is_err() {
                            debug!("Event pipeline closed, stopping poller");
                            break 'outer;
                        }
                    }
                }
            }
        }

        info!("Status poller stopped");
    }
}
