//! Tracked account snapshots.

use std::collections::HashMap;

use bili_live::AccountProfile;
use parking_lot::Mutex;

use crate::subscription::SubscriptionIndex;

/// Last observed live status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LiveStatus {
    /// Not polled successfully yet.
    #[default]
    Unknown,
    Offline,
    Live,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One followed streamer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedAccount {
    pub id: u64,
    /// Empty until the first successful poll.
    pub name: String,
    pub room_id: u64,
    pub status: LiveStatus,
    pub profile: Option<AccountProfile>,
}

impl TrackedAccount {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Replace the snapshot with a fresh profile.
    pub fn apply(&mut self, profile: AccountProfile) {
        self.name = profile.name.clone();
        self.room_id = profile.room_id();
        self.status = if profile.is_live() {
            LiveStatus::Live
        } else {
            LiveStatus::Offline
        };
        self.profile = Some(profile);
    }

    /// Live room title, empty when unknown.
    pub fn room_title(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.live_room.as_ref())
            .map_or("", |room| room.title.as_str())
    }

    /// Live room URL, empty when unknown.
    pub fn room_url(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.live_room.as_ref())
            .map_or("", |room| room.url.as_str())
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Snapshot store, written by the poller and read by notification formatting.
///
/// Lock ordering: never held together with the connection registry lock.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Mutex<HashMap<u64, TrackedAccount>>,
}

impl AccountStore {
    /// Seed one `Unknown` entry per indexed account.
    pub fn from_index(index: &SubscriptionIndex) -> Self {
        let accounts = index
            .accounts()
            .iter()
            .map(|&id| (id, TrackedAccount::new(id)))
            .collect();
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    pub fn get(&self, account_id: u64) -> Option<TrackedAccount> {
        self.accounts.lock().get(&account_id).cloned()
    }

    /// Account ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<_> = self.accounts.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Apply a fresh profile and return `(previous status, updated snapshot)`.
    pub fn update(&self, account_id: u64, profile: AccountProfile) -> (LiveStatus, TrackedAccount) {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .entry(account_id)
            .or_insert_with(|| TrackedAccount::new(account_id));
        let previous = account.status;
        account.apply(profile);
        (previous, account.clone())
    }

    /// Snapshots of the accounts `group_id` follows, in config order.
    ///
    /// Accounts not present in the store yield a placeholder carrying only
    /// the id.
    pub fn subscriptions_for_group(
        &self,
        index: &SubscriptionIndex,
        group_id: i64,
    ) -> Vec<TrackedAccount> {
        let account_ids = index.accounts_of(group_id);
        let accounts = self.accounts.lock();
        account_ids
            .iter()
            .map(|id| {
                accounts
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| TrackedAccount::new(*id))
            })
            .collect()
    }
}
