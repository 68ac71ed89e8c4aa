//! Group to account subscription index.
//!
//! Built once from configuration and never mutated, so it is shared as a
//! plain `Arc` without a lock.

use std::collections::{BTreeSet, HashMap};

use crate::config::SubscriptionEntry;

/// Bidirectional mapping between subscriber groups and tracked accounts.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionIndex {
    /// Groups in config order.
    groups: Vec<i64>,
    group_accounts: HashMap<i64, Vec<u64>>,
    account_groups: HashMap<u64, BTreeSet<i64>>,
    /// Every followed account, in first-seen order.
    accounts: Vec<u64>,
}

impl SubscriptionIndex {
    pub fn new(entries: &[SubscriptionEntry]) -> Self {
        let mut index = Self::default();

        for entry in entries {
            let accounts = index.group_accounts.entry(entry.group_id).or_insert_with(|| {
                index.groups.push(entry.group_id);
                Vec::new()
            });

            for &account_id in &entry.accounts {
                if !accounts.contains(&account_id) {
                    accounts.push(account_id);
                }

                let groups = index.account_groups.entry(account_id).or_default();
                if groups.is_empty() {
                    index.accounts.push(account_id);
                }
                groups.insert(entry.group_id);
            }
        }

        index
    }

    /// Accounts followed by `group_id`, in config order.
    pub fn accounts_of(&self, group_id: i64) -> &[u64] {
        self.group_accounts
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Groups following `account_id`. `None` when the account is not indexed.
    pub fn groups_of(&self, account_id: u64) -> Option<&BTreeSet<i64>> {
        self.account_groups.get(&account_id)
    }

    /// All followed accounts, deduplicated.
    pub fn accounts(&self) -> &[u64] {
        &self.accounts
    }

    pub fn groups(&self) -> &[i64] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
