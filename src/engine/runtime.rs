use crate::config::GlobalConfig;
use crate::store::Account;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One follow action taken by the engine, kept so the action can be
/// reversed later. Entries with `reversed == false` are exactly the users
/// this engine still follows on the account's behalf.
#[derive(Debug, Clone)]
pub struct FollowRecord {
    pub uid: String,
    pub username: String,
    pub followed_at: DateTime<Utc>,
    pub reversed: bool,
}

/// Process-local working state for one account. Never persisted; only the
/// mirrored `initial_followers` / `net_follow_backs` survive a restart,
/// reloaded from the store record.
#[derive(Debug, Default)]
pub struct AccountRuntime {
    seed_targets: VecDeque<String>,
    discovered_targets: VecDeque<String>,
    follow_history: Vec<FollowRecord>,
    processed_uids: HashSet<String>,
    pub follow_count: u64,
    pub initial_followers: Option<u64>,
    pub net_follow_backs: i64,
}

pub type SharedRuntime = Arc<Mutex<AccountRuntime>>;

/// Lock a shared runtime, recovering from poisoning. The runtime is only
/// ever mutated between await points, so a poisoned lock still holds
/// consistent state.
pub fn lock(runtime: &SharedRuntime) -> MutexGuard<'_, AccountRuntime> {
    runtime.lock().unwrap_or_else(|e| e.into_inner())
}

impl AccountRuntime {
    pub fn new(account: &Account, config: &GlobalConfig) -> Self {
        let mut runtime = Self {
            initial_followers: account.initial_followers,
            net_follow_backs: account.net_follow_backs,
            ..Self::default()
        };
        runtime.refill_seeds(account, config);
        runtime
    }

    /// Reset per-run state at the start of a (re)launch. History, the
    /// discovered queue, and counters carry over; the processed set is a
    /// per-run dedup guard and starts empty.
    pub fn begin_run(&mut self, account: &Account, config: &GlobalConfig) {
        self.processed_uids.clear();
        if self.initial_followers.is_none() {
            self.initial_followers = account.initial_followers;
        }
        if self.seed_targets.is_empty() {
            self.refill_seeds(account, config);
        }
    }

    /// Reload the seed queue from the account's explicit targets, falling
    /// back to the global default list.
    pub fn refill_seeds(&mut self, account: &Account, config: &GlobalConfig) {
        let seeds = if account.target_usernames.is_empty() {
            &config.target_usernames
        } else {
            &account.target_usernames
        };
        for seed in seeds {
            if !self.seed_targets.contains(seed) && !self.discovered_targets.contains(seed) {
                self.seed_targets.push_back(seed.clone());
            }
        }
    }

    /// Next target to page through: explicit seeds first, discoveries after.
    pub fn next_target(&mut self) -> Option<String> {
        self.seed_targets
            .pop_front()
            .or_else(|| self.discovered_targets.pop_front())
    }

    /// Returns true the first time a uid is seen this run.
    pub fn mark_processed(&mut self, uid: &str) -> bool {
        self.processed_uids.insert(uid.to_string())
    }

    pub fn record_follow(&mut self, uid: String, username: String, when: DateTime<Utc>) {
        self.follow_count += 1;
        self.follow_history.push(FollowRecord {
            uid,
            username,
            followed_at: when,
            reversed: false,
        });
    }

    /// Queue a newly-followed user as a future target. Bounded by `max`,
    /// skipped if the handle is already queued anywhere. The probability
    /// draw is the caller's business.
    pub fn enqueue_discovery(&mut self, username: &str, max: usize) -> bool {
        if self.discovered_targets.len() >= max {
            return false;
        }
        if self.seed_targets.iter().any(|t| t == username)
            || self.discovered_targets.iter().any(|t| t == username)
        {
            return false;
        }
        self.discovered_targets.push_back(username.to_string());
        true
    }

    pub fn discovered_len(&self) -> usize {
        self.discovered_targets.len()
    }

    /// Snapshot of history entries not yet reversed.
    pub fn unreversed(&self) -> Vec<FollowRecord> {
        self.follow_history
            .iter()
            .filter(|r| !r.reversed)
            .cloned()
            .collect()
    }

    pub fn mark_reversed(&mut self, uid: &str) {
        if let Some(record) = self.follow_history.iter_mut().find(|r| r.uid == uid) {
            record.reversed = true;
        }
    }

    /// Drop reversed entries after an unfollow pass; only entries still
    /// awaiting reversal stay resident.
    pub fn compact_history(&mut self) {
        self.follow_history.retain(|r| !r.reversed);
    }

    pub fn history_len(&self) -> usize {
        self.follow_history.len()
    }
}
