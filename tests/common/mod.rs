//! Scripted mock of the growth-platform API for integration tests.

use async_trait::async_trait;
use ecox_grow::ecox::types::{FollowEntry, FollowPage, ListKind, UserRef};
use ecox_grow::ecox::{ApiError, GrowthApi};
use ecox_grow::store::Account;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockUser {
    pub uid: String,
    pub username: String,
    pub is_following: bool,
}

pub fn user(uid: &str, username: &str) -> MockUser {
    MockUser {
        uid: uid.to_string(),
        username: username.to_string(),
        is_following: false,
    }
}

/// Scripted remote API. Relationship lists are fixed per target; follower
/// counts are consumed front-to-back with the last value repeating.
#[derive(Default)]
pub struct MockApi {
    /// Relationship lists keyed by target username.
    pub targets: Mutex<HashMap<String, Vec<MockUser>>>,
    /// The account's own `following` list (standard unfollow pass).
    pub own_following: Mutex<Vec<MockUser>>,
    /// Scripted `follower_count` results; last value repeats once drained.
    pub follower_counts: Mutex<VecDeque<u64>>,
    pub count_calls: Mutex<u32>,
    /// Target names for which a minimal info page (offset 1, limit 1) was
    /// requested — one entry per target-processing pass.
    pub info_calls: Mutex<Vec<String>>,
    pub follows: Mutex<Vec<String>>,
    pub unfollows: Mutex<Vec<String>>,
    pub fail_unfollow_uids: Mutex<HashSet<String>>,
    pub claim_results: Mutex<VecDeque<Result<String, ApiError>>>,
    pub claim_calls: Mutex<u32>,
    /// Artificial latency for claim calls, to widen the claim-pause window.
    pub claim_delay: Mutex<Duration>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockApi {
    pub fn with_target(self, username: &str, users: Vec<MockUser>) -> Self {
        guard(&self.targets).insert(username.to_string(), users);
        self
    }

    pub fn with_follower_counts(self, counts: &[u64]) -> Self {
        *guard(&self.follower_counts) = counts.iter().copied().collect();
        self
    }

    pub fn follow_count(&self) -> usize {
        guard(&self.follows).len()
    }

    pub fn unfollow_count(&self) -> usize {
        guard(&self.unfollows).len()
    }

    fn entry(user: &MockUser) -> FollowEntry {
        FollowEntry {
            user: Some(UserRef {
                uid: Some(user.uid.clone()),
                username: Some(user.username.clone()),
            }),
            is_following: user.is_following,
        }
    }
}

#[async_trait]
impl GrowthApi for MockApi {
    async fn follower_count(&self, _account: &Account) -> Result<u64, ApiError> {
        *guard(&self.count_calls) += 1;
        let mut counts = guard(&self.follower_counts);
        match counts.len() {
            0 => Err(ApiError::Remote {
                status: 503,
                detail: "no scripted follower count".to_string(),
            }),
            1 => Ok(counts[0]),
            _ => Ok(counts.pop_front().expect("non-empty")),
        }
    }

    async fn list_follow(
        &self,
        _account: &Account,
        username: Option<&str>,
        offset: u32,
        limit: u32,
        _kind: ListKind,
    ) -> Result<FollowPage, ApiError> {
        let users = match username {
            Some(name) => guard(&self.targets).get(name).cloned().unwrap_or_default(),
            None => guard(&self.own_following).clone(),
        };
        if let (Some(name), 1, 1) = (username, offset, limit) {
            guard(&self.info_calls).push(name.to_string());
        }
        let start = ((offset.saturating_sub(1)) * limit) as usize;
        let entries = users
            .iter()
            .skip(start)
            .take(limit as usize)
            .map(Self::entry)
            .collect();
        Ok(FollowPage {
            entries,
            total: users.len() as u64,
        })
    }

    async fn follow(&self, _account: &Account, uid: &str) -> Result<(), ApiError> {
        guard(&self.follows).push(uid.to_string());
        Ok(())
    }

    async fn unfollow(&self, _account: &Account, uid: &str) -> Result<(), ApiError> {
        if guard(&self.fail_unfollow_uids).contains(uid) {
            return Err(ApiError::Remote {
                status: 500,
                detail: "scripted unfollow failure".to_string(),
            });
        }
        guard(&self.unfollows).push(uid.to_string());
        Ok(())
    }

    async fn claim_daily(&self, _account: &Account) -> Result<String, ApiError> {
        *guard(&self.claim_calls) += 1;
        let delay = *guard(&self.claim_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard(&self.claim_results)
            .pop_front()
            .unwrap_or_else(|| Ok("Claim successful.".to_string()))
    }
}

/// Poll until `cond` holds; panics after a bounded number of virtual-time
/// steps. Intended for `#[tokio::test(start_paused = true)]` tests.
pub async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..20_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for: {}", what);
}
