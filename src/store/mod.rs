pub mod memory;

use crate::config::GlobalConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// External lifecycle status of an account. `Done` is one-way from the
/// engine's perspective: a done account is not started again until the
/// status is externally reset to `Processing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Processing,
    Done,
}

/// One automated identity under management, as stored externally.
/// The engine mutates only `status`, `active`, `initial_followers`, and
/// `net_follow_backs`; everything else is owned by the onboarding side.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub target_usernames: Vec<String>,
    #[serde(default)]
    pub follower_target: u64,
    #[serde(default)]
    pub enable_follow_back_goal: bool,
    /// Captured exactly once; never recomputed after capture.
    #[serde(default)]
    pub initial_followers: Option<u64>,
    #[serde(default)]
    pub net_follow_backs: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub status: AccountStatus,
    // Per-account overrides; fall back to GlobalConfig when absent.
    #[serde(default)]
    pub follow_batch_size: Option<u32>,
    #[serde(default)]
    pub follow_delay_secs: Option<u64>,
    #[serde(default)]
    pub claim_hour_utc: Option<u32>,
    #[serde(default)]
    pub claim_minute_utc: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl Account {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            bearer_token: None,
            target_usernames: Vec::new(),
            follower_target: 0,
            enable_follow_back_goal: false,
            initial_followers: None,
            net_follow_backs: 0,
            active: true,
            status: AccountStatus::Processing,
            follow_batch_size: None,
            follow_delay_secs: None,
            claim_hour_utc: None,
            claim_minute_utc: None,
        }
    }
}

/// Change notification from the external store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    ConfigChanged(GlobalConfig),
    AccountAdded(Account),
    AccountModified(Account),
    AccountRemoved(String),
}

/// Keyed-document store the engine consumes. Reads on load, a change
/// stream afterwards, and write-back limited to the bounded field set.
#[async_trait]
pub trait Store: Send + Sync {
    async fn global_config(&self) -> Result<Option<GlobalConfig>>;

    async fn accounts(&self) -> Result<Vec<Account>>;

    /// Subscribe to external change notifications. Writes made through this
    /// trait are not echoed back.
    async fn subscribe(&self) -> mpsc::Receiver<StoreEvent>;

    async fn set_initial_followers(&self, account_id: &str, value: u64) -> Result<()>;

    async fn set_net_follow_backs(&self, account_id: &str, value: i64) -> Result<()>;

    /// Mark the account `done` and inactive in one write.
    async fn mark_done(&self, account_id: &str) -> Result<()>;
}
