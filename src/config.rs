use crate::ecox::types::ListKind;
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Process-level settings read once from `config.toml` at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Fallback global config used until (and unless) the store provides one.
    #[serde(default)]
    pub defaults: GlobalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,
}

fn default_accounts_file() -> String {
    "accounts.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        Ok(config)
    }
}

/// Which relationship list of a target to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetListType {
    Follower,
    Following,
    Both,
}

impl TargetListType {
    /// Resolve to a concrete list kind; `Both` picks per target with 50/50 odds.
    pub fn pick(self) -> ListKind {
        match self {
            TargetListType::Follower => ListKind::Follower,
            TargetListType::Following => ListKind::Following,
            TargetListType::Both => {
                if rand::thread_rng().gen_bool(0.5) {
                    ListKind::Follower
                } else {
                    ListKind::Following
                }
            }
        }
    }
}

/// Shared defaults for all accounts without per-account overrides.
/// Live-updated from the store; loops must read through [`ConfigHandle`]
/// rather than holding a copy.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub target_usernames: Vec<String>,
    #[serde(default = "default_follow_batch_size")]
    pub follow_batch_size: u32,
    #[serde(default = "default_unfollow_batch_size")]
    pub unfollow_batch_size: u32,
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    #[serde(default = "default_follow_delay_secs")]
    pub follow_delay_secs: u64,
    #[serde(default = "default_unfollow_delay_secs")]
    pub unfollow_delay_secs: u64,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default)]
    pub unfollow_whitelist: Vec<String>,
    #[serde(default = "default_claim_hour_utc")]
    pub claim_hour_utc: u32,
    #[serde(default)]
    pub claim_minute_utc: u32,
    #[serde(default = "default_enable_discovery")]
    pub enable_discovery: bool,
    #[serde(default = "default_discovery_rate")]
    pub discovery_rate: f64,
    #[serde(default = "default_max_discovery_queue")]
    pub max_discovery_queue: usize,
    #[serde(default = "default_target_list_type")]
    pub target_list_type: TargetListType,
}

fn default_follow_batch_size() -> u32 {
    5
}
fn default_unfollow_batch_size() -> u32 {
    10
}
fn default_batch_delay_secs() -> u64 {
    30
}
fn default_follow_delay_secs() -> u64 {
    5
}
fn default_unfollow_delay_secs() -> u64 {
    2
}
fn default_page_limit() -> u32 {
    5
}
fn default_claim_hour_utc() -> u32 {
    1
}
fn default_enable_discovery() -> bool {
    true
}
fn default_discovery_rate() -> f64 {
    0.1
}
fn default_max_discovery_queue() -> usize {
    100
}
fn default_target_list_type() -> TargetListType {
    TargetListType::Follower
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            target_usernames: Vec::new(),
            follow_batch_size: default_follow_batch_size(),
            unfollow_batch_size: default_unfollow_batch_size(),
            batch_delay_secs: default_batch_delay_secs(),
            follow_delay_secs: default_follow_delay_secs(),
            unfollow_delay_secs: default_unfollow_delay_secs(),
            page_limit: default_page_limit(),
            unfollow_whitelist: Vec::new(),
            claim_hour_utc: default_claim_hour_utc(),
            claim_minute_utc: 0,
            enable_discovery: default_enable_discovery(),
            discovery_rate: default_discovery_rate(),
            max_discovery_queue: default_max_discovery_queue(),
            target_list_type: default_target_list_type(),
        }
    }
}

/// Hot-swappable handle to the current [`GlobalConfig`].
///
/// The store listener is the single writer; every reader takes a fresh
/// snapshot per read so live config updates apply mid-loop.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<GlobalConfig>>,
}

impl ConfigHandle {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    pub fn current(&self) -> Arc<GlobalConfig> {
        self.inner.load_full()
    }

    pub fn replace(&self, config: GlobalConfig) {
        self.inner.store(Arc::new(config));
    }
}
