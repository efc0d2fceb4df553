use super::{Account, AccountStatus, Store, StoreEvent};
use crate::config::GlobalConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

/// In-process store implementation. Holds the global config document and
/// the account collection, and fans external mutations out to subscribers
/// as [`StoreEvent`]s. Engine write-backs mutate state without emitting.
pub struct MemoryStore {
    inner: Mutex<State>,
    subscribers: Mutex<Vec<mpsc::Sender<StoreEvent>>>,
}

struct State {
    config: GlobalConfig,
    accounts: Vec<Account>,
}

impl MemoryStore {
    pub fn new(config: GlobalConfig, accounts: Vec<Account>) -> Self {
        Self {
            inner: Mutex::new(State { config, accounts }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("store event dropped: subscriber buffer full");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Read back one account record (test and diagnostics hook).
    pub fn account(&self, account_id: &str) -> Option<Account> {
        self.lock()
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .cloned()
    }

    // External mutations. These mirror what the dashboard side would do and
    // notify subscribers like a real change stream.

    pub fn upsert_account(&self, account: Account) {
        let added = {
            let mut state = self.lock();
            match state.accounts.iter_mut().find(|a| a.id == account.id) {
                Some(existing) => {
                    *existing = account.clone();
                    false
                }
                None => {
                    state.accounts.push(account.clone());
                    true
                }
            }
        };
        if added {
            self.emit(StoreEvent::AccountAdded(account));
        } else {
            self.emit(StoreEvent::AccountModified(account));
        }
    }

    pub fn remove_account(&self, account_id: &str) {
        let existed = {
            let mut state = self.lock();
            let before = state.accounts.len();
            state.accounts.retain(|a| a.id != account_id);
            state.accounts.len() != before
        };
        if existed {
            self.emit(StoreEvent::AccountRemoved(account_id.to_string()));
        }
    }

    pub fn update_global_config(&self, config: GlobalConfig) {
        self.lock().config = config.clone();
        self.emit(StoreEvent::ConfigChanged(config));
    }

    fn with_account<F>(&self, account_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        let mut state = self.lock();
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| anyhow!("unknown account: {}", account_id))?;
        mutate(account);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn global_config(&self) -> Result<Option<GlobalConfig>> {
        Ok(Some(self.lock().config.clone()))
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.lock().accounts.clone())
    }

    async fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    async fn set_initial_followers(&self, account_id: &str, value: u64) -> Result<()> {
        self.with_account(account_id, |a| a.initial_followers = Some(value))
    }

    async fn set_net_follow_backs(&self, account_id: &str, value: i64) -> Result<()> {
        self.with_account(account_id, |a| a.net_follow_backs = value)
    }

    async fn mark_done(&self, account_id: &str) -> Result<()> {
        self.with_account(account_id, |a| {
            a.status = AccountStatus::Done;
            a.active = false;
        })
    }
}
