use super::claim;
use super::control::{Control, RunState};
use super::follow_loop::FollowLoop;
use super::runtime::{lock, AccountRuntime, SharedRuntime};
use crate::config::ConfigHandle;
use crate::ecox::GrowthApi;
use crate::store::{Account, AccountStatus, Store, StoreEvent};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

struct AccountHandle {
    name: String,
    runtime: SharedRuntime,
    control: Control,
}

/// Starts and stops per-account loops in response to store change
/// notifications. Owns all per-account runtimes, keyed by account id.
pub struct Engine {
    api: Arc<dyn GrowthApi>,
    store: Arc<dyn Store>,
    config: ConfigHandle,
    global_pause: watch::Sender<bool>,
    accounts: Mutex<HashMap<String, AccountHandle>>,
}

impl Engine {
    pub fn new(api: Arc<dyn GrowthApi>, store: Arc<dyn Store>, config: ConfigHandle) -> Self {
        let (global_pause, _) = watch::channel(false);
        Self {
            api,
            store,
            config,
            global_pause,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Suspend every account loop at its next suspension point.
    pub fn pause_all(&self) {
        tracing::warn!("pausing all account loops");
        let _ = self.global_pause.send(true);
    }

    pub fn resume_all(&self) {
        tracing::info!("resuming all account loops");
        let _ = self.global_pause.send(false);
    }

    pub fn is_running(&self, account_id: &str) -> bool {
        self.handles()
            .get(account_id)
            .is_some_and(|h| h.control.state() != RunState::Stopped)
    }

    /// Start the loops for one account. Idempotent: a second start while
    /// the account is live is a no-op. Accounts marked `done` stay
    /// terminal until their status is externally reset.
    pub fn start(&self, account: &Account) {
        if account.status == AccountStatus::Done {
            tracing::warn!(
                account = %account.name,
                "account is done; reset status to processing before restarting"
            );
            return;
        }

        let mut accounts = self.handles();
        if let Some(handle) = accounts.get(&account.id) {
            if handle.control.state() != RunState::Stopped {
                tracing::info!(account = %account.name, "already running");
                return;
            }
        }

        let runtime = accounts
            .get(&account.id)
            .map(|h| h.runtime.clone())
            .unwrap_or_else(|| {
                Arc::new(Mutex::new(AccountRuntime::new(
                    account,
                    &self.config.current(),
                )))
            });
        lock(&runtime).begin_run(account, &self.config.current());

        let control = Control::new();

        tokio::spawn(claim::run_scheduler(
            self.api.clone(),
            account.clone(),
            self.config.clone(),
            control.clone(),
        ));

        let follow_loop = FollowLoop::new(
            self.api.clone(),
            self.store.clone(),
            self.config.clone(),
            control.clone(),
            self.global_pause.subscribe(),
            account.clone(),
            runtime.clone(),
        );
        let loop_control = control.clone();
        let name = account.name.clone();
        tokio::spawn(async move {
            if let Err(err) = follow_loop.run().await {
                tracing::error!(
                    account = %name,
                    error = %format!("{:#}", err),
                    "background loop failed"
                );
            }
            // Whatever the exit path, the handle now reflects a dead loop.
            loop_control.stop();
        });

        accounts.insert(
            account.id.clone(),
            AccountHandle {
                name: account.name.clone(),
                runtime,
                control,
            },
        );
        tracing::info!(account = %account.name, "started worker loop");
    }

    /// Cooperatively stop one account's loops. Idempotent.
    pub fn stop(&self, account_id: &str) {
        if let Some(handle) = self.handles().get(account_id) {
            if handle.control.state() == RunState::Stopped {
                return;
            }
            handle.control.stop();
            tracing::warn!(account = %handle.name, "stopped worker loop");
        }
    }

    pub fn stop_all(&self) {
        for handle in self.handles().values() {
            handle.control.stop();
        }
    }

    /// Stop and discard all local bookkeeping for a removed account. Does
    /// not reverse any already-taken follow actions.
    fn remove(&self, account_id: &str) {
        self.stop(account_id);
        if let Some(handle) = self.handles().remove(account_id) {
            tracing::info!(account = %handle.name, "discarded runtime for removed account");
        }
    }

    /// Start loops for every active account currently in the store.
    pub async fn start_active(&self) -> Result<()> {
        let accounts = self.store.accounts().await?;
        let active: Vec<_> = accounts.into_iter().filter(|a| a.active).collect();
        tracing::info!(count = active.len(), "starting active accounts");
        for account in &active {
            self.start(account);
        }
        Ok(())
    }

    /// Consume the store change stream until it closes.
    pub async fn run(&self, mut events: mpsc::Receiver<StoreEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                StoreEvent::ConfigChanged(config) => {
                    tracing::info!("global config updated");
                    self.config.replace(config);
                }
                StoreEvent::AccountAdded(account) | StoreEvent::AccountModified(account) => {
                    if account.active {
                        self.start(&account);
                    } else {
                        self.stop(&account.id);
                    }
                }
                StoreEvent::AccountRemoved(account_id) => {
                    self.remove(&account_id);
                }
            }
        }
        tracing::warn!("store change stream closed");
    }

    /// Test/diagnostics hook: the shared runtime for one account.
    pub fn runtime(&self, account_id: &str) -> Option<SharedRuntime> {
        self.handles().get(account_id).map(|h| h.runtime.clone())
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<String, AccountHandle>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}
