use super::control::{wait_while_paused, Control, RunState};
use super::goal;
use super::runtime::{lock, SharedRuntime};
use crate::config::ConfigHandle;
use crate::ecox::{ApiError, GrowthApi};
use crate::store::{Account, Store};
use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Backoff after a page-fetch or target-level failure.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);
/// Backoff when both target queues are empty, before refilling seeds.
const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_secs(600);

/// Why processing of one target ended.
enum TargetOutcome {
    /// The target's list returned an empty page.
    Exhausted,
    /// A goal check passed mid-target.
    GoalMet,
    /// The account was stopped externally.
    Stopped,
}

/// The per-account follow & discovery control loop. One instance per
/// account run, driven as a detached task by the lifecycle manager.
pub struct FollowLoop {
    api: Arc<dyn GrowthApi>,
    store: Arc<dyn Store>,
    config: ConfigHandle,
    control: Control,
    global_pause: watch::Receiver<bool>,
    account: Account,
    runtime: SharedRuntime,
}

impl FollowLoop {
    pub fn new(
        api: Arc<dyn GrowthApi>,
        store: Arc<dyn Store>,
        config: ConfigHandle,
        control: Control,
        global_pause: watch::Receiver<bool>,
        account: Account,
        runtime: SharedRuntime,
    ) -> Self {
        Self {
            api,
            store,
            config,
            control,
            global_pause,
            account,
            runtime,
        }
    }

    /// Drive the loop until the account is stopped or its goal completes.
    pub async fn run(self) -> Result<()> {
        let goal_target = self.prepare_goal().await;

        if let Some(target) = goal_target {
            if target <= 0 {
                tracing::warn!(
                    account = %self.account.name,
                    target_follow_backs = target,
                    "goal already met at entry, reversing and stopping"
                );
                self.finish().await;
                return Ok(());
            }
            tracing::info!(
                account = %self.account.name,
                target_follow_backs = target,
                "starting follow-back goal loop"
            );
        } else {
            tracing::info!(
                account = %self.account.name,
                "starting continuous follow & discover loop"
            );
        }

        loop {
            if !wait_while_paused(&self.control, &self.global_pause).await {
                break;
            }

            if let Some(target) = goal_target {
                if lock(&self.runtime).net_follow_backs >= target {
                    tracing::info!(
                        account = %self.account.name,
                        "follow-back goal achieved"
                    );
                    self.finish().await;
                    break;
                }
            }

            let Some(current_target) = lock(&self.runtime).next_target() else {
                tracing::warn!(
                    account = %self.account.name,
                    "target queues empty, backing off before reseeding"
                );
                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                let cfg = self.config.current();
                lock(&self.runtime).refill_seeds(&self.account, &cfg);
                continue;
            };

            match self.process_target(&current_target, goal_target).await {
                Ok(TargetOutcome::Exhausted) => {
                    tracing::info!(
                        account = %self.account.name,
                        target_user = %current_target,
                        "finished with target"
                    );
                }
                Ok(TargetOutcome::GoalMet) => {
                    tracing::info!(
                        account = %self.account.name,
                        "follow-back goal achieved"
                    );
                    self.finish().await;
                    break;
                }
                Ok(TargetOutcome::Stopped) => break,
                Err(err) => {
                    tracing::error!(
                        account = %self.account.name,
                        target_user = %current_target,
                        error = %format!("{:#}", err),
                        "error processing target, moving on"
                    );
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(account = %self.account.name, "follow & discover loop stopped");
        Ok(())
    }

    /// Goal-mode entry: resolve the net-follow-back target, capturing the
    /// initial follower count if it has never been captured. A failed
    /// capture disables goal mode for this run only, rather than stalling
    /// the account behind an unreachable baseline.
    async fn prepare_goal(&self) -> Option<i64> {
        if !self.account.enable_follow_back_goal || self.account.follower_target == 0 {
            return None;
        }

        let captured = lock(&self.runtime).initial_followers;
        let initial = match captured {
            Some(value) => value,
            None => match self.api.follower_count(&self.account).await {
                Ok(value) => {
                    lock(&self.runtime).initial_followers = Some(value);
                    if let Err(err) = self
                        .store
                        .set_initial_followers(&self.account.id, value)
                        .await
                    {
                        tracing::warn!(
                            account = %self.account.name,
                            error = %err,
                            "failed to persist initial follower count"
                        );
                    }
                    tracing::info!(
                        account = %self.account.name,
                        initial_followers = value,
                        "captured initial follower count"
                    );
                    value
                }
                Err(err) => {
                    tracing::error!(
                        account = %self.account.name,
                        error = %err,
                        "failed to fetch initial follower count, disabling goal for this run"
                    );
                    return None;
                }
            },
        };

        Some(self.account.follower_target as i64 - initial as i64)
    }

    async fn finish(&self) {
        goal::finish_goal(
            self.api.as_ref(),
            self.store.as_ref(),
            &self.account,
            &self.runtime,
            &self.config,
            &self.control,
            &self.global_pause,
        )
        .await;
    }

    /// Page through one target's relationship list, following unseen users
    /// under the configured rate limits. Page fetch failures retry the
    /// same page after a backoff; anything unrecoverable bubbles up and
    /// costs only this target.
    async fn process_target(
        &self,
        target: &str,
        goal_target: Option<i64>,
    ) -> Result<TargetOutcome> {
        let cfg = self.config.current();
        let kind = cfg.target_list_type.pick();

        let info = self
            .api
            .list_follow(&self.account, Some(target), 1, 1, kind)
            .await?;
        tracing::info!(
            account = %self.account.name,
            target_user = %target,
            list = kind.as_str(),
            total = info.total,
            "processing target"
        );

        let mut offset: u32 = 1;
        let mut batch_count: u32 = 0;
        loop {
            if !wait_while_paused(&self.control, &self.global_pause).await {
                return Ok(TargetOutcome::Stopped);
            }
            if let Some(goal) = goal_target {
                if lock(&self.runtime).net_follow_backs >= goal {
                    return Ok(TargetOutcome::GoalMet);
                }
            }

            let cfg = self.config.current();
            let page = match self
                .api
                .list_follow(&self.account, Some(target), offset, cfg.page_limit, kind)
                .await
            {
                Ok(page) => page,
                Err(err @ ApiError::MissingCredential(_)) => return Err(err.into()),
                Err(err) => {
                    tracing::error!(
                        account = %self.account.name,
                        target_user = %target,
                        offset,
                        error = %err,
                        "failed to fetch page, retrying"
                    );
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            if page.entries.is_empty() {
                return Ok(TargetOutcome::Exhausted);
            }

            for entry in page.entries {
                if !wait_while_paused(&self.control, &self.global_pause).await {
                    return Ok(TargetOutcome::Stopped);
                }

                let Some(user) = entry.user else { continue };
                let Some(uid) = user.uid else { continue };
                let username = user.username.unwrap_or_else(|| "unknown".to_string());

                if entry.is_following {
                    tracing::debug!(account = %self.account.name, %username, "already following, skipping");
                    continue;
                }
                if !lock(&self.runtime).mark_processed(&uid) {
                    tracing::debug!(account = %self.account.name, %username, "already processed this run, skipping");
                    continue;
                }

                match self.api.follow(&self.account, &uid).await {
                    Ok(()) => {
                        let follow_count = {
                            let mut rt = lock(&self.runtime);
                            rt.record_follow(uid, username.clone(), Utc::now());
                            rt.follow_count
                        };
                        tracing::info!(
                            account = %self.account.name,
                            %username,
                            total_this_run = follow_count,
                            "followed"
                        );
                        self.maybe_discover(&username);
                    }
                    Err(err @ ApiError::MissingCredential(_)) => return Err(err.into()),
                    Err(err) => {
                        tracing::error!(
                            account = %self.account.name,
                            %username,
                            error = %err,
                            "failed to follow"
                        );
                    }
                }

                batch_count += 1;
                let cfg = self.config.current();
                let follow_delay = self
                    .account
                    .follow_delay_secs
                    .unwrap_or(cfg.follow_delay_secs);
                tokio::time::sleep(Duration::from_secs(follow_delay)).await;

                let batch_size = self
                    .account
                    .follow_batch_size
                    .unwrap_or(cfg.follow_batch_size);
                if batch_count >= batch_size {
                    tracing::info!(
                        account = %self.account.name,
                        batch = batch_size,
                        "batch completed, cooling down"
                    );
                    if let Some(goal) = goal_target {
                        if goal::check_goal(
                            self.api.as_ref(),
                            self.store.as_ref(),
                            &self.account,
                            &self.runtime,
                            goal,
                        )
                        .await
                        {
                            return Ok(TargetOutcome::GoalMet);
                        }
                    }
                    tokio::time::sleep(Duration::from_secs(cfg.batch_delay_secs)).await;
                    batch_count = 0;
                }

                if self.control.state() == RunState::Stopped {
                    return Ok(TargetOutcome::Stopped);
                }
            }
            offset += 1;
        }
    }

    /// Probabilistically queue the freshly-followed user as a future
    /// target, bounded by the configured queue capacity.
    fn maybe_discover(&self, username: &str) {
        let cfg = self.config.current();
        if !cfg.enable_discovery || cfg.discovery_rate <= 0.0 {
            return;
        }
        let wins = cfg.discovery_rate >= 1.0
            || rand::thread_rng().gen_bool(cfg.discovery_rate.clamp(0.0, 1.0));
        if !wins {
            return;
        }
        let added = lock(&self.runtime).enqueue_discovery(username, cfg.max_discovery_queue);
        if added {
            tracing::info!(
                account = %self.account.name,
                %username,
                queue_len = lock(&self.runtime).discovered_len(),
                "discovery: queued new target"
            );
        }
    }
}
