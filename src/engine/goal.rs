use super::control::{wait_while_paused, Control};
use super::runtime::{lock, SharedRuntime};
use crate::config::ConfigHandle;
use crate::ecox::types::ListKind;
use crate::ecox::GrowthApi;
use crate::store::{Account, Store};
use std::time::Duration;
use tokio::sync::watch;

/// Fetch the live follower count and evaluate the net-follow-back goal.
/// Updates the runtime and the store with the latest `net_follow_backs`.
/// A failed count fetch is never treated as goal failure.
pub async fn check_goal(
    api: &dyn GrowthApi,
    store: &dyn Store,
    account: &Account,
    runtime: &SharedRuntime,
    target_follow_backs: i64,
) -> bool {
    match api.follower_count(account).await {
        Ok(current) => {
            let initial = lock(runtime).initial_followers.unwrap_or(0);
            let net_gained = current as i64 - initial as i64;
            lock(runtime).net_follow_backs = net_gained;
            if let Err(err) = store.set_net_follow_backs(&account.id, net_gained).await {
                tracing::warn!(account = %account.name, error = %err, "failed to persist net follow-backs");
            }
            tracing::info!(
                account = %account.name,
                current,
                initial,
                net_gained,
                goal = target_follow_backs,
                "follower check"
            );
            net_gained >= target_follow_backs
        }
        Err(err) => {
            tracing::error!(account = %account.name, error = %err, "failed to check current follower count");
            false
        }
    }
}

/// Reverse every follow this engine took for the account, honoring the
/// same pause flags and batch discipline as the follow loop. Failures
/// leave the entry unreversed for a future pass; the history is compacted
/// afterwards so only unreversed entries stay resident.
pub async fn selective_unfollow(
    api: &dyn GrowthApi,
    account: &Account,
    runtime: &SharedRuntime,
    config: &ConfigHandle,
    control: &Control,
    global_pause: &watch::Receiver<bool>,
) {
    let pending = lock(runtime).unreversed();
    tracing::info!(
        account = %account.name,
        count = pending.len(),
        "starting selective unfollow pass"
    );

    let mut batch_count: u32 = 0;
    for record in pending {
        if !wait_while_paused(control, global_pause).await {
            tracing::warn!(account = %account.name, "stopped during selective unfollow");
            break;
        }

        match api.unfollow(account, &record.uid).await {
            Ok(()) => {
                lock(runtime).mark_reversed(&record.uid);
                tracing::info!(account = %account.name, username = %record.username, "unfollowed");
            }
            Err(err) => {
                tracing::error!(
                    account = %account.name,
                    username = %record.username,
                    error = %err,
                    "failed to unfollow"
                );
            }
        }

        let cfg = config.current();
        tokio::time::sleep(Duration::from_secs(cfg.unfollow_delay_secs)).await;
        batch_count += 1;
        if batch_count >= cfg.unfollow_batch_size {
            tracing::info!(
                account = %account.name,
                batch = cfg.unfollow_batch_size,
                "unfollow batch completed, cooling down"
            );
            tokio::time::sleep(Duration::from_secs(cfg.batch_delay_secs)).await;
            batch_count = 0;
        }
    }

    let remaining = {
        let mut rt = lock(runtime);
        rt.compact_history();
        rt.history_len()
    };
    tracing::info!(
        account = %account.name,
        remaining,
        "selective unfollow pass finished"
    );
}

/// Terminal goal path: reverse this engine's follows, mark the account
/// done in the store, and stop its loops. One-way.
pub async fn finish_goal(
    api: &dyn GrowthApi,
    store: &dyn Store,
    account: &Account,
    runtime: &SharedRuntime,
    config: &ConfigHandle,
    control: &Control,
    global_pause: &watch::Receiver<bool>,
) {
    selective_unfollow(api, account, runtime, config, control, global_pause).await;
    match store.mark_done(&account.id).await {
        Ok(()) => tracing::info!(account = %account.name, "marked account done"),
        Err(err) => {
            tracing::error!(account = %account.name, error = %err, "failed to mark account done");
        }
    }
    control.stop();
}

/// Standard unfollow pass: walk the account's own `following` list and
/// unfollow everyone not on the whitelist. Unlike the selective pass this
/// touches relationships the engine did not create, so it is only run on
/// explicit request.
pub async fn standard_unfollow(
    api: &dyn GrowthApi,
    account: &Account,
    config: &ConfigHandle,
    control: &Control,
    global_pause: &watch::Receiver<bool>,
) {
    let whitelist = config.current().unfollow_whitelist.clone();
    tracing::info!(
        account = %account.name,
        whitelist = ?whitelist,
        "starting standard unfollow pass"
    );

    let mut offset: u32 = 1;
    let mut batch_count: u32 = 0;
    loop {
        if !wait_while_paused(control, global_pause).await {
            return;
        }

        let cfg = config.current();
        let page = match api
            .list_follow(account, None, offset, cfg.page_limit, ListKind::Following)
            .await
        {
            Ok(page) if page.entries.is_empty() => break,
            Ok(page) => page,
            Err(err) => {
                tracing::error!(account = %account.name, error = %err, "failed to fetch following page");
                break;
            }
        };

        for entry in page.entries {
            if !wait_while_paused(control, global_pause).await {
                return;
            }
            let Some(user) = entry.user else { continue };
            let Some(uid) = user.uid else { continue };
            let username = user.username.unwrap_or_else(|| "unknown".to_string());

            if whitelist.iter().any(|w| *w == username) {
                tracing::warn!(account = %account.name, %username, "skipping whitelisted user");
                continue;
            }

            if let Err(err) = api.unfollow(account, &uid).await {
                tracing::error!(account = %account.name, %username, error = %err, "failed to unfollow");
            } else {
                tracing::info!(account = %account.name, %username, "unfollowed");
            }

            let cfg = config.current();
            tokio::time::sleep(Duration::from_secs(cfg.unfollow_delay_secs)).await;
            batch_count += 1;
            if batch_count >= cfg.unfollow_batch_size {
                tracing::info!(
                    account = %account.name,
                    batch = cfg.unfollow_batch_size,
                    "unfollow batch completed, cooling down"
                );
                tokio::time::sleep(Duration::from_secs(cfg.batch_delay_secs)).await;
                batch_count = 0;
            }
        }
        offset += 1;
    }

    tracing::info!(account = %account.name, "standard unfollow pass finished");
}
