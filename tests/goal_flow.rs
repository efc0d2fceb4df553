//! Integration tests for the goal-tracking and unfollow paths.

mod common;

use common::{user, wait_for, MockApi};
use ecox_grow::config::{ConfigHandle, GlobalConfig};
use ecox_grow::engine::control::Control;
use ecox_grow::engine::runtime::lock;
use ecox_grow::engine::{goal, Engine};
use ecox_grow::store::memory::MemoryStore;
use ecox_grow::store::{Account, AccountStatus};
use std::sync::Arc;

fn goal_account(id: &str, name: &str) -> Account {
    let mut account = Account::new(id, name);
    account.bearer_token = Some("token".to_string());
    account.target_usernames = vec!["seed".to_string()];
    account
}

fn quiet_config() -> GlobalConfig {
    // Discovery off so follow counts are exactly the scripted lists.
    let mut config = GlobalConfig::default();
    config.enable_discovery = false;
    config
}

#[tokio::test(start_paused = true)]
async fn test_goal_trivially_met_reverses_without_following() {
    let mut account = goal_account("a1", "alpha");
    account.enable_follow_back_goal = true;
    account.follower_target = 400;
    account.initial_followers = Some(500);

    let api = Arc::new(MockApi::default().with_target("seed", vec![user("u1", "one")]));
    let store = Arc::new(MemoryStore::new(quiet_config(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(quiet_config()));

    engine.start(&account);
    wait_for("account marked done", || {
        store.account("a1").is_some_and(|a| a.status == AccountStatus::Done)
    })
    .await;

    let stored = store.account("a1").unwrap();
    assert!(!stored.active);
    assert_eq!(stored.initial_followers, Some(500), "baseline untouched");
    assert_eq!(api.follow_count(), 0, "no follow may happen");
    assert_eq!(api.unfollow_count(), 0, "nothing to reverse");
    assert_eq!(
        *api.count_calls.lock().unwrap(),
        0,
        "captured baseline is never re-fetched"
    );

    wait_for("loop stopped", || !engine.is_running("a1")).await;
}

#[tokio::test(start_paused = true)]
async fn test_goal_reached_mid_run_reverses_and_marks_done() {
    let mut account = goal_account("a1", "alpha");
    account.enable_follow_back_goal = true;
    account.follower_target = 110;
    account.follow_batch_size = Some(2);

    // First count captures the baseline; the batch goal check then sees
    // the target reached.
    let api = Arc::new(
        MockApi::default()
            .with_target("seed", vec![user("u1", "one"), user("u2", "two")])
            .with_follower_counts(&[100, 110]),
    );
    let store = Arc::new(MemoryStore::new(quiet_config(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(quiet_config()));

    engine.start(&account);
    wait_for("account marked done", || {
        store.account("a1").is_some_and(|a| a.status == AccountStatus::Done)
    })
    .await;

    let stored = store.account("a1").unwrap();
    assert_eq!(stored.initial_followers, Some(100));
    assert_eq!(stored.net_follow_backs, 10);
    assert!(!stored.active);

    assert_eq!(api.follow_count(), 2);
    assert_eq!(api.unfollow_count(), 2, "every engine follow is reversed");

    let runtime = engine.runtime("a1").unwrap();
    assert_eq!(
        lock(&runtime).history_len(),
        0,
        "all-success reversal leaves no unreversed history"
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_unfollow_stays_in_history() {
    let mut account = goal_account("a1", "alpha");
    account.enable_follow_back_goal = true;
    account.follower_target = 110;
    account.follow_batch_size = Some(2);

    let api = Arc::new(
        MockApi::default()
            .with_target("seed", vec![user("u1", "one"), user("u2", "two")])
            .with_follower_counts(&[100, 110]),
    );
    api.fail_unfollow_uids.lock().unwrap().insert("u2".to_string());

    let store = Arc::new(MemoryStore::new(quiet_config(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(quiet_config()));

    engine.start(&account);
    wait_for("account marked done", || {
        store.account("a1").is_some_and(|a| a.status == AccountStatus::Done)
    })
    .await;

    let runtime = engine.runtime("a1").unwrap();
    let remaining = lock(&runtime).unreversed();
    assert_eq!(remaining.len(), 1, "failed reversal is kept for a later pass");
    assert_eq!(remaining[0].uid, "u2");
}

#[tokio::test(start_paused = true)]
async fn test_dedup_across_overlapping_targets() {
    let mut account = goal_account("a1", "alpha");
    account.target_usernames = vec!["first".to_string(), "second".to_string()];

    // "shared" appears in both lists; it must be followed exactly once.
    let api = Arc::new(
        MockApi::default()
            .with_target("first", vec![user("shared", "shared_user"), user("u1", "one")])
            .with_target("second", vec![user("shared", "shared_user"), user("u2", "two")]),
    );
    let store = Arc::new(MemoryStore::new(quiet_config(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(quiet_config()));

    engine.start(&account);
    wait_for("both targets processed", || api.follow_count() >= 3).await;
    engine.stop("a1");

    let follows = api.follows.lock().unwrap().clone();
    assert_eq!(
        follows.iter().filter(|uid| uid.as_str() == "shared").count(),
        1,
        "processed set must prevent duplicate follow calls"
    );
    assert_eq!(follows.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_goal_disabled_never_touches_goal_paths() {
    let account = goal_account("a1", "alpha");

    let api = Arc::new(MockApi::default().with_target("seed", vec![user("u1", "one")]));
    let store = Arc::new(MemoryStore::new(quiet_config(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(quiet_config()));

    engine.start(&account);
    wait_for("target followed", || api.follow_count() >= 1).await;
    engine.stop("a1");

    assert_eq!(
        *api.count_calls.lock().unwrap(),
        0,
        "goal-disabled loops never call the goal check"
    );
    assert_eq!(api.unfollow_count(), 0);
    assert_eq!(
        store.account("a1").unwrap().status,
        AccountStatus::Processing
    );
}

#[tokio::test(start_paused = true)]
async fn test_discovery_queue_bounded_under_full_rate() {
    let account = goal_account("a1", "alpha");

    let mut config = GlobalConfig::default();
    config.discovery_rate = 1.0;
    config.max_discovery_queue = 2;

    let api = Arc::new(MockApi::default().with_target(
        "seed",
        vec![user("u1", "one"), user("u2", "two"), user("u3", "three")],
    ));
    let store = Arc::new(MemoryStore::new(config.clone(), vec![account.clone()]));
    let engine = Engine::new(api.clone(), store.clone(), ConfigHandle::new(config));

    engine.start(&account);
    wait_for("seed target processed", || api.follow_count() >= 3).await;
    engine.stop("a1");

    let runtime = engine.runtime("a1").unwrap();
    assert!(
        lock(&runtime).discovered_len() <= 2,
        "discovered queue must not exceed its cap"
    );
}

#[tokio::test(start_paused = true)]
async fn test_standard_unfollow_honors_whitelist() {
    let account = goal_account("a1", "alpha");

    let mut config = GlobalConfig::default();
    config.unfollow_whitelist = vec!["protected".to_string()];

    let api = Arc::new(MockApi::default());
    *api.own_following.lock().unwrap() = vec![
        user("w1", "protected"),
        user("u1", "stranger_one"),
        user("u2", "stranger_two"),
    ];

    let control = Control::new();
    let (_tx, global_pause) = tokio::sync::watch::channel(false);

    goal::standard_unfollow(
        api.as_ref(),
        &account,
        &ConfigHandle::new(config),
        &control,
        &global_pause,
    )
    .await;

    let unfollows = api.unfollows.lock().unwrap().clone();
    assert!(
        !unfollows.contains(&"w1".to_string()),
        "whitelisted identifiers are never unfollowed"
    );
    assert_eq!(unfollows, vec!["u1".to_string(), "u2".to_string()]);
}
