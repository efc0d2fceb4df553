use anyhow::{Context, Result};
use ecox_grow::config::{ConfigHandle, EngineConfig};
use ecox_grow::ecox::client::EcoxClient;
use ecox_grow::engine::Engine;
use ecox_grow::store::memory::MemoryStore;
use ecox_grow::store::{Account, Store};
use std::path::Path;
use std::sync::Arc;

fn load_accounts(path: &Path) -> Result<Vec<Account>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read accounts file: {}", path.display()))?;
    let accounts: Vec<Account> =
        serde_json::from_str(&content).with_context(|| "Failed to parse accounts JSON")?;
    Ok(accounts)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ecox_grow=info".to_string()),
        )
        .init();

    let engine_config = EngineConfig::load(Path::new("config.toml"))?;

    // The account store is the one thing nothing can proceed without.
    let accounts = load_accounts(Path::new(&engine_config.store.accounts_file))?;
    tracing::info!(count = accounts.len(), "loaded accounts");

    let store = Arc::new(MemoryStore::new(engine_config.defaults.clone(), accounts));
    let global = store
        .global_config()
        .await?
        .unwrap_or_else(|| engine_config.defaults.clone());
    let config = ConfigHandle::new(global);

    let api = Arc::new(EcoxClient::new(&engine_config.api.base_url));
    let events = store.subscribe().await;

    let engine = Engine::new(api, store, config);
    engine.start_active().await?;

    tokio::select! {
        _ = engine.run(events) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("shutdown requested, stopping account loops");
            engine.stop_all();
        }
    }

    Ok(())
}
