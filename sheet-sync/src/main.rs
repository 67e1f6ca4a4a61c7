mod auth;
mod config;
mod dedup;
mod models;
mod reconcile;
mod source;
mod store;
mod sync;

use anyhow::{Context, Result};
use std::sync::Arc;

use auth::AuthManager;
use config::Config;
use reconcile::Reconciler;
use source::SheetsSource;
use sync::SyncLoop;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("Invalid configuration")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("sheet-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let credentials = Arc::new(AuthManager::new(http.clone(), &config.sheets));
    let source = SheetsSource::new(http, credentials, &config.sheets)
        .context("Failed to create Google Sheets source. Exiting")?;

    let store = store::from_config(&config.database);
    if let Err(e) = store.ensure_schema().await {
        log::error!("Error creating table: {:#}", e);
    }

    log::info!("sheet-sync {} started", env!("CARGO_PKG_VERSION"));

    let mut sync = SyncLoop::new(
        Arc::new(source),
        Reconciler::new(store),
        config.sync_interval,
    );
    sync.run().await;

    Ok(())
}
