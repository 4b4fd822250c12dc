use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gift_watch::api::{BotApi, TelegramClient};
use gift_watch::config::AppConfig;
use gift_watch::logging;
use gift_watch::scheduler::Scheduler;
use gift_watch::state::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let _guard = logging::init_logging(&config.log_dir)?;
    info!(version = env!("CARGO_PKG_VERSION"), "gift-watch starting");

    let cancel = CancellationToken::new();
    let retention = logging::start_retention_cleanup(config.log_dir.clone(), cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let state = StateStore::load(config.state_dir.clone())
        .await
        .with_context(|| format!("failed to load state from {}", config.state_dir.display()))?;

    let api: Arc<dyn BotApi> = Arc::new(TelegramClient::new(config.client_config()));
    let mut scheduler = Scheduler::new(api, state, &config);

    let result = scheduler.run(cancel.clone()).await;

    cancel.cancel();
    let _ = retention.await;

    result?;
    info!("gift-watch stopped");
    Ok(())
}
