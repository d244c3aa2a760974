mod collector;
mod config;
mod model;
mod server;
mod store;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::collector::access::AccessControl;
use crate::collector::dispatcher::Dispatcher;
use crate::config::Config;
use crate::server::AppState;
use crate::store::Store;
use crate::telegram::broadcast::TelegramBroadcaster;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telecollector=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Broadcast chat: {}", config.telegram.broadcast_chat_id);
    info!("  Broadcast mode: {}", config.telegram.broadcast_mode);
    info!("  Admins: {:?}", config.telegram.admin_ids);
    info!("  Database: {}", config.store.database_path.display());

    let store = Arc::new(Store::open(&config.store.database_path)?);
    let access = AccessControl::load(store.clone(), &config.telegram.admin_ids)
        .await
        .context("Failed to load allowances")?;

    let bot = Bot::new(&config.telegram.bot_token);
    let username = telegram::resolve_username(&bot, config.telegram.bot_username.as_deref()).await?;
    info!("  Bot username: @{}", username);

    let broadcaster = Arc::new(TelegramBroadcaster::new(
        bot,
        config.telegram.broadcast_chat_id,
    ));
    let dispatcher = Dispatcher::new(
        store,
        broadcaster,
        access,
        &username,
        config.telegram.broadcast_mode,
    );

    let state = Arc::new(AppState { dispatcher });

    info!("Collector is starting...");
    server::serve(state, &config.listen_addr(), config.webhook_path()).await?;

    Ok(())
}
