pub mod broadcast;
pub mod update;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::info;

/// Handle the bot answers to in `/command@handle`: the configured one, else getMe.
pub async fn resolve_username(bot: &Bot, configured: Option<&str>) -> Result<String> {
    if let Some(name) = configured.filter(|n| !n.trim().is_empty()) {
        return Ok(name.trim().trim_start_matches('@').to_string());
    }

    let me = bot.get_me().await.context("Failed to call getMe")?;
    let username = me.username.clone().unwrap_or_default();
    info!("Resolved bot username via getMe: {}", username);
    Ok(username)
}
