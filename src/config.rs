use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// How a SAVE reaches the broadcast channel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Forward the source message (keeps the "forwarded from" header).
    #[default]
    Forward,
    /// Send the saved text as a new message.
    Send,
}

impl std::fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastMode::Forward => write!(f, "forward"),
            BroadcastMode::Send => write!(f, "send"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_store_config")]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Handle used to match `/command@handle`; resolved through getMe when absent.
    #[serde(default)]
    pub bot_username: Option<String>,
    pub broadcast_chat_id: i64,
    #[serde(default)]
    pub broadcast_mode: BroadcastMode,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Secret path segment the webhook is served under. Defaults to the bot token.
    #[serde(default)]
    pub webhook_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("telecollector.db")
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
        webhook_path: None,
    }
}

fn default_store_config() -> StoreConfig {
    StoreConfig {
        database_path: default_db_path(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Apply `TG_TOKEN`, `PORT` and `BOT_ADMINS` on top of the file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TG_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }

        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        if let Some(admins) = lookup("BOT_ADMINS") {
            for raw in admins.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match raw.parse::<i64>() {
                    Ok(id) if !self.telegram.admin_ids.contains(&id) => {
                        self.telegram.admin_ids.push(id)
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unparsable admin id '{}': {}", raw, e),
                }
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token is empty");
        }
        if self.webhook_path().trim_matches('/').is_empty() {
            bail!("server.webhook_path is empty");
        }
        Ok(())
    }

    /// Secret webhook path segment, without slashes.
    pub fn webhook_path(&self) -> &str {
        self.server
            .webhook_path
            .as_deref()
            .unwrap_or(&self.telegram.bot_token)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[telegram]
bot_token = "123:abc"
broadcast_chat_id = -1001
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.database_path, PathBuf::from("telecollector.db"));
        assert_eq!(config.telegram.broadcast_mode, BroadcastMode::Forward);
        assert!(config.telegram.admin_ids.is_empty());
        assert!(config.telegram.bot_username.is_none());
        assert_eq!(config.webhook_path(), "123:abc");
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
[telegram]
bot_token = "t"
bot_username = "CollectorBot"
broadcast_chat_id = -42
broadcast_mode = "send"
admin_ids = [1, 2]

[server]
host = "127.0.0.1"
port = 9000
webhook_path = "hook"

[store]
database_path = "/tmp/tc.db"
"#,
        )
        .unwrap();
        assert_eq!(config.telegram.broadcast_mode, BroadcastMode::Send);
        assert_eq!(config.telegram.admin_ids, vec![1, 2]);
        assert_eq!(config.telegram.bot_username.as_deref(), Some("CollectorBot"));
        assert_eq!(config.webhook_path(), "hook");
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_missing_broadcast_chat_is_error() {
        assert!(Config::parse("[telegram]\nbot_token = \"t\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config
            .apply_env_overrides(env(&[
                ("TG_TOKEN", "999:zzz"),
                ("PORT", "5000"),
                ("BOT_ADMINS", "7, oops,8,7"),
            ]))
            .unwrap();
        assert_eq!(config.telegram.bot_token, "999:zzz");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.telegram.admin_ids, vec![7, 8]);
    }

    #[test]
    fn test_invalid_port_is_error() {
        let mut config = Config::parse(MINIMAL).unwrap();
        assert!(config.apply_env_overrides(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.telegram.bot_token = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
