pub mod allowances;
pub mod broadcasts;
pub mod messages;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::collector::MessageStore;
use crate::model::{Allowance, BroadcastLink, Entry, LinkKind, SourceKey};

/// Thread-safe SQLite store for collected messages, broadcast links and allowances
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY,
                platform TEXT NOT NULL,
                name TEXT
            );

            CREATE TABLE IF NOT EXISTS authors (
                author_id INTEGER PRIMARY KEY,
                first TEXT NOT NULL,
                last TEXT,
                username TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                date INTEGER NOT NULL,
                text TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                reply_to INTEGER,
                PRIMARY KEY (chat_id, message_id)
            );

            -- One row per (source message, kind); revision orders writes across the table
            CREATE TABLE IF NOT EXISTS broadcasts (
                message_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                broadcast_id INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (chat_id, message_id, kind)
            );

            CREATE TABLE IF NOT EXISTS allowances (
                chat_id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL,
                follow INTEGER NOT NULL,
                modified TEXT NOT NULL
            );
            ",
        )
        .context("Failed to run migrations")?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for Store {
    async fn save(&self, entry: &Entry) -> Result<String> {
        self.save_message(entry).await
    }

    async fn append(&self, entry: &Entry, target: i32) -> Result<String> {
        self.append_message(entry, target).await
    }

    async fn check_connected(&self, entry: &Entry) -> Result<bool> {
        self.previous_exists(entry).await
    }

    async fn log_broadcast_link(&self, link: &BroadcastLink) -> Result<()> {
        self.upsert_link(link).await
    }

    async fn find_broadcast_link(&self, source: &SourceKey) -> Result<Option<BroadcastLink>> {
        self.latest_link(source).await
    }

    async fn find_broadcast_link_of_kind(
        &self,
        source: &SourceKey,
        kind: LinkKind,
    ) -> Result<Option<BroadcastLink>> {
        self.link_of_kind(source, kind).await
    }

    async fn load_allowances(&self) -> Result<Vec<Allowance>> {
        self.all_allowances().await
    }

    async fn set_chat_follow(&self, allowance: &Allowance) -> Result<()> {
        self.upsert_allowance(allowance).await
    }
}
