use anyhow::{Context, Result};

use super::Store;
use crate::model::Allowance;

impl Store {
    pub async fn all_allowances(&self) -> Result<Vec<Allowance>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT chat_id, author_id, follow FROM allowances")
            .context("Failed to prepare allowance query")?;
        let allowances = stmt
            .query_map([], |row| {
                Ok(Allowance {
                    chat_id: row.get(0)?,
                    author_id: row.get(1)?,
                    follow: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load allowances")?;
        Ok(allowances)
    }

    pub async fn upsert_allowance(&self, allowance: &Allowance) -> Result<()> {
        let modified = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO allowances (chat_id, author_id, follow, modified)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (chat_id) DO UPDATE SET
                author_id = excluded.author_id,
                follow = excluded.follow,
                modified = excluded.modified",
            rusqlite::params![
                allowance.chat_id,
                allowance.author_id,
                allowance.follow,
                modified
            ],
        )
        .with_context(|| format!("Failed to update allowance for chat {}", allowance.chat_id))?;
        Ok(())
    }
}
