use anyhow::{anyhow, Context, Result};
use rusqlite::OptionalExtension;

use super::Store;
use crate::model::{BroadcastLink, LinkKind, SourceKey};

impl Store {
    /// Insert or replace the link for (source, kind) and bump its revision.
    pub async fn upsert_link(&self, link: &BroadcastLink) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO broadcasts (message_id, chat_id, kind, broadcast_id, revision, updated_at)
             VALUES (?1, ?2, ?3, ?4,
                     (SELECT COALESCE(MAX(revision), 0) + 1 FROM broadcasts),
                     datetime('now'))
             ON CONFLICT (chat_id, message_id, kind) DO UPDATE SET
                broadcast_id = excluded.broadcast_id,
                revision = excluded.revision,
                updated_at = excluded.updated_at",
            rusqlite::params![
                link.source.message_id,
                link.source.chat_id,
                link.kind.as_str(),
                link.broadcast_id,
            ],
        )
        .with_context(|| format!("Failed to record broadcast link for {}", link.source))?;
        Ok(())
    }

    /// The most recently written link for the source.
    pub async fn latest_link(&self, source: &SourceKey) -> Result<Option<BroadcastLink>> {
        let conn = self.conn.lock().await;
        let row: Option<(String, i32)> = conn
            .query_row(
                "SELECT kind, broadcast_id FROM broadcasts
                 WHERE chat_id = ?1 AND message_id = ?2
                 ORDER BY revision DESC LIMIT 1",
                rusqlite::params![source.chat_id, source.message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("Failed to look up broadcast link for {}", source))?;

        row.map(|(kind, broadcast_id)| to_link(source, &kind, broadcast_id))
            .transpose()
    }

    pub async fn link_of_kind(
        &self,
        source: &SourceKey,
        kind: LinkKind,
    ) -> Result<Option<BroadcastLink>> {
        let conn = self.conn.lock().await;
        let broadcast_id: Option<i32> = conn
            .query_row(
                "SELECT broadcast_id FROM broadcasts
                 WHERE chat_id = ?1 AND message_id = ?2 AND kind = ?3",
                rusqlite::params![source.chat_id, source.message_id, kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to look up {} link for {}", kind.as_str(), source))?;

        Ok(broadcast_id.map(|broadcast_id| BroadcastLink {
            source: *source,
            kind,
            broadcast_id,
        }))
    }

    #[cfg(test)]
    pub async fn count_links(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        Ok(conn.query_row("SELECT count(*) FROM broadcasts", [], |row| row.get(0))?)
    }
}

fn to_link(source: &SourceKey, kind: &str, broadcast_id: i32) -> Result<BroadcastLink> {
    let kind = LinkKind::parse(kind).ok_or_else(|| anyhow!("Unknown broadcast link kind: {}", kind))?;
    Ok(BroadcastLink {
        source: *source,
        kind,
        broadcast_id,
    })
}
