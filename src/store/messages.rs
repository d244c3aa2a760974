use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Transaction};

use super::Store;
use crate::model::{Entry, JOIN_SEPARATOR};

impl Store {
    /// Upsert chat and author, insert the message if it is new, and return the stored text.
    pub async fn save_message(&self, entry: &Entry) -> Result<String> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        upsert_chat_and_author(&tx, entry)?;

        tx.execute(
            "INSERT INTO messages (message_id, chat_id, author_id, date, text, tags, reply_to)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (chat_id, message_id) DO NOTHING",
            rusqlite::params![
                entry.message.id,
                entry.chat.id,
                entry.author.id,
                entry.message.date,
                &entry.message.text,
                encode_tags(&entry.message.tags)?,
                entry.message.reply_to,
            ],
        )
        .context("Failed to save message")?;

        let text: String = tx
            .query_row(
                "SELECT text FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![entry.chat.id, entry.message.id],
                |row| row.get(0),
            )
            .context("Failed to read back saved message")?;

        tx.commit().context("Failed to commit message")?;
        Ok(text)
    }

    /// Join `entry`'s text onto message `target`, creating the row if it is missing.
    pub async fn append_message(&self, entry: &Entry, target: i32) -> Result<String> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        upsert_chat_and_author(&tx, entry)?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT text, tags FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![entry.chat.id, target],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to load message to append to")?;

        let text = match existing {
            Some((stored_text, stored_tags)) => {
                let mut tags = decode_tags(&stored_tags)?;
                for tag in &entry.message.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
                let joined = format!("{}{}{}", stored_text, JOIN_SEPARATOR, entry.message.text);

                tx.execute(
                    "UPDATE messages SET text = ?1, tags = ?2, date = ?3
                     WHERE chat_id = ?4 AND message_id = ?5",
                    rusqlite::params![
                        &joined,
                        encode_tags(&tags)?,
                        entry.message.date,
                        entry.chat.id,
                        target,
                    ],
                )
                .context("Failed to append to message")?;
                joined
            }
            None => {
                tx.execute(
                    "INSERT INTO messages (message_id, chat_id, author_id, date, text, tags, reply_to)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        target,
                        entry.chat.id,
                        entry.author.id,
                        entry.message.date,
                        &entry.message.text,
                        encode_tags(&entry.message.tags)?,
                        entry.message.reply_to,
                    ],
                )
                .context("Failed to insert appended message")?;
                entry.message.text.clone()
            }
        };

        tx.commit().context("Failed to commit append")?;
        Ok(text)
    }

    /// Whether message `id - 1` of the same chat, author and date is stored.
    pub async fn previous_exists(&self, entry: &Entry) -> Result<bool> {
        let conn = self.conn.lock().await;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS (
                    SELECT 1 FROM messages
                    WHERE message_id = ?1 AND chat_id = ?2 AND author_id = ?3 AND date = ?4
                 )",
                rusqlite::params![
                    entry.message.id - 1,
                    entry.chat.id,
                    entry.author.id,
                    entry.message.date,
                ],
                |row| row.get(0),
            )
            .context("Failed to check for previous message")?;
        Ok(exists)
    }

    /// Stored text and tags of a message, if present.
    #[cfg(test)]
    pub async fn load_message(&self, chat_id: i64, message_id: i32) -> Result<Option<(String, Vec<String>)>> {
        let conn = self.conn.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT text, tags FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![chat_id, message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(text, tags)| Ok((text, decode_tags(&tags)?)))
            .transpose()
    }

    #[cfg(test)]
    pub async fn stored_reply_to(&self, chat_id: i64, message_id: i32) -> Result<Option<i32>> {
        let conn = self.conn.lock().await;
        Ok(conn.query_row(
            "SELECT reply_to FROM messages WHERE chat_id = ?1 AND message_id = ?2",
            rusqlite::params![chat_id, message_id],
            |row| row.get(0),
        )?)
    }

    #[cfg(test)]
    pub async fn count_messages(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        Ok(conn.query_row("SELECT count(*) FROM messages", [], |row| row.get(0))?)
    }
}

fn upsert_chat_and_author(tx: &Transaction<'_>, entry: &Entry) -> Result<()> {
    tx.execute(
        "INSERT INTO chats (chat_id, platform, name) VALUES (?1, ?2, ?3)
         ON CONFLICT (chat_id) DO UPDATE SET name = excluded.name",
        rusqlite::params![entry.chat.id, &entry.chat.platform, &entry.chat.name],
    )
    .context("Failed to save chat")?;

    tx.execute(
        "INSERT INTO authors (author_id, first, last, username) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (author_id) DO UPDATE SET
            first = excluded.first, last = excluded.last, username = excluded.username",
        rusqlite::params![
            entry.author.id,
            &entry.author.first,
            &entry.author.last,
            &entry.author.username,
        ],
    )
    .context("Failed to save author")?;

    Ok(())
}

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode tags")
}

fn decode_tags(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).with_context(|| format!("Corrupt tags column: {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Chat, Message};

    fn entry(id: i32, text: &str, tags: &[&str]) -> Entry {
        Entry {
            message: Message {
                id,
                date: 1_600_000_000,
                text: text.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                reply_to: None,
            },
            author: Author {
                id: 77,
                first: "Grace".to_string(),
                last: "Hopper".to_string(),
                username: "grace".to_string(),
            },
            chat: Chat {
                id: -500,
                platform: "telegram".to_string(),
                name: "Research".to_string(),
            },
            command: None,
        }
    }

    #[tokio::test]
    async fn test_save_returns_text() {
        let store = Store::open_in_memory().unwrap();
        let text = store.save_message(&entry(10, "#a51 hello", &["#a51"])).await.unwrap();
        assert_eq!(text, "#a51 hello");

        let (stored, tags) = store.load_message(-500, 10).await.unwrap().unwrap();
        assert_eq!(stored, "#a51 hello");
        assert_eq!(tags, vec!["#a51"]);
    }

    #[tokio::test]
    async fn test_save_keeps_reply_reference() {
        let store = Store::open_in_memory().unwrap();
        let mut e = entry(11, "#a51 answer", &["#a51"]);
        e.message.reply_to = Some(9);
        store.save_message(&e).await.unwrap();
        store.save_message(&entry(12, "#a51 plain", &["#a51"])).await.unwrap();

        assert_eq!(store.stored_reply_to(-500, 11).await.unwrap(), Some(9));
        assert_eq!(store.stored_reply_to(-500, 12).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replay_keeps_single_row() {
        let store = Store::open_in_memory().unwrap();
        let e = entry(10, "#a51 hello", &["#a51"]);
        store.save_message(&e).await.unwrap();
        let second = store.save_message(&e).await.unwrap();

        assert_eq!(second, "#a51 hello");
        assert_eq!(store.count_messages().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_does_not_overwrite_existing_text() {
        let store = Store::open_in_memory().unwrap();
        store.save_message(&entry(10, "first", &[])).await.unwrap();
        let text = store.save_message(&entry(10, "changed", &[])).await.unwrap();
        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn test_append_joins_with_separator() {
        let store = Store::open_in_memory().unwrap();
        store.save_message(&entry(100, "first", &["#a51"])).await.unwrap();

        let text = store
            .append_message(&entry(101, "second", &["#more"]), 100)
            .await
            .unwrap();
        assert_eq!(text, "first ➜ second");

        let (_, tags) = store.load_message(-500, 100).await.unwrap().unwrap();
        assert_eq!(tags, vec!["#a51", "#more"]);
        assert!(store.load_message(-500, 101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_twice_appends_twice() {
        let store = Store::open_in_memory().unwrap();
        store.save_message(&entry(100, "first", &[])).await.unwrap();

        let e = entry(101, "second", &[]);
        store.append_message(&e, 100).await.unwrap();
        let text = store.append_message(&e, 100).await.unwrap();
        assert_eq!(text, "first ➜ second ➜ second");
    }

    #[tokio::test]
    async fn test_append_to_missing_target_creates_it() {
        let store = Store::open_in_memory().unwrap();
        let text = store.append_message(&entry(6, "orphan", &[]), 5).await.unwrap();
        assert_eq!(text, "orphan");
        assert!(store.load_message(-500, 5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_previous_exists() {
        let store = Store::open_in_memory().unwrap();
        store.save_message(&entry(100, "first", &[])).await.unwrap();
        assert!(store.previous_exists(&entry(101, "x", &[])).await.unwrap());
        assert!(!store.previous_exists(&entry(100, "x", &[])).await.unwrap());
    }
}
