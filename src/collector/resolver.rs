//! Continuation detection.
//!
//! A message continues the one before it when the stored message with id
//! `id - 1` in the same chat has the same author and the same date. Telegram
//! splits long pastes into consecutive messages sharing one timestamp, and
//! this adjacency is the only join condition used.

use anyhow::Result;
use tracing::debug;

use super::MessageStore;
use crate::model::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub is_continuation: bool,
    /// Message id the event applies to: `id - 1` for a continuation, else its own id.
    pub target: i32,
}

pub async fn resolve(store: &dyn MessageStore, entry: &Entry) -> Result<Resolution> {
    let id = entry.message.id;
    let is_continuation = id > 1 && store.check_connected(entry).await?;

    if is_continuation {
        debug!(
            chat_id = entry.chat.id,
            message_id = id,
            "message continues {}",
            id - 1
        );
    }

    Ok(Resolution {
        is_continuation,
        target: if is_continuation { id - 1 } else { id },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Chat, Message};
    use crate::store::Store;

    fn entry(id: i32, author_id: i64, date: i64, chat_id: i64) -> Entry {
        Entry {
            message: Message {
                id,
                date,
                text: format!("text {}", id),
                tags: vec![],
                reply_to: None,
            },
            author: Author {
                id: author_id,
                first: "A".to_string(),
                last: String::new(),
                username: String::new(),
            },
            chat: Chat {
                id: chat_id,
                platform: "telegram".to_string(),
                name: "chat".to_string(),
            },
            command: None,
        }
    }

    #[tokio::test]
    async fn test_adjacent_message_is_continuation() {
        let store = Store::open_in_memory().unwrap();
        store.save(&entry(100, 1, 5000, -10)).await.unwrap();

        let r = resolve(&store, &entry(101, 1, 5000, -10)).await.unwrap();
        assert!(r.is_continuation);
        assert_eq!(r.target, 100);
    }

    #[tokio::test]
    async fn test_gap_in_ids_is_not_continuation() {
        let store = Store::open_in_memory().unwrap();
        store.save(&entry(100, 1, 5000, -10)).await.unwrap();

        let r = resolve(&store, &entry(102, 1, 5000, -10)).await.unwrap();
        assert!(!r.is_continuation);
        assert_eq!(r.target, 102);
    }

    #[tokio::test]
    async fn test_each_join_field_must_match() {
        let store = Store::open_in_memory().unwrap();
        store.save(&entry(100, 1, 5000, -10)).await.unwrap();

        for candidate in [
            entry(101, 2, 5000, -10),
            entry(101, 1, 5001, -10),
            entry(101, 1, 5000, -11),
        ] {
            let r = resolve(&store, &candidate).await.unwrap();
            assert!(!r.is_continuation, "unexpected match for {:?}", candidate);
        }
    }

    #[tokio::test]
    async fn test_first_message_never_continues() {
        let store = Store::open_in_memory().unwrap();
        let r = resolve(&store, &entry(1, 1, 5000, -10)).await.unwrap();
        assert!(!r.is_continuation);
        assert_eq!(r.target, 1);
    }
}
