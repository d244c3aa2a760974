pub mod access;
pub mod classifier;
pub mod decider;
pub mod dispatcher;
pub mod resolver;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Allowance, BroadcastLink, Entry, LinkKind, SourceKey};

/// Durable store of collected messages, broadcast links and chat allowances.
///
/// Every write is an upsert by natural key so a redelivered event converges
/// on the same rows instead of duplicating them.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Upsert chat, author and message; returns the message text as stored.
    ///
    /// When the message id already exists the stored text is kept unchanged.
    async fn save(&self, entry: &Entry) -> Result<String>;

    /// Concatenate `entry`'s text onto stored message `target` of the same chat,
    /// returning the joined text. Not idempotent: each call appends once.
    async fn append(&self, entry: &Entry, target: i32) -> Result<String>;

    /// True if message `id - 1` exists in the same chat, by the same author, with the same date.
    async fn check_connected(&self, entry: &Entry) -> Result<bool>;

    /// Upsert the link for (source, kind), marking it the most recent for its source.
    async fn log_broadcast_link(&self, link: &BroadcastLink) -> Result<()>;

    /// Most recently written link for the source, of any kind.
    async fn find_broadcast_link(&self, source: &SourceKey) -> Result<Option<BroadcastLink>>;

    async fn find_broadcast_link_of_kind(
        &self,
        source: &SourceKey,
        kind: LinkKind,
    ) -> Result<Option<BroadcastLink>>;

    async fn load_allowances(&self) -> Result<Vec<Allowance>>;

    async fn set_chat_follow(&self, allowance: &Allowance) -> Result<()>;
}

/// Outbound operations against the broadcast channel.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send(&self, text: &str) -> Result<i32>;

    async fn reply(&self, text: &str, target_broadcast_id: i32) -> Result<i32>;

    async fn edit(&self, broadcast_id: i32, text: &str) -> Result<()>;

    async fn delete(&self, broadcast_id: i32) -> Result<()>;

    async fn forward(&self, source_chat_id: i64, source_message_id: i32) -> Result<i32>;

    /// Reply inside the source chat rather than the broadcast channel.
    async fn answer(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()>;
}
