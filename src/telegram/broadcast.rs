use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    types::{ChatId, MessageId, ReplyParameters},
};
use tracing::debug;

use crate::collector::Broadcaster;

/// Broadcast channel client on top of the Bot API.
pub struct TelegramBroadcaster {
    bot: Bot,
    channel: ChatId,
}

impl TelegramBroadcaster {
    pub fn new(bot: Bot, channel_id: i64) -> Self {
        Self {
            bot,
            channel: ChatId(channel_id),
        }
    }
}

#[async_trait]
impl Broadcaster for TelegramBroadcaster {
    async fn send(&self, text: &str) -> Result<i32> {
        let sent = self
            .bot
            .send_message(self.channel, text)
            .await
            .context("Failed to send broadcast")?;
        debug!(broadcast_id = sent.id.0, "broadcast sent");
        Ok(sent.id.0)
    }

    async fn reply(&self, text: &str, target_broadcast_id: i32) -> Result<i32> {
        let sent = self
            .bot
            .send_message(self.channel, text)
            .reply_parameters(
                ReplyParameters::new(MessageId(target_broadcast_id)).allow_sending_without_reply(),
            )
            .await
            .with_context(|| format!("Failed to reply to broadcast {}", target_broadcast_id))?;
        debug!(
            broadcast_id = sent.id.0,
            target = target_broadcast_id,
            "reply broadcast sent"
        );
        Ok(sent.id.0)
    }

    async fn edit(&self, broadcast_id: i32, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(self.channel, MessageId(broadcast_id), text)
            .await
            .with_context(|| format!("Failed to edit broadcast {}", broadcast_id))?;
        Ok(())
    }

    async fn delete(&self, broadcast_id: i32) -> Result<()> {
        self.bot
            .delete_message(self.channel, MessageId(broadcast_id))
            .await
            .with_context(|| format!("Failed to delete broadcast {}", broadcast_id))?;
        Ok(())
    }

    async fn forward(&self, source_chat_id: i64, source_message_id: i32) -> Result<i32> {
        let forwarded = self
            .bot
            .forward_message(self.channel, ChatId(source_chat_id), MessageId(source_message_id))
            .await
            .with_context(|| {
                format!(
                    "Failed to forward message {} from chat {}",
                    source_message_id, source_chat_id
                )
            })?;
        Ok(forwarded.id.0)
    }

    async fn answer(&self, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply())
            .await
            .with_context(|| format!("Failed to answer in chat {}", chat_id))?;
        Ok(())
    }
}
