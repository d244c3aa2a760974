//! Webhook payload decoding.
//!
//! Only the subset of the Bot API `Update` object the collector reads is
//! modelled; unknown fields are ignored.

use serde::Deserialize;

use crate::collector::classifier::{EntitySpan, SpanKind};
use crate::model::{Author, Chat, JOIN_SEPARATOR, PLATFORM_TELEGRAM};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub edited_message: Option<TgMessage>,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
    #[serde(default)]
    pub edited_channel_post: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i32,
    pub date: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<TgEntity>,
    #[serde(default)]
    pub caption_entities: Vec<TgEntity>,
    #[serde(default)]
    pub forward_from_chat: Option<TgChat>,
    #[serde(default)]
    pub forward_from_message_id: Option<i32>,
    #[serde(default)]
    pub reply_to_message: Option<ReplyRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRef {
    pub message_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

/// Which of the four message-bearing update shapes an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
}

impl UpdateKind {
    pub fn is_edit(&self) -> bool {
        matches!(self, UpdateKind::EditedMessage | UpdateKind::EditedChannelPost)
    }
}

/// A single normalized message resolved from an `Update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub update_id: i64,
    pub kind: UpdateKind,
    pub message_id: i32,
    pub date: i64,
    /// Text the entity offsets refer to.
    pub text: String,
    pub entities: Vec<EntitySpan>,
    /// Public link of the channel post this message forwards, if any.
    pub forwarded_link: Option<String>,
    pub reply_to: Option<i32>,
    pub author: Author,
    pub chat: Chat,
}

impl InboundEvent {
    pub fn is_edit(&self) -> bool {
        self.kind.is_edit()
    }

    /// Text persisted and broadcast: the message text plus the forwarded-post link.
    pub fn text_to_save(&self) -> String {
        let parts: Vec<&str> = [Some(self.text.as_str()), self.forwarded_link.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        parts.join(JOIN_SEPARATOR)
    }
}

impl Update {
    /// Resolve the effective message: message, edited message, channel post,
    /// then edited channel post; the first present wins.
    pub fn into_event(self) -> Option<InboundEvent> {
        let update_id = self.update_id;
        let (kind, msg) = [
            (UpdateKind::Message, self.message),
            (UpdateKind::EditedMessage, self.edited_message),
            (UpdateKind::ChannelPost, self.channel_post),
            (UpdateKind::EditedChannelPost, self.edited_channel_post),
        ]
        .into_iter()
        .find_map(|(kind, msg)| msg.map(|m| (kind, m)))?;

        Some(msg.into_event(update_id, kind))
    }
}

impl TgMessage {
    fn into_event(self, update_id: i64, kind: UpdateKind) -> InboundEvent {
        // Media messages carry their text and entities in the caption.
        let (text, entities) = match self.text {
            Some(text) => (text, self.entities),
            None => (self.caption.unwrap_or_default(), self.caption_entities),
        };

        let author = match self.from {
            Some(user) => Author {
                id: user.id,
                first: user.first_name,
                last: user.last_name.unwrap_or_default(),
                username: user.username.unwrap_or_default(),
            },
            None => Author::for_channel(
                self.chat.title.as_deref().unwrap_or_default(),
                self.chat.username.as_deref().unwrap_or_default(),
            ),
        };

        let forwarded_link = match (&self.forward_from_chat, self.forward_from_message_id) {
            (Some(origin), Some(id)) if origin.chat_type == "channel" => origin
                .username
                .as_deref()
                .map(|name| format!("https://t.me/{}/{}", name, id)),
            _ => None,
        };

        InboundEvent {
            update_id,
            kind,
            message_id: self.message_id,
            date: self.date,
            text,
            entities: entities.iter().filter_map(TgEntity::to_span).collect(),
            forwarded_link,
            reply_to: self.reply_to_message.map(|r| r.message_id),
            author,
            chat: self.chat.to_chat(),
        }
    }
}

impl TgChat {
    fn display_name(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return username.to_string();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_chat(&self) -> Chat {
        Chat {
            id: self.id,
            platform: PLATFORM_TELEGRAM.to_string(),
            name: self.display_name(),
        }
    }
}

impl TgEntity {
    fn to_span(&self) -> Option<EntitySpan> {
        let kind = match self.kind.as_str() {
            "hashtag" => SpanKind::Hashtag,
            "bot_command" => SpanKind::BotCommand,
            _ => return None,
        };
        Some(EntitySpan {
            kind,
            offset: self.offset,
            length: self.length,
        })
    }
}
