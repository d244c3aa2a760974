use serde::{Deserialize, Serialize};

/// Hashtag that marks a message for collection.
pub const TRIGGER_TAG: &str = "#a51";

/// Separator placed between the stored text and an appended continuation.
pub const JOIN_SEPARATOR: &str = " ➜ ";

pub const PLATFORM_TELEGRAM: &str = "telegram";

pub const COMMAND_FOLLOW: &str = "follow";
pub const COMMAND_UNFOLLOW: &str = "unfollow";
pub const COMMAND_WHOAMI: &str = "whoami";

/// What the collector does with a non-command event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Save,
    /// Concatenate onto the stored message `target`.
    Append { target: i32 },
    Edit,
    Ignore,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Save => write!(f, "save"),
            Action::Append { target } => write!(f, "append(target={})", target),
            Action::Edit => write!(f, "edit"),
            Action::Ignore => write!(f, "ignore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Chat-scoped message id.
    pub id: i32,
    /// Unix seconds.
    pub date: i64,
    pub text: String,
    /// Unique hashtags, in extraction order.
    pub tags: Vec<String>,
    pub reply_to: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub platform: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub first: String,
    pub last: String,
    pub username: String,
}

impl Author {
    /// Stand-in author for channel posts, which carry no sender.
    pub fn for_channel(chat_title: &str, chat_username: &str) -> Self {
        Self {
            id: 0,
            first: chat_title.to_string(),
            last: String::new(),
            username: chat_username.to_string(),
        }
    }

    pub fn whoami(&self) -> String {
        format!(
            "Name: {} {}\nUsername: {}\nID: {}",
            self.first, self.last, self.username, self.id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    /// Bot handle from `/name@handle`, if addressed.
    pub receiver: Option<String>,
    /// Raw text following the command, trimmed.
    pub params: String,
}

impl Command {
    /// True when the command names a different bot than `bot_username`.
    pub fn addressed_elsewhere(&self, bot_username: &str) -> bool {
        self.receiver
            .as_deref()
            .is_some_and(|r| !r.eq_ignore_ascii_case(bot_username.trim_start_matches('@')))
    }
}

/// One normalized inbound message together with who sent it and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub message: Message,
    pub author: Author,
    pub chat: Chat,
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    pub chat_id: i64,
    pub author_id: i64,
    pub follow: bool,
}

/// Identity of a source message: (message id, chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub message_id: i32,
    pub chat_id: i64,
}

impl SourceKey {
    pub fn new(message_id: i32, chat_id: i64) -> Self {
        Self {
            message_id,
            chat_id,
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Broadcast produced by SAVE.
    Origin,
    /// Reply broadcast produced by APPEND.
    Reply,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Origin => "origin",
            LinkKind::Reply => "reply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "origin" => Some(LinkKind::Origin),
            "reply" => Some(LinkKind::Reply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastLink {
    pub source: SourceKey,
    pub kind: LinkKind,
    pub broadcast_id: i32,
}
