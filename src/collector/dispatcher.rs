//! Per-event pipeline: classify, gate, resolve, decide, then apply side effects.
//!
//! Side effects run in order and the first failure aborts the rest of the
//! event. Nothing already written is rolled back; a redelivered event
//! re-applies the idempotent steps and retries the failed one.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::access::AccessControl;
use super::classifier::{classify, Classification};
use super::decider::decide;
use super::resolver::{resolve, Resolution};
use super::{Broadcaster, MessageStore};
use crate::config::BroadcastMode;
use crate::model::{
    Action, BroadcastLink, Command, Entry, LinkKind, Message, SourceKey, COMMAND_FOLLOW,
    COMMAND_UNFOLLOW, COMMAND_WHOAMI,
};
use crate::telegram::update::{InboundEvent, Update};

/// Acknowledgment returned to the webhook caller for every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub status: u16,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
        }
    }

    /// The payload could not be decoded; it is dropped, not retried.
    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self {
            status: 406,
            message: message.into(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    broadcaster: Arc<dyn Broadcaster>,
    access: AccessControl,
    bot_username: String,
    mode: BroadcastMode,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        broadcaster: Arc<dyn Broadcaster>,
        access: AccessControl,
        bot_username: &str,
        mode: BroadcastMode,
    ) -> Self {
        Self {
            store,
            broadcaster,
            access,
            bot_username: bot_username.to_string(),
            mode,
        }
    }

    pub async fn handle(&self, update: Update) -> Ack {
        let update_id = update.update_id;
        match update.into_event() {
            Some(event) => self.handle_event(event).await,
            None => {
                debug!(update_id, "update carries no message");
                Ack::ok("Nothing to process")
            }
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Ack {
        let classification = classify(&event.text, &event.entities);
        let is_edit = event.is_edit();
        let entry = Entry {
            message: Message {
                id: event.message_id,
                date: event.date,
                text: event.text_to_save(),
                tags: classification.tags.clone(),
                reply_to: event.reply_to,
            },
            author: event.author,
            chat: event.chat,
            command: classification.command.clone(),
        };

        if let Some(command) = &entry.command {
            return self.handle_command(command, &entry).await;
        }

        if !self.access.is_chat_followed(entry.chat.id) {
            debug!(chat_id = entry.chat.id, "chat is not followed");
            return Ack::ok("OK");
        }

        // Edits skip the continuation lookup, so without tags there is nothing to match on.
        if is_edit && !classification.is_of_interest() {
            debug!(
                chat_id = entry.chat.id,
                message_id = entry.message.id,
                "edit of message without tags"
            );
            return Ack::ok("OK");
        }

        match self.process(&entry, is_edit, &classification).await {
            Ok(action) => {
                debug!(
                    chat_id = entry.chat.id,
                    message_id = entry.message.id,
                    %action,
                    "event processed"
                );
                Ack::ok("OK")
            }
            Err(e) => {
                error!(
                    chat_id = entry.chat.id,
                    message_id = entry.message.id,
                    "Error processing message: {:#}",
                    e
                );
                Ack::server_error("Error processing message")
            }
        }
    }

    async fn process(
        &self,
        entry: &Entry,
        is_edit: bool,
        classification: &Classification,
    ) -> Result<Action> {
        let resolution = if is_edit {
            Resolution {
                is_continuation: false,
                target: entry.message.id,
            }
        } else {
            resolve(self.store.as_ref(), entry).await?
        };

        let action = decide(is_edit, classification, &resolution);
        match action {
            Action::Save => self.save(entry).await?,
            Action::Append { target } => self.append(entry, target).await?,
            Action::Edit => self.edit(entry).await?,
            Action::Ignore => {}
        }
        Ok(action)
    }

    async fn save(&self, entry: &Entry) -> Result<()> {
        let text = self.store.save(entry).await?;
        let source = SourceKey::new(entry.message.id, entry.chat.id);

        if let Some(existing) = self
            .store
            .find_broadcast_link_of_kind(&source, LinkKind::Origin)
            .await?
        {
            debug!(%source, broadcast_id = existing.broadcast_id, "already broadcast");
            return Ok(());
        }

        let broadcast_id = match self.mode {
            BroadcastMode::Forward => {
                self.broadcaster
                    .forward(entry.chat.id, entry.message.id)
                    .await?
            }
            BroadcastMode::Send => self.broadcaster.send(&text).await?,
        };

        self.store
            .log_broadcast_link(&BroadcastLink {
                source,
                kind: LinkKind::Origin,
                broadcast_id,
            })
            .await?;

        info!(%source, broadcast_id, "message collected");
        Ok(())
    }

    /// One live reply per thread: a previous reply is deleted before the new one is posted.
    /// In forward mode the source is forwarded again so the reply follows a fresh copy.
    async fn append(&self, entry: &Entry, target: i32) -> Result<()> {
        let text = self.store.append(entry, target).await?;
        let source = SourceKey::new(target, entry.chat.id);

        let origin = self
            .store
            .find_broadcast_link_of_kind(&source, LinkKind::Origin)
            .await?
            .ok_or_else(|| anyhow!("No broadcast recorded for {}", source))?;

        let mut reply_target = origin.broadcast_id;

        if let Some(previous) = self
            .store
            .find_broadcast_link_of_kind(&source, LinkKind::Reply)
            .await?
        {
            // A redelivery after a failed reply finds the old reply already gone.
            if let Err(e) = self.broadcaster.delete(previous.broadcast_id).await {
                warn!(
                    %source,
                    broadcast_id = previous.broadcast_id,
                    "Previous reply could not be deleted: {:#}",
                    e
                );
            }

            if self.mode == BroadcastMode::Forward {
                let forwarded = self.broadcaster.forward(entry.chat.id, target).await?;
                self.store
                    .log_broadcast_link(&BroadcastLink {
                        source,
                        kind: LinkKind::Origin,
                        broadcast_id: forwarded,
                    })
                    .await?;
                reply_target = forwarded;
            }
        }

        let reply_id = self.broadcaster.reply(&text, reply_target).await?;
        self.store
            .log_broadcast_link(&BroadcastLink {
                source,
                kind: LinkKind::Reply,
                broadcast_id: reply_id,
            })
            .await?;

        info!(%source, broadcast_id = reply_id, "continuation appended");
        Ok(())
    }

    /// Forwarded copies can not be edited, so in forward mode only replies are.
    async fn edit(&self, entry: &Entry) -> Result<()> {
        let source = SourceKey::new(entry.message.id, entry.chat.id);
        let link = match self.mode {
            BroadcastMode::Send => self.store.find_broadcast_link(&source).await?,
            BroadcastMode::Forward => {
                self.store
                    .find_broadcast_link_of_kind(&source, LinkKind::Reply)
                    .await?
            }
        };

        let Some(link) = link else {
            let forwarded = self.mode == BroadcastMode::Forward
                && self
                    .store
                    .find_broadcast_link_of_kind(&source, LinkKind::Origin)
                    .await?
                    .is_some();
            if forwarded {
                info!(%source, "forwarded broadcast left unedited");
                return Ok(());
            }
            return Err(anyhow!("No broadcast recorded for edited message {}", source));
        };

        self.broadcaster
            .edit(link.broadcast_id, &entry.message.text)
            .await?;

        info!(%source, broadcast_id = link.broadcast_id, "broadcast edited");
        Ok(())
    }

    async fn handle_command(&self, command: &Command, entry: &Entry) -> Ack {
        if command.addressed_elsewhere(&self.bot_username) {
            debug!(
                command = %command.name,
                receiver = ?command.receiver,
                "command addressed to another bot"
            );
            return Ack::ok("OK");
        }

        match command.name.as_str() {
            COMMAND_FOLLOW | COMMAND_UNFOLLOW => {
                if !self.access.is_admin(entry.author.id) {
                    info!(
                        author_id = entry.author.id,
                        chat_id = entry.chat.id,
                        "follow command from non-admin ignored"
                    );
                    return Ack::ok("OK");
                }

                let follow = command.name == COMMAND_FOLLOW;
                match self
                    .access
                    .set_chat_follow(entry.chat.id, entry.author.id, follow)
                    .await
                {
                    Ok(()) => {
                        info!(
                            chat_id = entry.chat.id,
                            chat = %entry.chat.name,
                            follow,
                            "chat allowance updated"
                        );
                        Ack::ok("OK")
                    }
                    Err(e) => {
                        error!("follow/unfollow chat command error: {:#}", e);
                        Ack::server_error("Can not follow/unfollow this chat")
                    }
                }
            }
            COMMAND_WHOAMI => {
                match self
                    .broadcaster
                    .answer(entry.chat.id, entry.message.id, &entry.author.whoami())
                    .await
                {
                    Ok(()) => Ack::ok("OK"),
                    Err(e) => {
                        error!("Error sending whoami response: {:#}", e);
                        Ack::server_error("Error sending `whoami` message")
                    }
                }
            }
            other => {
                debug!(command = other, "unknown command");
                Ack::ok("OK")
            }
        }
    }
}
