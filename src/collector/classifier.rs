//! Tag and command extraction from message entities.
//!
//! Telegram reports entity offsets and lengths in UTF-16 code units, so the
//! text is sliced in that encoding rather than by byte index.

use crate::model::{Command, TRIGGER_TAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Hashtag,
    BotCommand,
}

/// An entity span as reported by the platform, in UTF-16 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpan {
    pub kind: SpanKind,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub command: Option<Command>,
    /// Unique tags, verbatim.
    pub tags: Vec<String>,
}

impl Classification {
    pub fn has_trigger(&self) -> bool {
        self.tags.iter().any(|t| t == TRIGGER_TAG)
    }

    /// Messages with neither tags nor a command carry nothing to collect.
    pub fn is_of_interest(&self) -> bool {
        self.command.is_some() || !self.tags.is_empty()
    }
}

/// Extract at most one command (the first command span) and every distinct hashtag.
pub fn classify(text: &str, spans: &[EntitySpan]) -> Classification {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut result = Classification::default();

    for span in spans {
        let Some(end) = span.offset.checked_add(span.length) else {
            continue;
        };
        let Some(slice) = units.get(span.offset..end) else {
            continue;
        };

        match span.kind {
            SpanKind::Hashtag => {
                let tag = String::from_utf16_lossy(slice);
                if !result.tags.contains(&tag) {
                    result.tags.push(tag);
                }
            }
            SpanKind::BotCommand if result.command.is_none() => {
                let params = String::from_utf16_lossy(&units[end..]);
                result.command = parse_command(&String::from_utf16_lossy(slice), &params);
            }
            SpanKind::BotCommand => {}
        }
    }

    result
}

/// `/name@receiver` → Command. Returns None for a bare "/".
fn parse_command(raw: &str, trailing: &str) -> Option<Command> {
    let body = raw.strip_prefix('/').unwrap_or(raw);
    let (name, receiver) = match body.split_once('@') {
        Some((name, receiver)) => (name, Some(receiver.to_string())),
        None => (body, None),
    };

    if name.is_empty() {
        return None;
    }

    Some(Command {
        name: name.to_string(),
        receiver: receiver.filter(|r| !r.is_empty()),
        params: trailing.trim().to_string(),
    })
}
