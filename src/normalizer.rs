//! Turns raw protocol events into canonical [`MessageRecord`]s.

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::warn;

use crate::models::MessageRecord;
use crate::protocol::events::{RawContent, RawMessage};
use crate::protocol::{ConnectionState, ProtocolEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("event has no chat key")]
    MissingChatKey,
    #[error("event has no message id")]
    MissingMessageId,
    #[error("event has no timestamp")]
    MissingTimestamp,
    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Live(MessageRecord),
    Backfill(Vec<MessageRecord>),
    Connection(ConnectionState),
}

pub struct Normalizer {
    group_suffix: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Normalizer {
    pub fn new(group_suffix: impl Into<String>) -> Self {
        Self {
            group_suffix: group_suffix.into(),
        }
    }

    fn is_group(&self, jid: &str) -> bool {
        jid.rsplit_once('@')
            .map_or(false, |(_, domain)| domain == self.group_suffix)
    }

    /// Normalizes one event. Malformed messages are logged and dropped; in a
    /// history batch only the offending message is lost.
    pub fn normalize(&self, event: ProtocolEvent) -> Option<Normalized> {
        match event {
            ProtocolEvent::Message(raw) => match self.normalize_message(&raw, None, None) {
                Ok(record) => Some(Normalized::Live(record)),
                Err(e) => {
                    warn!(
                        "Normalizer: discarding live message {:?}: {}",
                        raw.id.as_deref().unwrap_or("<no id>"),
                        e
                    );
                    None
                }
            },
            ProtocolEvent::HistorySync(batch) => {
                let mut records = Vec::new();
                for conversation in &batch.conversations {
                    let chat_jid = non_empty(conversation.chat_jid.as_deref());
                    let name = non_empty(conversation.name.as_deref());
                    for raw in &conversation.messages {
                        match self.normalize_message(raw, chat_jid, name) {
                            Ok(record) => records.push(record),
                            Err(e) => warn!(
                                "Normalizer: discarding history message {:?} in {:?}: {}",
                                raw.id.as_deref().unwrap_or("<no id>"),
                                chat_jid.unwrap_or("<no chat>"),
                                e
                            ),
                        }
                    }
                }
                Some(Normalized::Backfill(records))
            }
            ProtocolEvent::Connection(conn) => Some(Normalized::Connection(conn.state)),
        }
    }

    /// `fallback_chat` and `fallback_name` come from the enclosing history
    /// conversation when there is one.
    pub fn normalize_message(
        &self,
        raw: &RawMessage,
        fallback_chat: Option<&str>,
        fallback_name: Option<&str>,
    ) -> Result<MessageRecord, NormalizeError> {
        let chat_jid = non_empty(raw.chat_jid.as_deref())
            .or(fallback_chat)
            .ok_or(NormalizeError::MissingChatKey)?
            .to_string();
        let id = non_empty(raw.id.as_deref())
            .ok_or(NormalizeError::MissingMessageId)?
            .to_string();
        let secs = raw.timestamp.ok_or(NormalizeError::MissingTimestamp)?;
        // Stored as fixed-width text, so only four-digit years keep their order.
        let timestamp: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
            .filter(|ts| (0..=9999).contains(&ts.year()))
            .ok_or(NormalizeError::InvalidTimestamp(secs))?;

        let sender = non_empty(raw.sender.as_deref())
            .unwrap_or(&chat_jid)
            .to_string();
        let (content, media_type) = extract_content(&raw.content);

        let chat_name = non_empty(raw.chat_name.as_deref())
            .or(fallback_name)
            .or_else(|| {
                if raw.is_from_me || self.is_group(&chat_jid) {
                    None
                } else {
                    non_empty(raw.push_name.as_deref())
                }
            })
            .map(str::to_string);

        Ok(MessageRecord {
            chat_jid,
            id,
            sender,
            timestamp,
            content,
            is_from_me: raw.is_from_me,
            media_type,
            chat_name,
        })
    }
}

/// Text in priority order: plain body, extended text, media caption. A
/// message with none of these keeps an empty body.
fn extract_content(content: &RawContent) -> (String, Option<String>) {
    let media = [
        ("image", &content.image),
        ("video", &content.video),
        ("audio", &content.audio),
        ("document", &content.document),
        ("sticker", &content.sticker),
    ]
    .into_iter()
    .find_map(|(kind, media)| media.as_ref().map(|m| (kind, m)));

    let text = content
        .conversation
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(content.extended_text.as_deref().filter(|t| !t.is_empty()))
        .or(media.and_then(|(_, m)| m.caption.as_deref()))
        .unwrap_or_default()
        .to_string();

    (text, media.map(|(kind, _)| kind.to_string()))
}
