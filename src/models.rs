//! Records shared between ingestion, the store and the query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical shape of one message after normalization, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub chat_jid: String,
    pub id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    /// Empty for media-only or otherwise text-less messages.
    pub content: String,
    pub is_from_me: bool,
    pub media_type: Option<String>,
    /// Best-effort display name for the owning chat.
    pub chat_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    pub chat_name: Option<String>,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    pub name: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

/// Query-time projection over senders and chats; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    pub name: Option<String>,
    pub jid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub before: Vec<Message>,
    pub after: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWithContext {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextWindow>,
}

/// Result of `get_message_context`: both sides ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    pub target: Message,
    pub before: Vec<Message>,
    pub after: Vec<Message>,
}

/// Splits the phone-like user part out of a chat key or sender id.
///
/// `15551234567@s.whatsapp.net` and `15551234567:12@s.whatsapp.net` both
/// yield `15551234567`; a bare id is returned unchanged.
pub fn phone_part(jid: &str) -> &str {
    let user = jid.split('@').next().unwrap_or(jid);
    user.split(':').next().unwrap_or(user)
}
