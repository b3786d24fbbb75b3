//! Raw events as emitted by the protocol client, and a reader that turns a
//! newline-delimited JSON stream of them into a channel.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    Message(RawMessage),
    HistorySync(RawHistoryBatch),
    Connection(ConnectionEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// The session was invalidated remotely and cannot be resumed.
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub state: ConnectionState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    pub id: Option<String>,
    pub chat_jid: Option<String>,
    pub sender: Option<String>,
    pub push_name: Option<String>,
    pub chat_name: Option<String>,
    /// Unix seconds.
    pub timestamp: Option<i64>,
    pub is_from_me: bool,
    pub content: RawContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContent {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub image: Option<RawMedia>,
    pub video: Option<RawMedia>,
    pub audio: Option<RawMedia>,
    pub document: Option<RawMedia>,
    pub sticker: Option<RawMedia>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMedia {
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHistoryBatch {
    pub conversations: Vec<RawConversation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConversation {
    pub chat_jid: Option<String>,
    pub name: Option<String>,
    pub messages: Vec<RawMessage>,
}

/// Reads one JSON event per line and forwards it. Lines that do not parse are
/// skipped with a warning. Returns the number of events forwarded once the
/// input ends or the receiving side goes away.
pub async fn forward_json_lines<R>(reader: R, tx: mpsc::Sender<ProtocolEvent>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0usize;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event: ProtocolEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!("Event stream: discarding malformed event on line {}: {}", line_no, e);
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            debug!("Event stream: receiver closed, stopping at line {}", line_no);
            break;
        }
        forwarded += 1;
    }

    info!("Event stream: forwarded {} events", forwarded);
    Ok(forwarded)
}
