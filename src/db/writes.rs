use rusqlite::{params, Connection, TransactionBehavior};

use super::{format_sqlite_utc, StoreError};
use crate::models::MessageRecord;

/// Keeps a known name unless a non-empty one arrives, and only moves
/// `last_message_time` forward.
const UPSERT_CHAT: &str = "
    INSERT INTO chats (jid, name, last_message_time) VALUES (?1, ?2, ?3)
    ON CONFLICT(jid) DO UPDATE SET
        name = CASE
            WHEN excluded.name IS NOT NULL AND excluded.name <> '' THEN excluded.name
            ELSE chats.name
        END,
        last_message_time = CASE
            WHEN chats.last_message_time IS NULL
              OR excluded.last_message_time > chats.last_message_time
            THEN excluded.last_message_time
            ELSE chats.last_message_time
        END";

/// Replays are no-ops for identical content. An empty incoming body never
/// replaces stored text, so a text-less backfill copy cannot erase what a
/// live event delivered.
const UPSERT_MESSAGE: &str = "
    INSERT INTO messages (id, chat_jid, sender, content, timestamp, is_from_me, media_type)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id, chat_jid) DO UPDATE SET
        sender = excluded.sender,
        timestamp = excluded.timestamp,
        is_from_me = excluded.is_from_me,
        content = CASE
            WHEN excluded.content <> '' THEN excluded.content
            ELSE messages.content
        END,
        media_type = COALESCE(excluded.media_type, messages.media_type)";

/// Writes the chat row then the message row inside one immediate
/// transaction. Any error drops the transaction, which rolls both back.
pub fn write_record(conn: &mut Connection, record: &MessageRecord) -> Result<(), StoreError> {
    let ts = format_sqlite_utc(&record.timestamp);
    let name = record
        .chat_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(UPSERT_CHAT, params![record.chat_jid, name, ts])?;
    tx.execute(
        UPSERT_MESSAGE,
        params![
            record.id,
            record.chat_jid,
            record.sender,
            record.content,
            ts,
            record.is_from_me,
            record.media_type,
        ],
    )?;
    tx.commit()?;
    Ok(())
}
