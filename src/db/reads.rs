//! Read-side SQL. Messages are ordered by `(timestamp, id)` within a chat and
//! by `(timestamp, id, chat_jid)` across chats; listings walk that order
//! backwards so page 0 is the most recent window.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use super::{format_sqlite_utc, parse_sqlite_utc, StoreError};
use crate::models::{Chat, Message};

const MESSAGE_COLUMNS: &str = "
    SELECT m.id, m.chat_jid, c.name, m.sender, m.content, m.timestamp, m.is_from_me, m.media_type
    FROM messages m
    JOIN chats c ON c.jid = m.chat_jid";

const CHAT_COLUMNS_WITH_LAST: &str = "
    SELECT c.jid, c.name, c.last_message_time,
           m.id, m.sender, m.content, m.timestamp, m.is_from_me, m.media_type
    FROM chats c
    LEFT JOIN messages m ON m.rowid = (
        SELECT l.rowid FROM messages l
        WHERE l.chat_jid = c.jid
        ORDER BY l.timestamp DESC, l.id DESC
        LIMIT 1
    )";

const CHAT_COLUMNS: &str = "
    SELECT c.jid, c.name, c.last_message_time,
           NULL, NULL, NULL, NULL, NULL, NULL
    FROM chats c";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub sender: Option<String>,
    pub chat_jid: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatSort {
    #[default]
    LastActive,
    Name,
}

impl ChatSort {
    fn order_by(self) -> &'static str {
        match self {
            ChatSort::LastActive => {
                " ORDER BY c.last_message_time IS NULL, c.last_message_time DESC, c.jid ASC"
            }
            ChatSort::Name => " ORDER BY c.name IS NULL, c.name COLLATE NOCASE ASC, c.jid ASC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCandidate {
    pub jid: String,
    pub name: Option<String>,
    pub last_active: Option<DateTime<Utc>>,
}

/// `%query%` for a LIKE with `\` as the escape character.
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn escape_like(value: &str) -> String {
    let pattern = like_pattern(value);
    pattern[1..pattern.len() - 1].to_string()
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_sqlite_utc(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(_) => time_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_jid: row.get(1)?,
        chat_name: row.get(2)?,
        sender: row.get(3)?,
        content: row.get(4)?,
        timestamp: time_column(row, 5)?,
        is_from_me: row.get(6)?,
        media_type: row.get(7)?,
    })
}

fn map_chat(row: &Row<'_>) -> rusqlite::Result<Chat> {
    let jid: String = row.get(0)?;
    let name: Option<String> = row.get(1)?;
    let last_id: Option<String> = row.get(3)?;
    let last_message = match last_id {
        Some(id) => Some(Message {
            id,
            chat_jid: jid.clone(),
            chat_name: name.clone(),
            sender: row.get(4)?,
            content: row.get(5)?,
            timestamp: time_column(row, 6)?,
            is_from_me: row.get(7)?,
            media_type: row.get(8)?,
        }),
        None => None,
    };
    Ok(Chat {
        jid,
        name,
        last_message_time: optional_time_column(row, 2)?,
        last_message,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>, StoreError> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn query_messages(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map_message)?;
    collect(rows)
}

fn query_chats(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Chat>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map_chat)?;
    collect(rows)
}

fn chat_head(include_last_message: bool) -> &'static str {
    if include_last_message {
        CHAT_COLUMNS_WITH_LAST
    } else {
        CHAT_COLUMNS
    }
}

pub fn get_chat(conn: &Connection, jid: &str, include_last_message: bool) -> Result<Option<Chat>, StoreError> {
    let sql = format!("{} WHERE c.jid = ?1", chat_head(include_last_message));
    let chat = conn
        .query_row(&sql, params![jid], map_chat)
        .optional()?;
    Ok(chat)
}

pub fn list_chats(
    conn: &Connection,
    query: Option<&str>,
    sort: ChatSort,
    include_last_message: bool,
    limit: usize,
    offset: usize,
) -> Result<Vec<Chat>, StoreError> {
    let mut sql = String::from(chat_head(include_last_message));
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(q) = query.filter(|q| !q.is_empty()) {
        sql.push_str(" WHERE (c.name LIKE ? ESCAPE '\\' OR c.jid LIKE ? ESCAPE '\\')");
        let pattern = like_pattern(q);
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    sql.push_str(sort.order_by());
    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(Box::new(limit as i64));
    params.push(Box::new(offset as i64));

    let params_slice: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    query_chats(conn, &sql, &params_slice)
}

pub fn list_messages(
    conn: &Connection,
    filter: &MessageFilter,
    limit: usize,
    offset: usize,
) -> Result<Vec<Message>, StoreError> {
    let mut sql = String::from(MESSAGE_COLUMNS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(after) = filter.after {
        clauses.push("m.timestamp >= ?");
        params.push(Box::new(format_sqlite_utc(&after)));
    }
    if let Some(before) = filter.before {
        clauses.push("m.timestamp <= ?");
        params.push(Box::new(format_sqlite_utc(&before)));
    }
    if let Some(sender) = &filter.sender {
        clauses.push("m.sender = ?");
        params.push(Box::new(sender.clone()));
    }
    if let Some(chat_jid) = &filter.chat_jid {
        clauses.push("m.chat_jid = ?");
        params.push(Box::new(chat_jid.clone()));
    }
    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        clauses.push("m.content LIKE ? ESCAPE '\\'");
        params.push(Box::new(like_pattern(query)));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY m.timestamp DESC, m.id DESC, m.chat_jid DESC LIMIT ? OFFSET ?");
    params.push(Box::new(limit as i64));
    params.push(Box::new(offset as i64));

    let params_slice: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    query_messages(conn, &sql, &params_slice)
}

pub fn get_message(conn: &Connection, id: &str, chat_jid: &str) -> Result<Option<Message>, StoreError> {
    let sql = format!("{} WHERE m.id = ?1 AND m.chat_jid = ?2", MESSAGE_COLUMNS);
    let msg = conn
        .query_row(&sql, params![id, chat_jid], map_message)
        .optional()?;
    Ok(msg)
}

/// Up to `limit` messages preceding `anchor` in its chat, oldest first.
pub fn messages_before(conn: &Connection, anchor: &Message, limit: usize) -> Result<Vec<Message>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let sql = format!(
        "{} WHERE m.chat_jid = ?1 AND (m.timestamp < ?2 OR (m.timestamp = ?2 AND m.id < ?3))
         ORDER BY m.timestamp DESC, m.id DESC LIMIT ?4",
        MESSAGE_COLUMNS
    );
    let ts = format_sqlite_utc(&anchor.timestamp);
    let mut messages = query_messages(
        conn,
        &sql,
        params![anchor.chat_jid, ts, anchor.id, limit as i64],
    )?;
    messages.reverse();
    Ok(messages)
}

/// Up to `limit` messages following `anchor` in its chat, oldest first.
pub fn messages_after(conn: &Connection, anchor: &Message, limit: usize) -> Result<Vec<Message>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let sql = format!(
        "{} WHERE m.chat_jid = ?1 AND (m.timestamp > ?2 OR (m.timestamp = ?2 AND m.id > ?3))
         ORDER BY m.timestamp ASC, m.id ASC LIMIT ?4",
        MESSAGE_COLUMNS
    );
    let ts = format_sqlite_utc(&anchor.timestamp);
    query_messages(conn, &sql, params![anchor.chat_jid, ts, anchor.id, limit as i64])
}

/// Raw contact candidates: one-to-one chats plus distinct message senders,
/// each with the name and recency of the chat that resolves it. Matching is
/// left to the caller because SQLite's LIKE folds case for ASCII only.
pub fn contact_candidates(conn: &Connection, group_suffix: &str) -> Result<Vec<ContactCandidate>, StoreError> {
    let group_pattern = format!("%@{}", escape_like(group_suffix));

    let sql = "
        SELECT c.jid, c.name, c.last_message_time
        FROM chats c
        WHERE c.jid NOT LIKE ?1 ESCAPE '\\'
        UNION ALL
        SELECT s.sender, c.name, c.last_message_time
        FROM (SELECT DISTINCT sender FROM messages WHERE sender <> '') s
        LEFT JOIN chats c
          ON c.jid NOT LIKE ?1 ESCAPE '\\'
         AND (c.jid = s.sender
              OR substr(c.jid, 1, length(s.sender) + 1) = s.sender || '@')
        WHERE s.sender NOT LIKE ?1 ESCAPE '\\'";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![group_pattern], |row| {
        Ok(ContactCandidate {
            jid: row.get(0)?,
            name: row.get(1)?,
            last_active: optional_time_column(row, 2)?,
        })
    })?;
    collect(rows)
}

pub fn direct_chat_for_phone(conn: &Connection, phone: &str, group_suffix: &str) -> Result<Option<Chat>, StoreError> {
    let sql = format!(
        "{} WHERE (c.jid = ?1 OR c.jid LIKE ?2 ESCAPE '\\') AND c.jid NOT LIKE ?3 ESCAPE '\\'
         ORDER BY c.last_message_time IS NULL, c.last_message_time DESC, c.jid ASC
         LIMIT 1",
        CHAT_COLUMNS_WITH_LAST
    );
    let prefix = format!("{}@%", escape_like(phone));
    let group_pattern = format!("%@{}", escape_like(group_suffix));
    let chat = conn
        .query_row(&sql, params![phone, prefix, group_pattern], map_chat)
        .optional()?;
    Ok(chat)
}

/// Chats the contact owns or has sent messages in. Senders may be stored as a
/// full id or as the bare phone portion, so both are matched.
pub fn chats_for_contact(
    conn: &Connection,
    jid: &str,
    phone: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<Chat>, StoreError> {
    let sql = format!(
        "{} WHERE c.jid = ?1
            OR EXISTS (SELECT 1 FROM messages s WHERE s.chat_jid = c.jid AND s.sender IN (?1, ?2))
         {} LIMIT ?3 OFFSET ?4",
        CHAT_COLUMNS_WITH_LAST,
        ChatSort::LastActive.order_by()
    );
    query_chats(conn, &sql, params![jid, phone, limit as i64, offset as i64])
}

pub fn last_interaction(conn: &Connection, jid: &str, phone: &str) -> Result<Option<Message>, StoreError> {
    let sql = format!(
        "{} WHERE m.chat_jid = ?1 OR m.sender IN (?1, ?2)
         ORDER BY m.timestamp DESC, m.id DESC LIMIT 1",
        MESSAGE_COLUMNS
    );
    let msg = conn
        .query_row(&sql, params![jid, phone], map_message)
        .optional()?;
    Ok(msg)
}
