//! Local message store.
//!
//! Access is split into one [`StoreWriter`] and any number of [`StoreReader`]
//! clones. [`Database::open`] hands out exactly one writer and the writer is not
//! `Clone`, so every write in the process goes through a single owner. File
//! backed stores run in WAL mode with a separate read-only connection for
//! readers, which therefore only ever see committed write units.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Chat, Contact, Message, MessageRecord};

pub mod reads;
pub mod schema;
pub mod writes;

pub use reads::{ChatSort, MessageFilter};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const SQLITE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("blocking database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Busy/locked errors clear up on their own once the other connection
    /// finishes its transaction.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub fn format_sqlite_utc(ts: &DateTime<Utc>) -> String {
    ts.format(SQLITE_TIME_FORMAT).to_string()
}

pub fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, SQLITE_TIME_FORMAT).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock().map_err(|_| StoreError::Poisoned)
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub struct Database;

impl Database {
    /// Opens (creating and migrating if needed) the store at `path`.
    ///
    /// `:memory:` yields a writer and reader over one shared connection, which is
    /// what the tests use.
    pub fn open(path: &str, read_retry_attempts: usize) -> Result<(StoreWriter, StoreReader), StoreError> {
        if path == ":memory:" {
            let mut conn = Connection::open_in_memory()?;
            configure(&conn)?;
            schema::migrate(&mut conn)?;
            let shared = Arc::new(Mutex::new(conn));
            return Ok((
                StoreWriter { conn: shared.clone() },
                StoreReader { conn: shared, retry_attempts: read_retry_attempts },
            ));
        }

        let writer = Self::open_writer(path)?;
        let reader = Self::open_reader_connection(path, read_retry_attempts)?;
        Ok((writer, reader))
    }

    /// Opens only the read side, for processes that serve queries while
    /// another process owns ingestion. Applies pending migrations first so a
    /// fresh path is usable.
    pub fn open_read_only(path: &str, read_retry_attempts: usize) -> Result<StoreReader, StoreError> {
        if path == ":memory:" {
            let (_writer, reader) = Self::open(path, read_retry_attempts)?;
            return Ok(reader);
        }
        drop(Self::open_writer(path)?);
        Self::open_reader_connection(path, read_retry_attempts)
    }

    fn open_writer(path: &str) -> Result<StoreWriter, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;
        configure(&conn)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("Database: WAL mode unavailable, journal_mode is '{}'", mode);
        }
        schema::migrate(&mut conn)?;
        info!("Database: Opened writer at {}", path);
        Ok(StoreWriter { conn: Arc::new(Mutex::new(conn)) })
    }

    fn open_reader_connection(path: &str, retry_attempts: usize) -> Result<StoreReader, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure(&conn)?;
        debug!("Database: Opened read-only connection at {}", path);
        Ok(StoreReader {
            conn: Arc::new(Mutex::new(conn)),
            retry_attempts,
        })
    }
}

/// The single write path into the store.
pub struct StoreWriter {
    conn: Arc<Mutex<Connection>>,
}

impl StoreWriter {
    /// Writes one record as an atomic chat-then-message unit.
    pub fn write_record(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let mut conn = lock(&self.conn)?;
        writes::write_record(&mut conn, record)
    }

    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await?
    }
}

/// Cloneable read handle. Every call is read-only.
#[derive(Clone)]
pub struct StoreReader {
    conn: Arc<Mutex<Connection>>,
    retry_attempts: usize,
}

impl StoreReader {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let conn = lock(&self.conn)?;
        f(&conn)
    }

    /// Runs `f` on the blocking pool, retrying a bounded number of times while
    /// the store reports itself busy.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&StoreReader) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let reader = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut attempt = 0;
            loop {
                match f(&reader) {
                    Err(e) if e.is_transient() && attempt < reader.retry_attempts => {
                        attempt += 1;
                        debug!("Database: Read busy, retry {}/{}", attempt, reader.retry_attempts);
                        std::thread::sleep(Duration::from_millis(50 * attempt as u64));
                    }
                    result => return result,
                }
            }
        })
        .await?
    }

    pub fn get_chat(&self, jid: &str, include_last_message: bool) -> Result<Option<Chat>, StoreError> {
        self.with_conn(|conn| reads::get_chat(conn, jid, include_last_message))
    }

    pub fn list_chats(
        &self,
        query: Option<&str>,
        sort: ChatSort,
        include_last_message: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chat>, StoreError> {
        self.with_conn(|conn| reads::list_chats(conn, query, sort, include_last_message, limit, offset))
    }

    pub fn list_messages(&self, filter: &MessageFilter, limit: usize, offset: usize) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| reads::list_messages(conn, filter, limit, offset))
    }

    pub fn get_message(&self, id: &str, chat_jid: &str) -> Result<Option<Message>, StoreError> {
        self.with_conn(|conn| reads::get_message(conn, id, chat_jid))
    }

    pub fn messages_before(&self, anchor: &Message, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| reads::messages_before(conn, anchor, limit))
    }

    pub fn messages_after(&self, anchor: &Message, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| reads::messages_after(conn, anchor, limit))
    }

    pub fn contact_candidates(&self, group_suffix: &str) -> Result<Vec<reads::ContactCandidate>, StoreError> {
        self.with_conn(|conn| reads::contact_candidates(conn, group_suffix))
    }

    pub fn direct_chat_for_phone(&self, phone: &str, group_suffix: &str) -> Result<Option<Chat>, StoreError> {
        self.with_conn(|conn| reads::direct_chat_for_phone(conn, phone, group_suffix))
    }

    pub fn chats_for_contact(&self, contact: &Contact, limit: usize, offset: usize) -> Result<Vec<Chat>, StoreError> {
        self.with_conn(|conn| reads::chats_for_contact(conn, &contact.jid, &contact.phone_number, limit, offset))
    }

    pub fn last_interaction(&self, contact: &Contact) -> Result<Option<Message>, StoreError> {
        self.with_conn(|conn| reads::last_interaction(conn, &contact.jid, &contact.phone_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(chat: &str, id: &str, ts: i64, content: &str) -> MessageRecord {
        MessageRecord {
            chat_jid: chat.to_string(),
            id: id.to_string(),
            sender: "15550001@s.whatsapp.net".to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            content: content.to_string(),
            is_from_me: false,
            media_type: None,
            chat_name: None,
        }
    }

    #[test]
    fn test_sqlite_time_roundtrip_preserves_order() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        let early_s = format_sqlite_utc(&early);
        assert_eq!(early_s, "2024-01-02 03:04:05");
        assert_eq!(parse_sqlite_utc(&early_s), Some(early));
        assert!(early_s < format_sqlite_utc(&late));
        assert_eq!(parse_sqlite_utc("not a time"), None);
    }

    #[test]
    fn test_memory_store_shares_connection() {
        let (writer, reader) = Database::open(":memory:", 0).unwrap();
        writer.write_record(&record("g1", "1", 100, "hi")).unwrap();
        let msg = reader.get_message("1", "g1").unwrap().unwrap();
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_file_store_reader_sees_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("messages.db");
        let path = path.to_str().unwrap();

        let (writer, reader) = Database::open(path, 2).unwrap();
        assert!(reader.get_chat("g1", false).unwrap().is_none());

        writer.write_record(&record("g1", "1", 100, "hi")).unwrap();
        let chat = reader.get_chat("g1", true).unwrap().unwrap();
        assert_eq!(chat.last_message.unwrap().id, "1");

        // The read connection is read-only.
        let err = reader
            .with_conn(|conn| {
                conn.execute("DELETE FROM messages", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn test_open_read_only_migrates_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        let reader = Database::open_read_only(path.to_str().unwrap(), 1).unwrap();
        let chats = reader.list_chats(None, ChatSort::LastActive, false, 10, 0).unwrap();
        assert!(chats.is_empty());
    }

    #[tokio::test]
    async fn test_run_blocking_on_both_handles() {
        let (writer, reader) = Database::open(":memory:", 1).unwrap();
        let rec = record("g1", "7", 100, "async");
        writer
            .run_blocking(move |conn| writes::write_record(conn, &rec))
            .await
            .unwrap();
        let found = reader
            .run_blocking(|db| db.get_message("7", "g1"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().content, "async");
    }

    #[test]
    fn test_transient_classification() {
        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());
        assert!(!StoreError::Poisoned.is_transient());
    }
}
