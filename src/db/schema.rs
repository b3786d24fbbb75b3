use rusqlite::Connection;
use tracing::{debug, info};

use super::StoreError;

/// Ordered schema migrations. `PRAGMA user_version` records how many have run.
const MIGRATIONS: &[&str] = &[
    // 1: chats and messages
    "
    CREATE TABLE IF NOT EXISTS chats (
        jid TEXT PRIMARY KEY,
        name TEXT,
        last_message_time DATETIME
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT NOT NULL,
        chat_jid TEXT NOT NULL,
        sender TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        timestamp DATETIME NOT NULL,
        is_from_me BOOLEAN NOT NULL DEFAULT FALSE,
        media_type TEXT,
        PRIMARY KEY (id, chat_jid),
        FOREIGN KEY (chat_jid) REFERENCES chats (jid)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_chat_date ON messages (chat_jid, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_content ON messages (content);
    CREATE INDEX IF NOT EXISTS idx_chats_last_message ON chats (last_message_time);
    ",
    // 2: sender lookups for contact search and per-contact chat listing
    "
    CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages (sender);
    ",
];

pub fn schema_version(conn: &Connection) -> Result<usize, StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as usize)
}

pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let current = schema_version(conn)?;
    if current >= MIGRATIONS.len() {
        debug!("Database: Schema up to date at version {}", current);
        return Ok(());
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = idx as i64 + 1;
        info!("Database: Applying migration {}", version);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}

pub fn latest_version() -> usize {
    MIGRATIONS.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_repeatable() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());

        migrate(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        for expected in [
            "idx_messages_timestamp",
            "idx_messages_chat_date",
            "idx_messages_content",
            "idx_chats_last_message",
            "idx_messages_sender",
        ] {
            assert!(indexes.iter().any(|name| name == expected), "missing {}", expected);
        }
    }
}
