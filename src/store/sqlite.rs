use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Message, MessageStore, StoreError};

/// Message and roster tables. Timestamps are unix nanoseconds (fits an i64
/// until 2262); `rowid` supplies the insertion-order tie-break for equal
/// timestamps.
const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS messages (
        id        TEXT PRIMARY KEY,
        sender    TEXT NOT NULL,
        receiver  TEXT NOT NULL,
        content   TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_pair
        ON messages (sender, receiver, timestamp)",
    "CREATE TABLE IF NOT EXISTS users (
        handle     TEXT PRIMARY KEY,
        first_seen INTEGER NOT NULL
    )",
];

type MessageRow = (String, String, String, String, i64);

/// sqlx-on-SQLite implementation of [`MessageStore`]. WAL mode plus a busy
/// timeout so concurrent session appends queue instead of failing.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Opens (creating if missing) the database at `url` and ensures the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Query(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        Ok(Self { pool })
    }
}

fn row_to_message((id, sender, receiver, content, nanos): MessageRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Query(format!("invalid message id: {e}")))?,
        sender,
        receiver,
        content,
        timestamp: OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
            .map_err(|e| StoreError::Query(format!("invalid timestamp: {e}")))?,
    })
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, sender: &str, receiver: &str, content: &str)
    -> Result<Message, StoreError> {
        let id = Uuid::now_v7();
        let timestamp = OffsetDateTime::now_utc();

        sqlx::query("INSERT INTO messages (id,sender,receiver,content,timestamp) VALUES (?,?,?,?,?)")
            .bind(id.to_string())
            .bind(sender)
            .bind(receiver)
            .bind(content)
            .bind(timestamp.unix_timestamp_nanos() as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(Message {
            id,
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            content: content.to_owned(),
            timestamp,
        })
    }

    async fn history(&self, a: &str, b: &str, search: Option<&str>)
    -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = match search {
            Some(term) => {
                sqlx::query_as(
                    "SELECT id,sender,receiver,content,timestamp FROM messages
                     WHERE ((sender=? AND receiver=?) OR (sender=? AND receiver=?))
                       AND instr(lower(content), lower(?)) > 0
                     ORDER BY timestamp ASC, rowid ASC",
                )
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT id,sender,receiver,content,timestamp FROM messages
                     WHERE ((sender=? AND receiver=?) OR (sender=? AND receiver=?))
                     ORDER BY timestamp ASC, rowid ASC",
                )
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn latest(&self, a: &str, b: &str) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id,sender,receiver,content,timestamp FROM messages
             WHERE ((sender=? AND receiver=?) OR (sender=? AND receiver=?))
             ORDER BY timestamp DESC, rowid DESC
             LIMIT 1",
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(row_to_message).transpose()
    }

    async fn remember_user(&self, handle: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (handle, first_seen) VALUES (?, ?)
             ON CONFLICT(handle) DO NOTHING",
        )
        .bind(handle)
        .bind(OffsetDateTime::now_utc().unix_timestamp_nanos() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn known_others(&self, me: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT handle FROM users WHERE handle <> ? ORDER BY handle",
        )
        .bind(me)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|(handle,)| handle).collect())
    }
}
