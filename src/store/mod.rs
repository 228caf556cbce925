pub mod sqlite;

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub use sqlite::SqliteMessageStore;

/// One persisted chat message. Immutable once appended; the store assigns
/// `id` and `timestamp`. Two messages with equal timestamps keep their store
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query error: {0}")]
    Query(String),
}

/// Append-only log of chat messages plus the roster of handles that have
/// logged in at least once. Appends never update or delete; history reads are
/// ascending (timestamp, then insertion order), latest reads descending.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns it with its assigned id and timestamp.
    async fn append(&self, sender: &str, receiver: &str, content: &str)
    -> Result<Message, StoreError>;

    /// Every message between `a` and `b` in either direction, ascending.
    /// With `search`, only messages whose content contains it,
    /// case-insensitively.
    async fn history(&self, a: &str, b: &str, search: Option<&str>)
    -> Result<Vec<Message>, StoreError>;

    /// The newest message between `a` and `b` in either direction, if any.
    async fn latest(&self, a: &str, b: &str) -> Result<Option<Message>, StoreError>;

    /// Records `handle` in the roster; repeat calls are no-ops.
    async fn remember_user(&self, handle: &str) -> Result<(), StoreError>;

    /// Every roster handle except `me`, ascending.
    async fn known_others(&self, me: &str) -> Result<Vec<String>, StoreError>;
}

fn involves_pair(msg: &Message, a: &str, b: &str) -> bool {
    (msg.sender == a && msg.receiver == b) || (msg.sender == b && msg.receiver == a)
}

/// In-memory store. Backs the relay-core unit tests and small demos; the
/// serving path uses [`SqliteMessageStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
    roster: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, sender: &str, receiver: &str, content: &str)
    -> Result<Message, StoreError> {
        let msg = Message {
            id: Uuid::now_v7(),
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            content: content.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
        };
        self.messages
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?
            .push(msg.clone());
        Ok(msg)
    }

    async fn history(&self, a: &str, b: &str, search: Option<&str>)
    -> Result<Vec<Message>, StoreError> {
        let needle = search.map(str::to_lowercase);
        let messages = self
            .messages
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out: Vec<Message> = messages
            .iter()
            .filter(|m| involves_pair(m, a, b))
            .filter(|m| match &needle {
                Some(needle) => m.content.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        // Vec order is insertion order, so a stable sort keeps the tie-break.
        out.sort_by_key(|m| m.timestamp);
        Ok(out)
    }

    async fn latest(&self, a: &str, b: &str) -> Result<Option<Message>, StoreError> {
        let messages = self
            .messages
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        // max_by_key yields the last of equal maxima: newest insertion wins.
        Ok(messages
            .iter()
            .filter(|m| involves_pair(m, a, b))
            .max_by_key(|m| m.timestamp)
            .cloned())
    }

    async fn remember_user(&self, handle: &str) -> Result<(), StoreError> {
        self.roster
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?
            .insert(handle.to_owned());
        Ok(())
    }

    async fn known_others(&self, me: &str) -> Result<Vec<String>, StoreError> {
        let roster = self
            .roster
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(roster.iter().filter(|h| h.as_str() != me).cloned().collect())
    }
}
