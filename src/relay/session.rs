use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Deserialize;
use thiserror::Error;

use crate::store::{MessageStore, StoreError};

use super::registry::{BroadcastFrame, MembershipRegistry, SessionId};
use super::room_key::{RoomKey, RoomKeyError};

/// Inbound frame: `{"message": "..."}`. The payload never names the receiver;
/// that is fixed by the room, so a client cannot relabel its messages.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("room resolution failed: {0}")]
    RoomResolution(#[from] RoomKeyError),
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

const JOINED: u8 = 0;
const CLOSED: u8 = 1;

/// The state machine behind one live connection.
///
/// `open` covers the connecting phase: it resolves the room key, joins the
/// registry, and hands back a session already in the joined state. From there
/// the connection loop feeds `on_message` until the socket goes away, then
/// `close` leaves the registry. There is no way back from closed.
pub struct RelaySession {
    id: SessionId,
    identity: String,
    counterpart: String,
    room: RoomKey,
    state: AtomicU8,
    registry: Arc<MembershipRegistry>,
    store: Arc<dyn MessageStore>,
}

impl RelaySession {
    /// Resolves the room for `{identity, counterpart}` and joins it,
    /// delivering future broadcasts through `tx`. A resolution failure leaves
    /// no trace in the registry; the caller must refuse the connection.
    pub fn open(
        identity: String,
        counterpart: String,
        registry: Arc<MembershipRegistry>,
        store: Arc<dyn MessageStore>,
        tx: tokio::sync::mpsc::UnboundedSender<BroadcastFrame>,
    ) -> Result<Self, SessionError> {
        let room = RoomKey::resolve(&identity, &counterpart)?;
        let session = Self {
            id: SessionId::now_v7(),
            identity,
            counterpart,
            room,
            state: AtomicU8::new(JOINED),
            registry,
            store,
        };
        session.registry.join(&session.room, session.id, tx);
        Ok(session)
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    /// Handles one inbound frame: decode, persist, then fan out. The append
    /// must have completed before anyone sees the broadcast, so a reconnect
    /// never shows a message that history does not. On any error the frame is
    /// dropped and the session stays joined.
    pub async fn on_message(&self, raw: &str) -> Result<(), SessionError> {
        if self.state.load(Ordering::Acquire) != JOINED {
            tracing::debug!(room = %self.room, "frame on closed session ignored");
            return Ok(());
        }

        let frame: InboundFrame = serde_json::from_str(raw)?;
        let msg = self
            .store
            .append(&self.identity, &self.counterpart, &frame.message)
            .await?;

        self.registry.broadcast(
            &self.room,
            &BroadcastFrame {
                sender: msg.sender,
                receiver: msg.receiver,
                message: msg.content,
            },
        );
        Ok(())
    }

    /// Leaves the room. Both the normal disconnect path and error paths call
    /// this; the state swap makes sure the registry sees exactly one leave.
    pub fn close(&self) {
        if self
            .state
            .compare_exchange(JOINED, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.registry.leave(&self.room, self.id);
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Message};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn append(&self, _: &str, _: &str, _: &str) -> Result<Message, StoreError> {
            Err(StoreError::Query("disk on fire".into()))
        }
        async fn history(&self, _: &str, _: &str, _: Option<&str>)
        -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }
        async fn latest(&self, _: &str, _: &str) -> Result<Option<Message>, StoreError> {
            Ok(None)
        }
        async fn remember_user(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn known_others(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn open_session(
        store: Arc<dyn MessageStore>,
    ) -> (
        RelaySession,
        Arc<MembershipRegistry>,
        mpsc::UnboundedReceiver<BroadcastFrame>,
    ) {
        let registry = Arc::new(MembershipRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let session = RelaySession::open(
            "alice".into(),
            "bob".into(),
            registry.clone(),
            store,
            tx,
        )
        .unwrap();
        (session, registry, rx)
    }

    #[tokio::test]
    async fn valid_frame_is_persisted_then_echoed() {
        let store = Arc::new(MemoryStore::new());
        let (session, _registry, mut rx) = open_session(store.clone());

        session.on_message(r#"{"message":"hi"}"#).await.unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.receiver, "bob");
        assert_eq!(frame.message, "hi");

        let history = store.history("alice", "bob", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_session_survives() {
        let store = Arc::new(MemoryStore::new());
        let (session, _registry, mut rx) = open_session(store.clone());

        assert!(matches!(
            session.on_message(r#"{"note":"no message field"}"#).await,
            Err(SessionError::MalformedPayload(_))
        ));
        assert!(matches!(
            session.on_message("not json").await,
            Err(SessionError::MalformedPayload(_))
        ));
        assert!(rx.try_recv().is_err());
        assert!(store.history("alice", "bob", None).await.unwrap().is_empty());

        // The same session still relays the next well-formed frame.
        session.on_message(r#"{"message":"still here"}"#).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().message, "still here");
    }

    #[tokio::test]
    async fn receiver_comes_from_the_room_not_the_payload() {
        let store = Arc::new(MemoryStore::new());
        let (session, _registry, mut rx) = open_session(store.clone());

        session
            .on_message(r#"{"message":"hi","receiver":"mallory"}"#)
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().receiver, "bob");
    }

    #[tokio::test]
    async fn persistence_failure_suppresses_broadcast() {
        let (session, registry, mut rx) = open_session(Arc::new(FailingStore));

        assert!(matches!(
            session.on_message(r#"{"message":"hi"}"#).await,
            Err(SessionError::Persistence(_))
        ));
        assert!(rx.try_recv().is_err());
        // Still joined: the frame was dropped, not the connection.
        assert_eq!(registry.member_count(session.room()), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let store = Arc::new(MemoryStore::new());
        let (session, registry, mut rx) = open_session(store.clone());
        let room = session.room().clone();

        session.close();
        session.close();
        assert_eq!(registry.member_count(&room), 0);

        // Frames after close are ignored entirely.
        session.on_message(r#"{"message":"too late"}"#).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(store.history("alice", "bob", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn both_members_hear_every_frame() {
        let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(MembershipRegistry::new());

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let alice = RelaySession::open(
            "alice".into(),
            "bob".into(),
            registry.clone(),
            store.clone(),
            alice_tx,
        )
        .unwrap();

        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let _bob = RelaySession::open(
            "bob".into(),
            "alice".into(),
            registry.clone(),
            store.clone(),
            bob_tx,
        )
        .unwrap();

        alice.on_message(r#"{"message":"hi"}"#).await.unwrap();

        // Same room from either direction; the sender gets its own echo.
        assert_eq!(alice_rx.try_recv().unwrap().message, "hi");
        assert_eq!(bob_rx.try_recv().unwrap().message, "hi");
    }
}
