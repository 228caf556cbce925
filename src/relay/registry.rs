use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::room_key::RoomKey;

pub type SessionId = Uuid;

/// The payload fanned out to every member of a room. Forwarded verbatim to
/// each member's websocket, including the sender's own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastFrame {
    pub sender: String,
    pub receiver: String,
    pub message: String,
}

/// Process-wide index of which live sessions belong to which room.
///
/// This is the only mutable state shared between sessions. Join, leave and
/// broadcast on one key are linearizable: join/leave go through the entry API
/// (exclusive shard lock) and broadcast reads the member map under the same
/// shard's lock. Delivery is a non-blocking `UnboundedSender::send`, so no
/// await ever happens while a shard is held.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    rooms: DashMap<RoomKey, HashMap<SessionId, UnboundedSender<BroadcastFrame>>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session to the room's member set. Joining a room the session is
    /// already in replaces its delivery channel, so the call is idempotent.
    pub fn join(&self, room: &RoomKey, id: SessionId, tx: UnboundedSender<BroadcastFrame>) {
        self.rooms.entry(room.clone()).or_default().insert(id, tx);
    }

    /// Removes a session from the room; the room entry itself is reclaimed
    /// once its last member leaves. Unknown sessions and rooms are no-ops.
    pub fn leave(&self, room: &RoomKey, id: SessionId) {
        if let Entry::Occupied(mut members) = self.rooms.entry(room.clone()) {
            members.get_mut().remove(&id);
            if members.get().is_empty() {
                members.remove();
            }
        }
    }

    /// Delivers `frame` to every session registered under `room` at the
    /// moment of the call. A member whose channel is gone is skipped; the
    /// others still get their copy.
    pub fn broadcast(&self, room: &RoomKey, frame: &BroadcastFrame) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for (id, tx) in members.iter() {
            if tx.send(frame.clone()).is_err() {
                tracing::debug!(session = %id, room = %room, "member channel closed, skipping delivery");
            }
        }
    }

    /// Number of sessions currently in `room`.
    pub fn member_count(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }
}
