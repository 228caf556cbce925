//! The relay core: room identity, live membership, and the per-connection
//! session state machine. Everything in here is transport-agnostic; the
//! websocket glue lives in `crate::chat::ws`.

pub mod registry;
pub mod room_key;
pub mod session;

pub use registry::{BroadcastFrame, MembershipRegistry, SessionId};
pub use room_key::{RoomKey, RoomKeyError};
pub use session::{RelaySession, SessionError};
