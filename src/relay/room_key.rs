use std::fmt;

use thiserror::Error;

/// Separator between the two handles inside a room key. Handles containing it
/// are rejected, which is what makes `resolve` injective over unordered pairs.
const SEPARATOR: char = ':';
const PREFIX: &str = "chat";

/// Canonical identifier for a two-party room.
///
/// `resolve("alice", "bob")` and `resolve("bob", "alice")` produce the same
/// key, so whichever participant opens the connection lands in the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    key: String,
    lo: String,
    hi: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomKeyError {
    #[error("empty handle")]
    EmptyHandle,
    #[error("handle {0:?} contains the reserved character '{SEPARATOR}'")]
    ReservedCharacter(String),
}

/// Checks that `handle` can take part in a room key. The same rule is applied
/// at login so a handle that cannot open any room never gets a session.
pub fn validate_handle(handle: &str) -> Result<(), RoomKeyError> {
    if handle.is_empty() {
        return Err(RoomKeyError::EmptyHandle);
    }
    if handle.contains(SEPARATOR) {
        return Err(RoomKeyError::ReservedCharacter(handle.to_owned()));
    }
    Ok(())
}

impl RoomKey {
    /// Derives the canonical key for the unordered pair `{a, b}` by sorting
    /// the handles and joining them with a character neither may contain.
    pub fn resolve(a: &str, b: &str) -> Result<RoomKey, RoomKeyError> {
        validate_handle(a)?;
        validate_handle(b)?;

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Ok(RoomKey {
            key: format!("{PREFIX}{SEPARATOR}{lo}{SEPARATOR}{hi}"),
            lo: lo.to_owned(),
            hi: hi.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The two participants, sorted.
    pub fn peers(&self) -> (&str, &str) {
        (&self.lo, &self.hi)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
