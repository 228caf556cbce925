//! Keys under which handler state lives in the cookie session.

pub const USER_ID: &str = "user_id";
