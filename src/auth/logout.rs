use axum::{debug_handler, response::Redirect};
use tower_sessions::Session;

#[debug_handler]
pub(crate) async fn logout(session: Session) -> Redirect {
    session.clear().await;
    Redirect::to("/login")
}
