use std::sync::Arc;

use axum::{
    Form, debug_handler,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, relay::room_key, session::USER_ID, store::MessageStore};

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    handle: String,
}

#[debug_handler]
pub(crate) async fn login_page() -> impl IntoResponse {
    // Identity is provisioned elsewhere; this surface only binds a handle to
    // the cookie session.
    "POST your handle to log in\n"
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(store): State<Arc<dyn MessageStore>>,
    session: Session,

    Form(LoginForm { handle }): Form<LoginForm>,
) -> AppResult<Response> {
    // A handle that could never form a room key is refused up front.
    if let Err(err) = room_key::validate_handle(&handle) {
        return Ok((StatusCode::BAD_REQUEST, err.to_string()).into_response());
    }

    store.remember_user(&handle).await?;
    session.insert(USER_ID, handle.clone()).await?;
    tracing::info!(%handle, "logged in");

    Ok(Redirect::to("/chat").into_response())
}
