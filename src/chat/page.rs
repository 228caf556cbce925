use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    AppResult,
    history::{self, ConversationSummary},
    relay::RoomKey,
    session::USER_ID,
    store::{Message, MessageStore},
};

#[derive(Deserialize)]
pub(crate) struct HistoryParams {
    search: Option<String>,
}

#[derive(Serialize)]
struct RoomView {
    room: String,
    viewer: String,
    counterpart: String,
    search: Option<String>,
    messages: Vec<Message>,
    conversations: Vec<ConversationSummary>,
}

/// Everything the renderer needs for one room page: the chronological
/// (optionally searched) history with `counterpart`, plus the ranked
/// conversation sidebar and the echoed search term.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    Path(counterpart): Path<String>,
    Query(HistoryParams { search }): Query<HistoryParams>,
    State(store): State<Arc<dyn MessageStore>>,
    session: Session,
) -> AppResult<Response> {
    let Some(viewer) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let room = RoomKey::resolve(&viewer, &counterpart)?;
    let messages =
        history::between(store.as_ref(), &viewer, &counterpart, search.as_deref()).await?;
    let others = store.known_others(&viewer).await?;
    let conversations = history::rank(store.as_ref(), &viewer, &others).await?;

    Ok(Json(RoomView {
        room: room.to_string(),
        viewer,
        counterpart,
        search,
        messages,
        conversations,
    })
    .into_response())
}

#[derive(Serialize)]
struct ConversationsView {
    viewer: String,
    conversations: Vec<ConversationSummary>,
}

/// The landing view: just the ranked conversation list.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversations(
    State(store): State<Arc<dyn MessageStore>>,
    session: Session,
) -> AppResult<Response> {
    let Some(viewer) = session.get::<String>(USER_ID).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let others = store.known_others(&viewer).await?;
    let conversations = history::rank(store.as_ref(), &viewer, &others).await?;

    Ok(Json(ConversationsView { viewer, conversations }).into_response())
}
