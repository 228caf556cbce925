mod page;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(page::conversations))
        .route("/{counterpart}", get(page::room))
        .route("/{counterpart}/ws", get(ws::room_ws))
}
