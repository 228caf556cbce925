use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;

use crate::{
    AppResult,
    relay::{MembershipRegistry, RelaySession, RoomKey},
    session::USER_ID,
    store::MessageStore,
};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(counterpart): Path<String>,
    State(registry): State<Arc<MembershipRegistry>>,
    State(store): State<Arc<dyn MessageStore>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(identity) = session.get::<String>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    // An unresolvable pair refuses the connection before the upgrade, so a
    // bad handle never reaches the registry.
    if let Err(err) = RoomKey::resolve(&identity, &counterpart) {
        return Ok((StatusCode::BAD_REQUEST, err.to_string()).into_response());
    }

    Ok(ws.on_upgrade(move |socket| relay(socket, identity, counterpart, registry, store)))
}

/// Drives one relay session over a websocket: one task drains the session's
/// delivery channel into the sink, the connection task feeds inbound frames
/// to the session, and whichever side ends first tears both down.
async fn relay(
    socket: WebSocket,
    identity: String,
    counterpart: String,
    registry: Arc<MembershipRegistry>,
    store: Arc<dyn MessageStore>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = match RelaySession::open(identity, counterpart, registry, store, tx) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(error = %err, "closing websocket, room did not resolve");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let mut deliver = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = session.on_message(text.as_str()).await {
                        tracing::warn!(room = %session.room(), error = %err, "frame dropped");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // pings, pongs, binary: nothing to relay
                Some(Err(err)) => {
                    tracing::debug!(room = %session.room(), error = %err, "websocket receive error");
                    break;
                }
            },
            _ = &mut deliver => break,
        }
    }

    session.close();
    deliver.abort();
}
