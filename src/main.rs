use std::sync::Arc;

use axum::{
    Router, debug_handler,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use duolog::{
    AppResult, AppState, auth, chat, relay::MembershipRegistry, session::USER_ID,
    store::SqliteMessageStore,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    let store = SqliteMessageStore::connect(&dotenv::var("DATABASE_URL")?).await?;
    let app_state = AppState {
        store: Arc::new(store),
        registry: Arc::new(MembershipRegistry::new()),
    };

    let app = Router::new()
        .route("/", get(index))
        .merge(auth::router())
        .nest("/chat", chat::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[debug_handler]
async fn index(session: Session) -> AppResult<Response> {
    if session.get::<String>(USER_ID).await?.is_some() {
        Ok(Redirect::to("/chat").into_response())
    } else {
        Ok(Redirect::to("/login").into_response())
    }
}
