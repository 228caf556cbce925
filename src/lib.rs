pub mod auth;
pub mod chat;
pub mod history;
pub mod relay;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}};

use crate::relay::registry::MembershipRegistry;
use crate::store::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub registry: Arc<MembershipRegistry>,
}

pub type AppResult<T> = Result<T, AppError>;
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
