//! API error type and HTTP status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{sync_manager::SyncManagerError, webhook_security::WebhookAuthError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(#[from] WebhookAuthError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("sync failed: {0}")]
    Sync(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SyncManagerError> for ApiError {
    fn from(err: SyncManagerError) -> Self {
        match err {
            SyncManagerError::UnknownKey(_) => Self::NotFound(err.to_string()),
            SyncManagerError::DuplicateKey(_) => Self::Sync(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Auth(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sync(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
