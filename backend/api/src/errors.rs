//! Application-wide error types and their HTTP mapping.
//!
//! The lifecycle taxonomy maps onto status codes as:
//! validation and invalid transitions → 400, unauthenticated → 401, wrong
//! party → 403, unresolved ids → 404, storage-collaborator failure during
//! deliver → 502. Everything else is a 500. All error bodies are
//! `{"message": ...}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;
use tracing::error;

use contract_engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Domain failure surfaced by the lifecycle engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Bearer credential missing or rejected by the identity collaborator.
    #[error("{0}")]
    Unauthorized(String),

    /// Contract id (or route id) did not resolve.
    #[error("{0}")]
    NotFound(String),

    /// File-storage collaborator failed during deliver; milestone state is
    /// left unchanged and the caller must resubmit.
    #[error("file upload failed: {0}")]
    Upload(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored row failed to parse back into a domain value.
    #[error("Stored data error: {0}")]
    Data(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::Validation(_))
            | ApiError::Engine(EngineError::InvalidTransition(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Engine(EngineError::MilestoneNotFound) | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Migrate(_) | ApiError::Config(_)
            | ApiError::Data(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {self}");
        }
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
