//! Error types for the transport server.
//!
//! [`ApiError`] is converted into a JSON HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use smartqueue_core::broadcast::BroadcastError;
use smartqueue_core::command::CommandError;
use smartqueue_types::TokenError;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request cannot be served right now: no viewer slot is free or
    /// the control loop has stopped.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A path or body token is not a valid card UID.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The requested visitor was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::LoopStopped => Self::Unavailable(err.to_string()),
            CommandError::Refused(BroadcastError::ChannelLimit { .. }) => {
                Self::Unavailable(err.to_string())
            }
            CommandError::Refused(BroadcastError::Encode { .. }) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidToken(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
