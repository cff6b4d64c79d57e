//! Error types for the internal HTTP endpoint and webhook notifier.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// `WebhookFailure` from spec §7: logged to the build stream by the
/// caller, never fatal to the push. Kept distinct from axum-route errors
/// (`BadRequest`) so C6's handler can tell the two apart.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error("webhook notification failed: {0}")]
    Webhook(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Webhook(_) | ServerError::Http(_) | ServerError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
