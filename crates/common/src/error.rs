use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error type returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Verification error: {0}")]
    Verification(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self {
            AppError::Validation(msg) | AppError::Verification(msg) => msg,
        };

        let body = json!({ "error": message });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
