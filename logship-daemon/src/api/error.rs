//! HTTP error responses.
//!
//! Every error body is `{"error": "<message>"}`. Storage and other internal
//! failures are logged with full detail and reported to clients generically.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use logship_pipeline::LogPipelineError;
use logship_store::StoreError;

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request (bad JSON, invalid rule, bad query parameter).
    #[error("{0}")]
    BadRequest(String),

    /// Request body exceeded `server.max_body_bytes`.
    #[error("request body too large")]
    PayloadTooLarge,

    /// Request body was not fully received within `server.body_timeout_secs`.
    #[error("request body timed out")]
    RequestTimeout,

    /// Storage or other internal failure.
    #[error("storage failure")]
    Internal,
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store operation failed");
        Self::Internal
    }
}

impl From<LogPipelineError> for ApiError {
    fn from(err: LogPipelineError) -> Self {
        if err.is_client_error() {
            return Self::BadRequest(err.to_string());
        }
        tracing::error!(error = %err, "request processing failed");
        Self::Internal
    }
}
