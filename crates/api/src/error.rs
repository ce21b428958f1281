use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ingestion_core::error::CoreError;
use ingestion_events::PublishError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Publish failures are reported to clients as one opaque `KAFKA_ERROR`; the
/// cause is only logged.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request body was not a JSON event.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// The request did not declare a JSON body.
    #[error("Content-Type must be application/json")]
    InvalidContentType,

    /// The body exceeded the configured size limit.
    #[error("Request body too large")]
    RequestTooLarge,

    /// A domain-level error from `ingestion_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => AppError::InvalidContentType,
            other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => AppError::RequestTooLarge,
            other => AppError::InvalidJson(other.body_text()),
        }
    }
}

impl AppError {
    /// Attach the correlation id reported in the error body.
    pub fn with_request_id(self, request_id: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            error: self,
            request_id: request_id.into(),
        }
    }
}

/// An [`AppError`] bound to the request it failed.
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: AppError,
    pub request_id: String,
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, ErrorResponse>;

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.error {
            AppError::InvalidJson(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON payload".to_string(),
            ),
            AppError::InvalidContentType => (
                StatusCode::BAD_REQUEST,
                "INVALID_CONTENT_TYPE",
                self.error.to_string(),
            ),
            AppError::RequestTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "REQUEST_TOO_LARGE",
                self.error.to_string(),
            ),
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Publish(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "KAFKA_ERROR",
                "Failed to process event".to_string(),
            ),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
                "request_id": self.request_id,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
