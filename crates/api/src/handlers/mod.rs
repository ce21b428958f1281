pub mod events;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use ingestion_core::types::Timestamp;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request.
///
/// `SetRequestIdLayer` fills the header for every request; a fresh id is
/// generated if it is somehow absent or not valid UTF-8.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Wall-clock time the handler started extracting the request.
///
/// List it before any body extractor so body buffering and JSON decoding
/// count towards the event's processing time.
#[derive(Debug, Clone, Copy)]
pub struct ReceivedAt(pub Timestamp);

impl<S: Send + Sync> FromRequestParts<S> for ReceivedAt {
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ReceivedAt(chrono::Utc::now()))
    }
}
