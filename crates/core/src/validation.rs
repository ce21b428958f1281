//! Field validation for inbound events.
//!
//! Runs before enrichment; the publishing pipeline assumes events it receives
//! have already passed these checks.

use crate::error::CoreError;
use crate::event::{parse_timestamp, RawEvent};

/// Validate the required fields of a raw event.
///
/// `event_type`, `user_id`, `session_id` and `page_url` must be non-empty.
/// A non-empty `timestamp` must be RFC 3339.
pub fn validate_raw_event(event: &RawEvent) -> Result<(), CoreError> {
    require_non_empty("event_type", &event.event_type)?;
    require_non_empty("user_id", &event.user_id)?;
    require_non_empty("session_id", &event.session_id)?;
    require_non_empty("page_url", &event.page_url)?;

    if let Some(ts) = event.timestamp.as_deref() {
        if !ts.is_empty() && parse_timestamp(ts).is_none() {
            return Err(CoreError::Validation(
                "invalid timestamp format, expected RFC3339".to_string(),
            ));
        }
    }

    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}
