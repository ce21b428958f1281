//! Event model: the caller-supplied [`RawEvent`] and the [`EnrichedEvent`]
//! that is actually published to the broker.
//!
//! Enrichment attaches a fresh event id, the request's correlation id, the
//! service identity and processing timestamps. Processing duration is only
//! known once publishing has resolved, so it is stamped afterwards via
//! [`EnrichedEvent::complete_processing`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventData, Timestamp};

/// Default service name reported in [`ServiceInfo`].
pub const SERVICE_NAME: &str = "ingestion-service";

/// Service version reported on events and by the HTTP status endpoints.
pub const SERVICE_VERSION: &str = "1.0.0";

/// Default deployment environment when `APP_ENV` is not set.
pub const DEFAULT_ENVIRONMENT: &str = "development";

// ---------------------------------------------------------------------------
// RawEvent
// ---------------------------------------------------------------------------

/// Event as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event name, e.g. `"page_view"`.
    #[serde(default)]
    pub event_type: String,

    /// Client-side occurrence time as an RFC 3339 string, if provided.
    #[serde(default)]
    pub timestamp: Option<String>,

    // Missing identifiers decode as empty and are reported by validation.
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub page_url: String,

    /// Event-specific payload. Insertion order is preserved.
    #[serde(default)]
    pub event_data: EventData,

    #[serde(default)]
    pub client_info: ClientInfo,
}

/// Browser / device metadata sent alongside every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub screen_resolution: String,
    #[serde(default)]
    pub language: String,
}

// ---------------------------------------------------------------------------
// EnrichedEvent
// ---------------------------------------------------------------------------

/// Identity of the service instance that processed an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
}

impl ServiceInfo {
    /// Build service info from a variable lookup.
    ///
    /// | Var       | Default       |
    /// |-----------|---------------|
    /// | `APP_ENV` | `development` |
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            service_name: SERVICE_NAME.to_string(),
            service_version: SERVICE_VERSION.to_string(),
            environment: lookup("APP_ENV")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        }
    }

    /// Build service info from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

/// Timing metadata for one event's trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub received_at: Timestamp,
    pub processed_at: Timestamp,
    /// Milliseconds from `received_at` to publish resolution. Zero until
    /// [`EnrichedEvent::complete_processing`] has been called.
    pub processing_ms: i64,
}

/// The event as it is published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_id: String,
    pub request_id: String,
    pub event_type: String,
    pub timestamp: Timestamp,
    pub user_id: String,
    pub session_id: String,
    pub page_url: String,
    pub event_data: EventData,
    pub client_info: ClientInfo,
    pub service_info: ServiceInfo,
    pub processing_info: ProcessingInfo,
}

impl EnrichedEvent {
    /// Stamp the publish resolution time and compute the processing duration.
    pub fn complete_processing(&mut self, resolved_at: Timestamp) {
        let info = &mut self.processing_info;
        info.processed_at = resolved_at;
        info.processing_ms = (resolved_at - info.received_at).num_milliseconds().max(0);
    }
}

/// Enrich a raw event with identifiers and processing metadata.
///
/// `received_at` is the moment the request arrived; it doubles as the event
/// timestamp when the client did not send a parseable one.
pub fn enrich(
    raw: RawEvent,
    request_id: impl Into<String>,
    service_info: &ServiceInfo,
    received_at: Timestamp,
) -> EnrichedEvent {
    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    EnrichedEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        request_id: request_id.into(),
        event_type: raw.event_type,
        timestamp,
        user_id: raw.user_id,
        session_id: raw.session_id,
        page_url: raw.page_url,
        event_data: raw.event_data,
        client_info: raw.client_info,
        service_info: service_info.clone(),
        processing_info: ProcessingInfo {
            received_at,
            processed_at: received_at,
            processing_ms: 0,
        },
    }
}

/// Parse an RFC 3339 timestamp into a UTC instant.
///
/// Returns `None` for empty or malformed input.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    fn sample_raw(timestamp: Option<&str>) -> RawEvent {
        let mut event_data = EventData::new();
        event_data.insert("button".into(), json!("signup"));
        event_data.insert("position".into(), json!({"x": 10, "y": 20}));
        event_data.insert("tags".into(), json!(["a", "b"]));

        RawEvent {
            event_type: "click".into(),
            timestamp: timestamp.map(str::to_string),
            user_id: "user-1".into(),
            session_id: "session-1".into(),
            page_url: "https://example.com/home".into(),
            event_data,
            client_info: ClientInfo {
                user_agent: "Mozilla/5.0".into(),
                screen_resolution: "1920x1080".into(),
                language: "en-US".into(),
            },
        }
    }

    #[test]
    fn event_ids_are_unique() {
        let service = ServiceInfo::default();
        let now = Utc::now();
        let ids: HashSet<String> = (0..10_000)
            .map(|_| enrich(sample_raw(None), "req", &service, now).event_id)
            .collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn rfc3339_timestamp_is_parsed_exactly() {
        let event = enrich(
            sample_raw(Some("2024-01-15T10:30:00Z")),
            "req",
            &ServiceInfo::default(),
            Utc::now(),
        );
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(event.timestamp, expected);
    }

    #[test]
    fn offset_timestamp_is_normalized_to_utc() {
        let parsed = parse_timestamp("2024-01-15T12:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn missing_or_malformed_timestamp_falls_back_to_now() {
        for ts in [None, Some(""), Some("yesterday"), Some("2024-13-45T99:00:00Z")] {
            let before = Utc::now();
            let event = enrich(sample_raw(ts), "req", &ServiceInfo::default(), Utc::now());
            let delta = event.timestamp - before;
            assert!(
                delta >= Duration::zero() && delta < Duration::seconds(1),
                "timestamp {ts:?} should fall back to now, got delta {delta}"
            );
        }
    }

    #[test]
    fn raw_fields_are_copied_through() {
        let raw = sample_raw(None);
        let event = enrich(raw.clone(), "req-42", &ServiceInfo::default(), Utc::now());

        assert_eq!(event.request_id, "req-42");
        assert_eq!(event.event_type, raw.event_type);
        assert_eq!(event.user_id, raw.user_id);
        assert_eq!(event.session_id, raw.session_id);
        assert_eq!(event.page_url, raw.page_url);
        assert_eq!(event.event_data, raw.event_data);
        assert_eq!(event.client_info, raw.client_info);
        assert_eq!(event.processing_info.processing_ms, 0);
    }

    #[test]
    fn complete_processing_computes_elapsed_ms() {
        let received = Utc::now();
        let mut event = enrich(sample_raw(None), "req", &ServiceInfo::default(), received);

        event.complete_processing(received + Duration::milliseconds(250));

        assert_eq!(event.processing_info.processing_ms, 250);
        assert_eq!(event.processing_info.received_at, received);
        assert_eq!(
            event.processing_info.processed_at,
            received + Duration::milliseconds(250)
        );
    }

    #[test]
    fn event_data_keeps_insertion_order_through_json() {
        let event = enrich(sample_raw(None), "req", &ServiceInfo::default(), Utc::now());
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: EnrichedEvent = serde_json::from_str(&encoded).unwrap();

        let keys: Vec<&str> = decoded.event_data.keys().map(String::as_str).collect();
        assert_eq!(keys, ["button", "position", "tags"]);
        assert_eq!(decoded, event);
    }

    #[test]
    fn service_info_reads_environment_with_default() {
        let info = ServiceInfo::from_vars(|_| None);
        assert_eq!(info.service_name, SERVICE_NAME);
        assert_eq!(info.service_version, "1.0.0");
        assert_eq!(info.environment, DEFAULT_ENVIRONMENT);

        let info = ServiceInfo::from_vars(|key| (key == "APP_ENV").then(|| "production".into()));
        assert_eq!(info.environment, "production");
    }

    #[test]
    fn raw_event_accepts_minimal_json() {
        let raw: RawEvent = serde_json::from_value(json!({
            "event_type": "page_view",
            "user_id": "u",
            "session_id": "s",
            "page_url": "/"
        }))
        .unwrap();

        assert!(raw.timestamp.is_none());
        assert!(raw.event_data.is_empty());
        assert_eq!(raw.client_info, ClientInfo::default());
    }

    #[test]
    fn missing_identifiers_decode_as_empty() {
        let raw: RawEvent = serde_json::from_value(json!({"event_type": "click"})).unwrap();
        assert_eq!(raw.event_type, "click");
        assert!(raw.user_id.is_empty());
        assert!(raw.page_url.is_empty());
    }
}
