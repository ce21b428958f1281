/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Ordered key→value payload carried in [`RawEvent::event_data`](crate::event::RawEvent).
pub type EventData = indexmap::IndexMap<String, serde_json::Value>;
