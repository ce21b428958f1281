//! Publish orchestration: enrichment plus bounded retry.
//!
//! [`EventPublisher::publish`] retries transient send failures (full queue,
//! transport errors) with a quadratic backoff of `attempt² × 100ms` between
//! attempts. Terminal failures and cancellation end the publish immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ingestion_core::event::{enrich, EnrichedEvent, RawEvent, ServiceInfo};
use ingestion_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::error::{PublishError, SendError};
use crate::producer::ProducerHandle;

/// Attempts per publish when no ceiling is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base unit of the retry backoff.
const BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// Something that can accept one enriched event per call.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_event(
        &self,
        event: &EnrichedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), SendError>;
}

#[async_trait]
impl EventSink for ProducerHandle {
    /// Events are keyed by their id.
    async fn send_event(
        &self,
        event: &EnrichedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        self.send(&event.event_id, event, cancel).await.map(|_| ())
    }
}

/// Delay before the attempt following `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_UNIT * attempt.saturating_mul(attempt)
}

/// Successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    pub attempts: u32,
}

/// What a caller gets back from [`EventPublisher::track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: String,
    pub request_id: String,
    pub processing_ms: i64,
    pub processed_at: Timestamp,
    pub attempts: u32,
}

/// Enriches raw events and publishes them through an [`EventSink`].
#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    max_attempts: u32,
    service_info: ServiceInfo,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EventSink>, service_info: ServiceInfo) -> Self {
        Self {
            sink,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            service_info,
        }
    }

    /// Set the retry ceiling. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn service_info(&self) -> &ServiceInfo {
        &self.service_info
    }

    /// Send `event`, retrying transient failures up to the ceiling.
    pub async fn publish(
        &self,
        event: &EnrichedEvent,
        cancel: &CancellationToken,
    ) -> Result<PublishAck, PublishError> {
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let err = match self.sink.send_event(event, cancel).await {
                Ok(()) => return Ok(PublishAck { attempts: attempt }),
                Err(SendError::Cancelled) => {
                    return Err(PublishError::Cancelled { attempts: attempt })
                }
                Err(err) if !err.is_transient() => return Err(PublishError::Rejected(err)),
                Err(err) => err,
            };

            tracing::warn!(
                event_id = %event.event_id,
                attempt,
                max_retries = self.max_attempts,
                error = %err,
                "Failed to send event to Kafka",
            );

            if attempt >= self.max_attempts {
                return Err(PublishError::RetriesExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PublishError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(backoff_delay(attempt)) => {}
            }

            attempt += 1;
        }
    }

    /// Enrich `raw`, publish it and report the outcome.
    ///
    /// `request_id` is the caller's correlation id and is carried on the
    /// published event. `received_at` is when the request arrived; processing
    /// time is measured from it.
    pub async fn track(
        &self,
        raw: RawEvent,
        request_id: &str,
        received_at: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        let mut event = enrich(raw, request_id, &self.service_info, received_at);

        let outcome = self.publish(&event, cancel).await;
        event.complete_processing(Utc::now());
        let info = event.processing_info;

        match outcome {
            Ok(ack) => {
                tracing::info!(
                    event_id = %event.event_id,
                    request_id = %event.request_id,
                    event_type = %event.event_type,
                    user_id = %event.user_id,
                    processing_ms = info.processing_ms,
                    attempts = ack.attempts,
                    "Event processed successfully",
                );
                Ok(PublishReceipt {
                    event_id: event.event_id,
                    request_id: event.request_id,
                    processing_ms: info.processing_ms,
                    processed_at: info.processed_at,
                    attempts: ack.attempts,
                })
            }
            Err(err) => {
                tracing::error!(
                    event_id = %event.event_id,
                    request_id = %event.request_id,
                    cause = err.cause(),
                    error = %err,
                    processing_ms = info.processing_ms,
                    "Failed to publish event",
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use tokio::time::Instant;

    use super::*;
    use ingestion_core::event::ClientInfo;

    /// Replays scripted results, then repeats `fallback` forever.
    struct ScriptedSink {
        script: Mutex<VecDeque<Result<(), SendError>>>,
        fallback: Result<(), SendError>,
        calls: AtomicU32,
    }

    impl ScriptedSink {
        fn new(script: Vec<Result<(), SendError>>, fallback: Result<(), SendError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSink for ScriptedSink {
        async fn send_event(
            &self,
            _event: &EnrichedEvent,
            _cancel: &CancellationToken,
        ) -> Result<(), SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn raw() -> RawEvent {
        RawEvent {
            event_type: "click".into(),
            timestamp: None,
            user_id: "u-1".into(),
            session_id: "s-1".into(),
            page_url: "https://example.com/pricing".into(),
            event_data: Default::default(),
            client_info: ClientInfo::default(),
        }
    }

    fn event() -> EnrichedEvent {
        enrich(raw(), "req-1", &ServiceInfo::default(), Utc::now())
    }

    fn publisher(sink: Arc<ScriptedSink>, attempts: u32) -> EventPublisher {
        EventPublisher::new(sink, ServiceInfo::default()).with_max_attempts(attempts)
    }

    #[test]
    fn backoff_is_quadratic() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
        assert_eq!(backoff_delay(3), Duration::from_millis(900));
    }

    #[test]
    fn ceiling_is_at_least_one() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        assert_eq!(publisher(sink, 0).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_transient_failures() {
        let sink = ScriptedSink::new(
            vec![Err(SendError::QueueFull), Err(SendError::Transport("leader moved".into()))],
            Ok(()),
        );
        let publisher = publisher(sink.clone(), 3);

        let started = Instant::now();
        let ack = publisher
            .publish(&event(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ack.attempts, 3);
        assert_eq!(sink.calls(), 3);
        // 100ms after the first failure, 400ms after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(510), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_ceiling() {
        let sink = ScriptedSink::new(vec![], Err(SendError::QueueFull));
        let publisher = publisher(sink.clone(), 4);

        let err = publisher
            .publish(&event(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(
            err,
            PublishError::RetriesExhausted { attempts: 4, last: SendError::QueueFull }
        );
        assert_eq!(sink.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        for terminal in [
            SendError::Closing,
            SendError::Serialization("bad".into()),
            SendError::MessageTooLarge { size: 10, max: 5 },
        ] {
            let sink = ScriptedSink::new(vec![], Err(terminal.clone()));
            let publisher = publisher(sink.clone(), 3);

            let started = Instant::now();
            let err = publisher
                .publish(&event(), &CancellationToken::new())
                .await
                .unwrap_err();

            assert_matches!(err, PublishError::Rejected(e) if e == terminal);
            assert_eq!(sink.calls(), 1);
            assert_eq!(started.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let sink = ScriptedSink::new(vec![], Err(SendError::QueueFull));
        let publisher = publisher(sink.clone(), 5);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = publisher.publish(&event(), &cancel).await.unwrap_err();

        // First backoff is 100ms, second 400ms; cancel lands in the second.
        assert_matches!(err, PublishError::Cancelled { attempts: 2 });
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(sink.calls(), 2);
    }

    #[tokio::test]
    async fn already_cancelled_context_sends_nothing() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = publisher(sink.clone(), 3)
            .publish(&event(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, PublishError::Cancelled { attempts: 0 });
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn track_returns_receipt_with_correlation_id() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let receipt = publisher(sink, 3)
            .track(raw(), "req-42", Utc::now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(receipt.request_id, "req-42");
        assert_eq!(receipt.attempts, 1);
        assert!(!receipt.event_id.is_empty());
        assert!(receipt.processing_ms >= 0);
    }

    #[tokio::test]
    async fn processing_time_counts_from_arrival() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let arrived = Utc::now() - chrono::Duration::milliseconds(250);

        let receipt = publisher(sink, 3)
            .track(raw(), "req-7", arrived, &CancellationToken::new())
            .await
            .unwrap();

        assert!(receipt.processing_ms >= 250, "processing_ms {}", receipt.processing_ms);
        assert!(receipt.processed_at > arrived);
    }
}
