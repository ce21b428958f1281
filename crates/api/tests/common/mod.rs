#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use ingestion_api::config::ServerConfig;
use ingestion_api::router::build_app_router;
use ingestion_api::state::AppState;
use ingestion_core::config::ProducerConfig;
use ingestion_core::event::ServiceInfo;
use ingestion_events::{EventPublisher, Lifecycle, MemoryBroker, MemoryConnector};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// A running app backed by the in-memory broker.
pub struct TestApp {
    pub router: Router,
    pub broker: MemoryBroker,
    pub lifecycle: Arc<Lifecycle>,
    pub shutdown: CancellationToken,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

/// Build the full application router with a started producer.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(MemoryBroker::new(), ProducerConfig::default()).await
}

/// Like [`build_test_app`], with a specific broker and producer config.
///
/// Uses the same router builder as `main.rs` so the middleware stack
/// (CORS, request ID, timeout, tracing, panic recovery) matches production.
pub async fn build_test_app_with(broker: MemoryBroker, producer: ProducerConfig) -> TestApp {
    let retries = producer.retries;
    let lifecycle = Arc::new(Lifecycle::new(producer));
    let handle = lifecycle
        .start(&MemoryConnector::new(broker.clone()))
        .await
        .expect("in-memory producer starts");

    let service = ServiceInfo::default();
    let shutdown = CancellationToken::new();
    let config = test_config();

    let state = AppState {
        config: Arc::new(config.clone()),
        lifecycle: Arc::clone(&lifecycle),
        publisher: EventPublisher::new(handle, service.clone()).with_max_attempts(retries),
        service: Arc::new(service),
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app_router(state, &config).expect("default CORS config is valid"),
        broker,
        lifecycle,
        shutdown,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
