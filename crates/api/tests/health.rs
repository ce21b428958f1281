//! Integration tests for the health, status and stats endpoints and general
//! HTTP behaviour.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get, post_json};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health is 200 while the producer runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = common::build_test_app().await;
    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "ingestion-service");
    assert_eq!(json["version"], "1.0.0");
    assert!(json["timestamp"].is_string());
}

// ---------------------------------------------------------------------------
// Test: GET /health is 503 once the producer has shut down
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_fails_after_shutdown() {
    let app = common::build_test_app().await;
    app.lifecycle
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reports_running() {
    let app = common::build_test_app().await;
    let response = get(&app, "/api/v1/status").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["service"], "ingestion-service");
    assert_eq!(json["message"], "Service is ready to receive events");
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/stats reflects producer settings and counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_report_producer_configuration() {
    let app = common::build_test_app().await;

    let event = r#"{"event_type":"page_view","user_id":"u","session_id":"s","page_url":"/"}"#;
    let response = post_json(&app, "/api/v1/events/track", event).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(get(&app, "/api/v1/stats").await).await;
    assert_eq!(json["service"], "ingestion-service");
    assert_eq!(json["version"], "1.0.0");

    let kafka = &json["kafka"];
    assert_eq!(kafka["status"], "active");
    assert_eq!(kafka["topic"], "user-activity-events");
    assert_eq!(kafka["brokers"][0], "localhost:9092");
    assert_eq!(kafka["compression"], "snappy");
    assert_eq!(kafka["acks"], "all");
    assert_eq!(kafka["retries"], 3);
    assert_eq!(kafka["deliveries"]["enqueued"], 1);
}

#[tokio::test]
async fn stats_after_shutdown_report_closed() {
    let app = common::build_test_app().await;
    app.lifecycle
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();

    let json = body_json(get(&app, "/api/v1/stats").await).await;
    assert_eq!(json["kafka"]["status"], "closed");
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = common::build_test_app().await;
    let response = get(&app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is generated and propagated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_generated_request_id() {
    let app = common::build_test_app().await;
    let response = get(&app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("response must carry x-request-id")
        .to_str()
        .unwrap();
    assert_eq!(request_id.len(), 36, "expected a UUID, got {request_id}");
}

#[tokio::test]
async fn client_request_id_is_echoed() {
    let app = common::build_test_app().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "client-supplied-id")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "client-supplied-id");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let app = common::build_test_app().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/events/track")
        .header("origin", "http://frontend.test")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let methods = response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"), "allowed methods: {methods}");
}
