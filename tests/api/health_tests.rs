//! Health Check API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::TestApp;

/// Test basic health check endpoint returns 200 OK
#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body.get("version").is_some());
}

/// Test liveness probe endpoint
#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/health/live").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "alive");
}

/// Readiness stays up without a database and reports gateway load
#[tokio::test]
async fn test_readiness_reports_signaling_load() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let _alice = app.connect(1).await;
    let _bob = app.connect(2).await;
    let server = app.server();

    let response = server.get("/health/ready").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["database"]["status"], "unhealthy");
    assert_eq!(body["checks"]["signaling"]["active_connections"], 2);
    assert_eq!(body["checks"]["signaling"]["online_users"], 2);
    assert_eq!(body["checks"]["signaling"]["calls_in_flight"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_call_metrics() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    alice
        .send("call:initiate", serde_json::json!({ "receiverId": 2 }))
        .await;
    let server = app.server();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("call_server_calls_started_total"));
}
