//! Call listing API tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{call_id_of, TestApp};

#[tokio::test]
async fn test_active_calls_requires_bearer_token() {
    let app = TestApp::new();
    let server = app.server();

    let response = server.get("/api/v1/calls/active").await;
    response.assert_status_unauthorized();

    let response = server
        .get("/api/v1/calls/active")
        .authorization_bearer("not-a-token")
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_active_calls_lists_only_own_calls() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    app.directory.befriend(3, 4);
    let mut alice = app.connect(1).await;
    let _bob = app.connect(2).await;
    let _carol = app.connect(3).await;

    alice
        .send("call:initiate", json!({ "receiverId": 2, "callType": "video" }))
        .await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    let server = app.server();

    let response = server
        .get("/api/v1/calls/active")
        .authorization_bearer("user-2")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let calls = body["calls"].as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["callId"], call_id.to_string());
    assert_eq!(calls[0]["status"], "ringing");
    assert_eq!(calls[0]["callType"], "video");
    assert_eq!(calls[0]["participants"], json!([1, 2]));

    let response = server
        .get("/api/v1/calls/active")
        .authorization_bearer("user-3")
        .await;
    let body: Value = response.json();
    assert_eq!(body["calls"], json!([]));
}
