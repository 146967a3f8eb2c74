//! Negotiation relay scenarios

use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

use crate::common::{call_id_of, TestApp};

#[tokio::test]
async fn test_ice_candidates_reach_only_the_target() {
    let app = TestApp::new();
    for user_id in [1, 2, 3] {
        app.directory.add_to_chat(20, user_id);
    }
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;
    let mut carol = app.connect(3).await;

    alice.send("conference:create", json!({ "chatId": 20 })).await;
    let call_id = call_id_of(&alice.expect_event("conference:created"));
    bob.send("conference:join", json!({ "callId": call_id })).await;
    carol.send("conference:join", json!({ "callId": call_id })).await;
    alice.drain();
    bob.drain();
    carol.drain();

    alice
        .send(
            "webrtc:ice-candidate",
            json!({
                "callId": call_id,
                "data": { "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host", "sdpMLineIndex": 0 },
                "targetUserId": 3
            }),
        )
        .await;

    let candidate = carol.expect_event("webrtc:ice-candidate");
    assert_eq!(candidate["from"], 1);
    assert_eq!(candidate["type"], "ice-candidate");
    assert_eq!(candidate["data"]["sdpMLineIndex"], 0);
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn test_signal_payload_is_forwarded_byte_for_byte() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.drain();

    // Relaying is allowed while the call is still ringing
    let frame = format!(
        r#"{{"event":"webrtc:signal","data":{{"callId":"{}","type":"answer","data":{{"sdp":"v=0","ratio":1.50}}}}}}"#,
        call_id
    );
    alice.send_raw(&frame).await;

    let raw = bob.drain_raw();
    assert_eq!(raw.len(), 1);
    assert!(raw[0].contains(r#""data":{"sdp":"v=0","ratio":1.50}"#));
}

#[tokio::test]
async fn test_signals_from_outsiders_are_dropped() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    app.directory.befriend(3, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;
    let mut mallory = app.connect(3).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.drain();

    mallory
        .send(
            "webrtc:signal",
            json!({ "callId": call_id, "type": "offer", "data": {}, "targetUserId": 2 }),
        )
        .await;
    mallory
        .send(
            "webrtc:signal",
            json!({ "callId": Uuid::new_v4(), "type": "offer", "data": {} }),
        )
        .await;
    // Targets outside the call are dropped too
    alice
        .send(
            "webrtc:signal",
            json!({ "callId": call_id, "type": "offer", "data": {}, "targetUserId": 3 }),
        )
        .await;

    assert!(bob.drain().is_empty());
    assert!(mallory.drain().is_empty());
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_ice_candidate_sent_as_signal_keeps_its_event_name() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.drain();

    alice
        .send(
            "webrtc:signal",
            json!({ "callId": call_id, "type": "ice-candidate", "data": { "candidate": "a" } }),
        )
        .await;

    let candidate = bob.expect_event("webrtc:ice-candidate");
    assert_eq!(candidate["type"], "ice-candidate");
    assert_eq!(candidate["data"]["candidate"], "a");
    assert!(alice.drain().is_empty());
}
