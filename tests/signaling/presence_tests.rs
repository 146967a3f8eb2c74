//! Presence scenarios: multi-connection users, grace period and disconnects

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use call_server::domain::{CallOutcome, UserStatus};

use crate::common::{call_id_of, settle, TestApp, OFFLINE_GRACE};

#[tokio::test(start_paused = true)]
async fn test_friends_see_online_then_offline_after_grace() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;

    let bob = app.connect(2).await;
    let update = alice.expect_event("presence:update");
    assert_eq!(update["userId"], 2);
    assert_eq!(update["status"], "online");

    bob.disconnect();
    settle().await;
    // Still inside the grace period
    assert!(alice.drain().is_empty());
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Online);

    tokio::time::sleep(OFFLINE_GRACE).await;
    settle().await;

    let update = alice.expect_event("presence:update");
    assert_eq!(update["userId"], 2);
    assert_eq!(update["status"], "offline");
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_quick_reconnect_does_not_flap() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let bob = app.connect(2).await;
    alice.drain();

    bob.disconnect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let _bob = app.connect(2).await;

    tokio::time::sleep(OFFLINE_GRACE * 2).await;
    settle().await;

    assert!(alice.drain().is_empty());
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn test_second_tab_keeps_call_alive() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob_laptop = app.connect(2).await;
    let mut bob_phone = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    // Every connection of the receiver rings
    bob_laptop.expect_event("call:incoming");
    bob_phone.expect_event("call:incoming");

    bob_phone
        .send("call:response", json!({ "callId": call_id, "action": "accept" }))
        .await;
    alice.drain();

    bob_laptop.disconnect();
    settle().await;

    assert_eq!(app.state.core.calls_in_flight(), 1);
    assert!(alice.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_last_disconnect_ends_active_call() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.send("call:response", json!({ "callId": call_id, "action": "accept" }))
        .await;
    alice.drain();

    bob.disconnect();

    // The call ends right away, presence only after the grace period
    let ended = alice.expect_event("call:ended");
    assert_eq!(ended["endedBy"], 2);
    assert_eq!(ended["reason"], "user_disconnected");
    assert_eq!(app.state.core.calls_in_flight(), 0);

    settle().await;
    assert_eq!(app.records.outcomes(), vec![(call_id, CallOutcome::Completed)]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_leaves_conference() {
    let app = TestApp::new();
    for user_id in [1, 2] {
        app.directory.add_to_chat(30, user_id);
    }
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("conference:create", json!({ "chatId": 30 })).await;
    let call_id = call_id_of(&alice.expect_event("conference:created"));
    bob.send("conference:join", json!({ "callId": call_id })).await;
    alice.drain();

    bob.disconnect();

    let left = alice.expect_event("conference:participant-left");
    assert_eq!(left["userId"], 2);
    assert_eq!(left["participants"], json!([1]));
    assert_eq!(app.state.core.calls_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invisible_status_looks_offline_to_friends() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;
    alice.drain();

    bob.send("presence:status", json!({ "status": "invisible" })).await;
    assert_eq!(alice.expect_event("presence:update")["status"], "offline");

    bob.send("presence:status", json!({ "status": "busy" })).await;
    assert_eq!(alice.expect_event("presence:update")["status"], "busy");

    // No change, no update
    bob.send("presence:status", json!({ "status": "busy" })).await;
    assert!(alice.drain().is_empty());

    bob.send("presence:status", json!({ "status": "sleeping" })).await;
    assert_eq!(bob.expect_event("presence:error")["kind"], "validation");
}

#[tokio::test(start_paused = true)]
async fn test_idle_users_are_swept() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.send("call:response", json!({ "callId": call_id, "action": "accept" }))
        .await;

    // Alice keeps sending heartbeats, Bob goes quiet
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        alice.send("presence:heartbeat", json!({})).await;
    }
    settle().await;

    let frames = alice.drain();
    let ended = frames
        .iter()
        .find(|frame| frame["event"] == "call:ended")
        .expect("call ended by sweep");
    assert_eq!(ended["data"]["reason"], "inactive");
    assert!(frames
        .iter()
        .any(|frame| frame["event"] == "presence:update" && frame["data"]["status"] == "offline"));
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Offline);
    assert_eq!(app.state.core.calls_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pings_alone_keep_a_call_alive() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.send("call:response", json!({ "callId": call_id, "action": "accept" }))
        .await;
    alice.drain();
    bob.drain();

    // Negotiation is over; only keepalives flow for ten minutes
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        alice.ping().await;
        bob.ping().await;
    }
    settle().await;

    assert!(alice.drain().is_empty());
    assert!(bob.drain().is_empty());
    assert_eq!(app.state.core.calls_in_flight(), 1);
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn test_swept_user_who_comes_back_still_cleans_up_on_disconnect() {
    let app = TestApp::new();
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    // Bob idles past the threshold while his socket stays open
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        alice.send("presence:heartbeat", json!({})).await;
    }
    settle().await;
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Offline);
    alice.drain();

    // Any frame brings him back
    bob.send("presence:heartbeat", json!({})).await;
    assert_eq!(app.state.core.presence.status_of(2), UserStatus::Online);
    assert_eq!(alice.expect_event("presence:update")["status"], "online");

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.send("call:response", json!({ "callId": call_id, "action": "accept" }))
        .await;
    alice.drain();

    bob.disconnect();

    assert_eq!(alice.expect_event("call:ended")["reason"], "user_disconnected");
    assert_eq!(app.state.core.calls_in_flight(), 0);
    assert!(!app.state.core.store.has_active_direct_call(1));
}
