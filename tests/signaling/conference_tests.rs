//! Conference roster and media scenarios

use pretty_assertions::assert_eq;
use serde_json::json;

use call_server::domain::CallOutcome;

use crate::common::{call_id_of, settle, TestApp, TestClient};

const CHAT: i64 = 10;

async fn chat_of_three(app: &TestApp) -> (TestClient, TestClient, TestClient) {
    for user_id in [1, 2, 3] {
        app.directory.add_to_chat(CHAT, user_id);
    }
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;
    let mut carol = app.connect(3).await;
    alice.drain();
    bob.drain();
    carol.drain();
    (alice, bob, carol)
}

#[tokio::test]
async fn test_conference_roster_lifecycle() {
    let app = TestApp::new();
    let (mut alice, mut bob, mut carol) = chat_of_three(&app).await;

    alice
        .send("conference:create", json!({ "chatId": CHAT, "callType": "video" }))
        .await;
    let created = alice.expect_event("conference:created");
    let call_id = call_id_of(&created);
    assert_eq!(created["creator"], 1);
    assert_eq!(created["chatId"], CHAT);
    // Chat members hear about it, the creator only once
    assert_eq!(call_id_of(&bob.expect_event("conference:created")), call_id);
    carol.drain();

    bob.send("conference:join", json!({ "callId": call_id })).await;
    let roster = bob.expect_event("conference:joined");
    assert_eq!(roster["participants"], json!([1, 2]));
    let joined = alice.expect_event("conference:participant-joined");
    assert_eq!(joined["userId"], 2);
    assert_eq!(joined["participants"], json!([1, 2]));

    // Joining again just returns the roster
    bob.send("conference:join", json!({ "callId": call_id })).await;
    assert_eq!(bob.expect_event("conference:joined")["participants"], json!([1, 2]));
    assert!(alice.drain().is_empty());

    carol.send("conference:join", json!({ "callId": call_id })).await;
    carol.expect_event("conference:joined");
    alice.drain();
    bob.drain();

    bob.send("conference:leave", json!({ "callId": call_id })).await;
    let left = alice.expect_event("conference:participant-left");
    assert_eq!(left["userId"], 2);
    assert_eq!(left["participants"], json!([1, 3]));
    carol.expect_event("conference:participant-left");

    // Leaving twice does nothing
    bob.send("conference:leave", json!({ "callId": call_id })).await;
    assert!(bob.drain().is_empty());
    assert!(alice.drain().is_empty());

    alice.send("conference:leave", json!({ "callId": call_id })).await;
    carol.drain();
    carol.send("conference:leave", json!({ "callId": call_id })).await;

    // The last one out ends it for the whole chat
    let ended = bob.expect_event("conference:ended");
    assert_eq!(call_id_of(&ended), call_id);
    assert_eq!(app.state.core.calls_in_flight(), 0);

    settle().await;
    assert_eq!(app.records.outcomes(), vec![(call_id, CallOutcome::Completed)]);
}

#[tokio::test]
async fn test_conference_requires_chat_membership() {
    let app = TestApp::new();
    let (mut alice, _bob, _carol) = chat_of_three(&app).await;
    let mut mallory = app.connect(9).await;

    mallory
        .send("conference:create", json!({ "chatId": CHAT }))
        .await;
    assert_eq!(mallory.expect_event("conference:error")["kind"], "access_denied");

    alice.send("conference:create", json!({ "chatId": CHAT })).await;
    let call_id = call_id_of(&alice.expect_event("conference:created"));

    mallory
        .send("conference:join", json!({ "callId": call_id }))
        .await;
    assert_eq!(mallory.expect_event("conference:error")["kind"], "access_denied");

    // One conference at a time
    alice.send("conference:create", json!({ "chatId": CHAT })).await;
    assert_eq!(alice.expect_event("conference:error")["kind"], "already_in_call");
}

#[tokio::test]
async fn test_media_state_is_shared_with_peers() {
    let app = TestApp::new();
    let (mut alice, mut bob, mut carol) = chat_of_three(&app).await;

    alice
        .send("conference:create", json!({ "chatId": CHAT, "callType": "video" }))
        .await;
    let call_id = call_id_of(&alice.expect_event("conference:created"));
    bob.send("conference:join", json!({ "callId": call_id })).await;
    alice.drain();
    bob.drain();
    carol.drain();

    alice
        .send("video:join", json!({ "callId": call_id, "hasVideo": true }))
        .await;
    let peers = alice.expect_event("video:peers");
    assert_eq!(peers["peers"], json!({}));

    bob.send(
        "video:join",
        json!({ "callId": call_id, "hasVideo": false, "quality": "low" }),
    )
    .await;
    let peers = bob.expect_event("video:peers");
    assert_eq!(peers["peers"]["1"]["hasVideo"], true);
    let joined = alice.expect_event("video:participant-joined");
    assert_eq!(joined["userId"], 2);
    assert_eq!(joined["media"]["quality"], "low");

    bob.send(
        "video:control",
        json!({ "callId": call_id, "kind": "audio", "enabled": false }),
    )
    .await;
    let changed = alice.expect_event("video:control:changed");
    assert_eq!(changed["userId"], 2);
    assert_eq!(changed["hasAudio"], false);
    assert!(bob.drain().is_empty());

    bob.send("screen:start", json!({ "callId": call_id })).await;
    assert_eq!(alice.expect_event("screen:started")["userId"], 2);

    alice.send("screen:start", json!({ "callId": call_id })).await;
    assert_eq!(alice.expect_event("screen:error")["kind"], "invalid_transition");

    // Non-participants are ignored
    carol.send("screen:stop", json!({ "callId": call_id })).await;
    assert!(carol.drain().is_empty());

    bob.send("video:leave", json!({ "callId": call_id })).await;
    let names = alice.event_names();
    assert!(names.contains(&"screen:stopped".to_string()));
    assert!(names.contains(&"video:participant-left".to_string()));
}

#[tokio::test]
async fn test_end_call_closes_conference_for_everyone() {
    let app = TestApp::new();
    let (mut alice, mut bob, mut carol) = chat_of_three(&app).await;

    alice.send("conference:create", json!({ "chatId": CHAT })).await;
    let call_id = call_id_of(&alice.expect_event("conference:created"));
    bob.send("conference:join", json!({ "callId": call_id })).await;
    alice.drain();
    bob.drain();
    carol.drain();

    bob.send("call:end", json!({ "callId": call_id })).await;

    assert_eq!(alice.expect_event("call:ended")["endedBy"], 2);
    assert_eq!(call_id_of(&carol.expect_event("conference:ended")), call_id);
    assert_eq!(app.state.core.calls_in_flight(), 0);
}
