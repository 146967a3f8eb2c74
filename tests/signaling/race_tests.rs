//! Concurrent transitions on one ringing call
//!
//! Both sides of each race run on separate worker threads and are released
//! together; whatever the interleaving, a call resolves exactly once.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Barrier;

use call_server::application::services::CallAction;
use call_server::domain::{CallId, CallOutcome};

use crate::common::{call_id_of, settle, TestApp, TestClient};

const ROUNDS: usize = 50;

const TERMINAL_EVENTS: [&str; 4] = ["call:declined", "call:cancelled", "call:timeout", "call:ended"];

async fn ringing_call(app: &TestApp) -> (TestClient, TestClient, CallId) {
    app.directory.befriend(1, 2);
    let mut alice = app.connect(1).await;
    let mut bob = app.connect(2).await;

    alice.send("call:initiate", json!({ "receiverId": 2 })).await;
    let call_id = call_id_of(&alice.expect_event("call:initiated"));
    bob.drain();
    (alice, bob, call_id)
}

fn terminal_events(clients: [&mut TestClient; 2]) -> Vec<String> {
    clients
        .into_iter()
        .flat_map(|client| client.event_names())
        .filter(|name| TERMINAL_EVENTS.contains(&name.as_str()))
        .collect()
}

/// Wait for the history writer to catch up with `expected` outcomes.
async fn outcomes_after_writer(app: &TestApp, expected: usize) -> Vec<(CallId, CallOutcome)> {
    for _ in 0..100 {
        if app.records.outcomes().len() >= expected {
            break;
        }
        settle().await;
    }
    // Anything extra would show up here too
    tokio::time::sleep(Duration::from_millis(20)).await;
    app.records.outcomes()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accept_racing_timeout_resolves_once() {
    for _ in 0..ROUNDS {
        let app = TestApp::new();
        let (mut alice, mut bob, call_id) = ringing_call(&app).await;
        let barrier = Arc::new(Barrier::new(2));

        let accept = {
            let core = app.state.core.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                core.calls.respond_to_call(call_id, 2, CallAction::Accept)
            })
        };
        let timeout = {
            let core = app.state.core.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                core.calls.handle_timeout(call_id);
            })
        };
        let accepted = accept.await.unwrap().is_ok();
        timeout.await.unwrap();

        let alice_events = alice.event_names();
        let timeouts = alice_events.iter().filter(|name| *name == "call:timeout").count();
        let accepts = alice_events.iter().filter(|name| *name == "call:accepted").count();
        bob.drain();

        if accepted {
            assert_eq!((accepts, timeouts), (1, 0));
            assert_eq!(app.state.core.calls_in_flight(), 1);
            assert!(app.state.core.store.has_active_direct_call(1));
            assert!(outcomes_after_writer(&app, 0).await.is_empty());
        } else {
            assert_eq!((accepts, timeouts), (0, 1));
            assert_eq!(app.state.core.calls_in_flight(), 0);
            assert!(!app.state.core.store.has_active_direct_call(1));
            assert_eq!(
                outcomes_after_writer(&app, 1).await,
                vec![(call_id, CallOutcome::Missed)]
            );
        }
        app.state.core.shutdown();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_decline_racing_cancel_resolves_once() {
    for _ in 0..ROUNDS {
        let app = TestApp::new();
        let (mut alice, mut bob, call_id) = ringing_call(&app).await;
        let barrier = Arc::new(Barrier::new(2));

        let decline = {
            let core = app.state.core.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                core.calls.respond_to_call(call_id, 2, CallAction::Decline)
            })
        };
        let cancel = {
            let core = app.state.core.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                core.calls.cancel_call(call_id, 1)
            })
        };
        let declined = decline.await.unwrap().is_ok();
        let cancelled = cancel.await.unwrap().is_ok();
        assert!(declined ^ cancelled, "exactly one transition wins");

        let terminal = terminal_events([&mut alice, &mut bob]);
        assert_eq!(terminal.len(), 1, "terminal events: {:?}", terminal);
        assert_eq!(app.state.core.calls_in_flight(), 0);

        let expected = if declined {
            CallOutcome::Declined
        } else {
            CallOutcome::Cancelled
        };
        assert_eq!(
            outcomes_after_writer(&app, 1).await,
            vec![(call_id, expected)]
        );
        app.state.core.shutdown();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_history_row_is_created_before_an_immediate_hang_up() {
    for _ in 0..ROUNDS {
        let app = TestApp::new();
        app.directory.befriend(1, 2);
        let mut alice = app.connect(1).await;
        let mut bob = app.connect(2).await;

        // Hang up as soon as the call becomes visible, before initiate returns
        let hang_up = {
            let core = app.state.core.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(call_id) = core.store.calls_for_user(2).first().copied() {
                        core.calls.end_call(call_id, 2).ok();
                        return call_id;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        alice.send("call:initiate", json!({ "receiverId": 2 })).await;
        let call_id = hang_up.await.unwrap();

        let terminal = terminal_events([&mut alice, &mut bob]);
        assert_eq!(terminal, vec!["call:ended".to_string(), "call:ended".to_string()]);

        assert_eq!(
            outcomes_after_writer(&app, 1).await,
            vec![(call_id, CallOutcome::Declined)]
        );
        assert_eq!(app.records.writes(), vec!["create:audio", "finish:declined"]);

        let distinct: BTreeSet<_> = app.records.outcomes().into_iter().map(|(id, _)| id).collect();
        assert_eq!(distinct.len(), 1);
        app.state.core.shutdown();
    }
}
