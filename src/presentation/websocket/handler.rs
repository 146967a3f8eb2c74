//! WebSocket Connection Handler
//!
//! Drives one connection: authenticate with the first `auth` event, register
//! with the gateway and presence, then feed inbound frames to the dispatcher
//! until the socket closes or the heartbeat lapses.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use super::dispatcher;
use super::gateway::OutboundFrame;
use super::messages::{ClientEvent, ClientFrame};
use super::session::SessionState;
use crate::application::events::AuthReadyEvent;
use crate::application::{Broadcaster, ServerEvent};
use crate::domain::UserId;
use crate::infrastructure::metrics;
use crate::shared::error::SignalingError;
use crate::startup::AppState;

/// Grace added to the heartbeat interval before a silent connection is dropped
const HEARTBEAT_GRACE_MS: u64 = 10_000;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limits = &state.settings.websocket;
    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Result of the identify phase
enum Identify {
    Authenticated(UserId),
    Rejected,
    Closed,
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let mut session = SessionState::new(connection_id);

    tracing::debug!(connection_id = %connection_id, "New WebSocket connection");

    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Frames are encoded once by the gateway and shared between recipients
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender
                .send(Message::Text(frame.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Wait for auth (with timeout)
    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let user_id = match timeout(identify_timeout, identify(&mut receiver, &tx, &state)).await {
        Ok(Identify::Authenticated(user_id)) => user_id,
        Ok(Identify::Rejected) => {
            tracing::debug!(connection_id = %connection_id, "Authentication rejected");
            // Let the sender flush auth:error, then close
            drop(tx);
            let _ = sender_task.await;
            return;
        }
        Ok(Identify::Closed) => {
            tracing::debug!(connection_id = %connection_id, "Connection closed before auth");
            sender_task.abort();
            return;
        }
        Err(_) => {
            tracing::debug!(connection_id = %connection_id, "Auth timeout");
            send_direct(
                &tx,
                &ServerEvent::error("auth", &SignalingError::Unauthenticated),
            );
            drop(tx);
            let _ = sender_task.await;
            return;
        }
    };

    session.identify(user_id);

    state
        .gateway
        .register_connection(connection_id, user_id, tx.clone());
    metrics::websocket_connected();
    state
        .core
        .presence
        .register_connection(user_id, connection_id)
        .await;

    state.gateway.send_to_connection(
        connection_id,
        ServerEvent::AuthReady(AuthReadyEvent {
            user_id,
            connection_id,
        }),
    );

    tracing::info!(
        user_id = user_id,
        connection_id = %connection_id,
        "User connected and authenticated"
    );

    let heartbeat_interval_ms = state.gateway.heartbeat_interval();
    let timeout_ms = heartbeat_interval_ms + HEARTBEAT_GRACE_MS;
    let mut heartbeat_check = interval(Duration::from_millis(timeout_ms));
    heartbeat_check.tick().await; // Skip first immediate tick

    // Main message loop
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) =
                            dispatcher::handle_text(&state.core, &mut session, text.as_str()).await
                        {
                            state.gateway.send_to_connection(connection_id, reply);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pong replies are sent automatically by axum
                        dispatcher::handle_keepalive(&state.core, &mut session).await;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat_check.tick() => {
                if !session.is_alive(timeout_ms) {
                    tracing::info!(
                        connection_id = %connection_id,
                        "Heartbeat timeout, closing connection"
                    );
                    break;
                }
            }
        }
    }

    // Cleanup
    state.gateway.unregister_connection(&connection_id);
    state
        .core
        .presence
        .unregister_connection(user_id, connection_id);
    metrics::websocket_disconnected();
    sender_task.abort();

    tracing::info!(
        user_id = user_id,
        connection_id = %connection_id,
        "User disconnected"
    );
}

/// Read frames until a valid `auth` event arrives.
///
/// Anything else is answered with an unauthenticated error in its own
/// namespace. A bad credential ends the connection.
async fn identify(
    receiver: &mut SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<OutboundFrame>,
    state: &AppState,
) -> Identify {
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return Identify::Closed,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                let err = SignalingError::Validation(format!("Invalid frame: {}", e));
                send_direct(tx, &ServerEvent::error("gateway", &err));
                continue;
            }
        };

        if frame.event != "auth" {
            send_direct(
                tx,
                &ServerEvent::error(frame.scope(), &SignalingError::Unauthenticated),
            );
            continue;
        }

        let token = match ClientEvent::parse(&frame) {
            Ok(ClientEvent::Auth(payload)) => payload.token,
            Ok(_) => continue,
            Err(err) => {
                send_direct(tx, &ServerEvent::error("auth", &err));
                return Identify::Rejected;
            }
        };

        return match state.identity.verify(&token) {
            Ok(user_id) => Identify::Authenticated(user_id),
            Err(e) => {
                tracing::debug!(error = %e, "Invalid token");
                send_direct(tx, &ServerEvent::error("auth", &SignalingError::from(e)));
                Identify::Rejected
            }
        };
    }
    Identify::Closed
}

/// Queue an event for a connection that is not registered with the gateway yet.
fn send_direct(tx: &mpsc::UnboundedSender<OutboundFrame>, event: &ServerEvent) {
    match event.to_frame() {
        Ok(frame) => {
            let _ = tx.send(frame.into());
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
    }
}
