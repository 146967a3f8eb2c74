//! Inbound event dispatch.
//!
//! Routes each decoded event of an authenticated connection to the call core.
//! Failures never close the connection; they come back as an error event in
//! the namespace of the event that caused them.

use crate::application::events::ServerEvent;
use crate::application::CallCore;
use crate::domain::{MediaToggle, UserId};
use crate::shared::error::SignalingError;

use super::messages::{event_scope, ClientEvent, ClientFrame};
use super::session::SessionState;

/// Handle one text frame. Returns the reply for this connection, if any.
pub async fn handle_text(
    core: &CallCore,
    session: &mut SessionState,
    text: &str,
) -> Option<ServerEvent> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            let err = SignalingError::Validation(format!("Invalid frame: {}", e));
            return Some(ServerEvent::error("gateway", &err));
        }
    };

    let Some(user_id) = session.user_id else {
        return Some(ServerEvent::error(
            frame.scope(),
            &SignalingError::Unauthenticated,
        ));
    };

    session.heartbeat();
    core.presence.touch(user_id).await;

    match dispatch(core, session, user_id, &frame).await {
        Ok(reply) => reply,
        Err(err) => {
            tracing::debug!(
                user_id,
                connection_id = %session.connection_id,
                event = %frame.event,
                error = %err,
                "Event rejected"
            );
            Some(ServerEvent::error(event_scope(&frame.event), &err))
        }
    }
}

/// Handle a transport-level keepalive (ping or pong frame).
pub async fn handle_keepalive(core: &CallCore, session: &mut SessionState) {
    session.heartbeat();
    if let Some(user_id) = session.user_id {
        core.presence.touch(user_id).await;
    }
}

async fn dispatch(
    core: &CallCore,
    session: &mut SessionState,
    user_id: UserId,
    frame: &ClientFrame,
) -> Result<Option<ServerEvent>, SignalingError> {
    match ClientEvent::parse(frame)? {
        ClientEvent::Auth(_) => Err(SignalingError::InvalidTransition(
            "Connection is already authenticated".into(),
        )),

        ClientEvent::InitiateCall(p) => {
            core.calls
                .initiate_call(user_id, p.receiver_id, p.call_type, p.chat_id)
                .await?;
            Ok(None)
        }
        ClientEvent::RespondToCall(p) => {
            core.calls.respond_to_call(p.call_id, user_id, p.action)?;
            Ok(None)
        }
        ClientEvent::EndCall(p) => {
            core.calls.end_call(p.call_id, user_id)?;
            Ok(None)
        }
        ClientEvent::CancelCall(p) => {
            core.calls.cancel_call(p.call_id, user_id)?;
            Ok(None)
        }

        ClientEvent::Signal { kind, payload } => {
            core.relay.relay(
                user_id,
                payload.call_id,
                kind,
                payload.data,
                payload.target_user_id,
            );
            Ok(None)
        }

        ClientEvent::CreateConference(p) => {
            core.conferences
                .create_conference(user_id, p.chat_id, p.call_type)
                .await?;
            Ok(None)
        }
        ClientEvent::JoinConference(p) => {
            let roster = core.conferences.join_conference(user_id, p.call_id).await?;
            Ok(Some(ServerEvent::ConferenceJoined(roster)))
        }
        ClientEvent::LeaveConference(p) => {
            core.conferences.leave_conference(user_id, p.call_id);
            Ok(None)
        }

        ClientEvent::VideoJoin(p) => Ok(core
            .conferences
            .start_media(p.call_id, user_id, session.connection_id, p.initial_state())
            .map(ServerEvent::VideoPeers)),
        ClientEvent::VideoLeave(p) => {
            core.conferences.stop_media(p.call_id, user_id);
            Ok(None)
        }
        ClientEvent::VideoControl(p) => {
            core.conferences.toggle_media(p.call_id, user_id, p.toggle())?;
            Ok(None)
        }
        ClientEvent::VideoQuality(p) => {
            core.conferences
                .toggle_media(p.call_id, user_id, MediaToggle::Quality(p.quality))?;
            Ok(None)
        }
        ClientEvent::ScreenStart(p) => {
            core.conferences
                .toggle_media(p.call_id, user_id, MediaToggle::ScreenSharing(true))?;
            Ok(None)
        }
        ClientEvent::ScreenStop(p) => {
            core.conferences
                .toggle_media(p.call_id, user_id, MediaToggle::ScreenSharing(false))?;
            Ok(None)
        }

        ClientEvent::PresenceStatus(p) => {
            core.presence.set_status(user_id, p.status).await;
            Ok(None)
        }
        ClientEvent::Heartbeat => Ok(Some(ServerEvent::HeartbeatAck)),
    }
}
