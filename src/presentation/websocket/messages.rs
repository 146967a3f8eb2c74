//! WebSocket Message Types
//!
//! Inbound frames are `{"event": <name>, "data": <payload>}`. The envelope is
//! decoded first with the payload kept raw, then the payload is decoded into
//! the type its event name calls for. Negotiation payloads stay raw all the
//! way to the receiving peer.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use validator::Validate;

use crate::application::events::SignalKind;
use crate::application::services::CallAction;
use crate::domain::{
    CallId, CallType, ChatId, MediaToggle, ParticipantMediaState, UserId, UserStatus,
    VideoQuality,
};
use crate::shared::error::SignalingError;
use crate::shared::validation::validation_error;

/// Incoming frame envelope
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl ClientFrame {
    /// Namespace used for error replies: `call:initiate` → `call`.
    pub fn scope(&self) -> &str {
        event_scope(&self.event)
    }
}

pub fn event_scope(event: &str) -> &str {
    event.split(':').next().unwrap_or(event)
}

/// Identify payload
#[derive(Debug, Deserialize, Validate)]
pub struct AuthPayload {
    #[validate(length(min = 1, max = 4096, message = "Token must not be empty"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallPayload {
    #[validate(range(min = 1, message = "Invalid receiver"))]
    pub receiver_id: UserId,
    #[serde(default)]
    pub call_type: CallType,
    #[validate(range(min = 1, message = "Invalid chat"))]
    pub chat_id: Option<ChatId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponsePayload {
    pub call_id: CallId,
    pub action: CallAction,
}

/// Payload that only names a call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRefPayload {
    pub call_id: CallId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub call_id: CallId,
    #[serde(rename = "type")]
    pub kind: Option<SignalKind>,
    pub data: Box<RawValue>,
    pub target_user_id: Option<UserId>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConferencePayload {
    #[validate(range(min = 1, message = "Invalid chat"))]
    pub chat_id: ChatId,
    #[serde(default)]
    pub call_type: CallType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJoinPayload {
    pub call_id: CallId,
    pub has_video: Option<bool>,
    pub has_audio: Option<bool>,
    pub quality: Option<VideoQuality>,
}

impl VideoJoinPayload {
    pub fn initial_state(&self) -> ParticipantMediaState {
        let defaults = ParticipantMediaState::default();
        ParticipantMediaState {
            has_video: self.has_video.unwrap_or(defaults.has_video),
            has_audio: self.has_audio.unwrap_or(defaults.has_audio),
            quality: self.quality.unwrap_or(defaults.quality),
            is_screen_sharing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Video,
    Audio,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoControlPayload {
    pub call_id: CallId,
    pub kind: ControlKind,
    pub enabled: bool,
}

impl VideoControlPayload {
    pub fn toggle(&self) -> MediaToggle {
        match self.kind {
            ControlKind::Video => MediaToggle::Video(self.enabled),
            ControlKind::Audio => MediaToggle::Audio(self.enabled),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQualityPayload {
    pub call_id: CallId,
    pub quality: VideoQuality,
}

#[derive(Debug, Deserialize)]
pub struct PresenceStatusPayload {
    pub status: UserStatus,
}

/// A decoded inbound event
#[derive(Debug)]
pub enum ClientEvent {
    Auth(AuthPayload),
    InitiateCall(InitiateCallPayload),
    RespondToCall(CallResponsePayload),
    EndCall(CallRefPayload),
    CancelCall(CallRefPayload),
    Signal {
        kind: SignalKind,
        payload: SignalPayload,
    },
    CreateConference(CreateConferencePayload),
    JoinConference(CallRefPayload),
    LeaveConference(CallRefPayload),
    VideoJoin(VideoJoinPayload),
    VideoLeave(CallRefPayload),
    VideoControl(VideoControlPayload),
    VideoQuality(VideoQualityPayload),
    ScreenStart(CallRefPayload),
    ScreenStop(CallRefPayload),
    PresenceStatus(PresenceStatusPayload),
    Heartbeat,
}

impl ClientEvent {
    /// Decode the payload for the frame's event name.
    pub fn parse(frame: &ClientFrame) -> Result<Self, SignalingError> {
        let data = frame.data.as_deref();
        let event = match frame.event.as_str() {
            "auth" => {
                let payload: AuthPayload = decode(data)?;
                payload.validate().map_err(validation_error)?;
                ClientEvent::Auth(payload)
            }
            "call:initiate" => {
                let payload: InitiateCallPayload = decode(data)?;
                payload.validate().map_err(validation_error)?;
                ClientEvent::InitiateCall(payload)
            }
            "call:response" => ClientEvent::RespondToCall(decode(data)?),
            "call:end" => ClientEvent::EndCall(decode(data)?),
            "call:cancel" => ClientEvent::CancelCall(decode(data)?),
            "webrtc:signal" => {
                let payload: SignalPayload = decode(data)?;
                let kind = payload.kind.ok_or_else(|| {
                    SignalingError::Validation(
                        "type must be offer, answer or ice-candidate".into(),
                    )
                })?;
                ClientEvent::Signal { kind, payload }
            }
            "webrtc:ice-candidate" => ClientEvent::Signal {
                kind: SignalKind::IceCandidate,
                payload: decode(data)?,
            },
            "conference:create" => {
                let payload: CreateConferencePayload = decode(data)?;
                payload.validate().map_err(validation_error)?;
                ClientEvent::CreateConference(payload)
            }
            "conference:join" => ClientEvent::JoinConference(decode(data)?),
            "conference:leave" => ClientEvent::LeaveConference(decode(data)?),
            "video:join" => ClientEvent::VideoJoin(decode(data)?),
            "video:leave" => ClientEvent::VideoLeave(decode(data)?),
            "video:control" => ClientEvent::VideoControl(decode(data)?),
            "video:quality" => ClientEvent::VideoQuality(decode(data)?),
            "screen:start" => ClientEvent::ScreenStart(decode(data)?),
            "screen:stop" => ClientEvent::ScreenStop(decode(data)?),
            "presence:status" => ClientEvent::PresenceStatus(decode(data)?),
            "presence:heartbeat" => ClientEvent::Heartbeat,
            other => {
                return Err(SignalingError::Validation(format!(
                    "Unknown event: {}",
                    other
                )))
            }
        };
        Ok(event)
    }
}

fn decode<T: DeserializeOwned>(data: Option<&RawValue>) -> Result<T, SignalingError> {
    let raw = data.map(RawValue::get).unwrap_or("{}");
    serde_json::from_str(raw).map_err(|e| SignalingError::Validation(e.to_string()))
}
