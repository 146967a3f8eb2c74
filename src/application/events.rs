//! Outbound Events
//!
//! Every event the call core publishes, with the wire names and payload
//! shapes clients depend on. Frames are `{"event": <name>, "data": <payload>}`.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::Serialize;
use serde_json::value::RawValue;

use crate::domain::{
    CallId, CallType, ChatId, ConnectionId, EndReason, ParticipantMediaState, UserId,
    UserProfile, UserStatus, VideoQuality,
};
use crate::shared::error::SignalingError;

/// Negotiation message kinds carried by the signal relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

/// Events published to topics or sent to a single connection.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    AuthReady(AuthReadyEvent),

    // Direct call lifecycle
    CallInitiated(CallInitiatedEvent),
    CallIncoming(CallIncomingEvent),
    CallAccepted(CallAcceptedEvent),
    CallDeclined(CallRefEvent),
    CallCancelled(CallRefEvent),
    CallTimeout(CallRefEvent),
    CallEnded(CallEndedEvent),

    // Negotiation relay
    Signal(SignalEvent),

    // Conferences
    ConferenceCreated(ConferenceCreatedEvent),
    ConferenceJoined(ConferenceRoster),
    ConferenceParticipantJoined(RosterChangeEvent),
    ConferenceParticipantLeft(RosterChangeEvent),
    ConferenceEnded(ConferenceEndedEvent),

    // Media
    VideoPeers(VideoPeersEvent),
    VideoParticipantJoined(MediaParticipantEvent),
    VideoParticipantLeft(ParticipantEvent),
    VideoControlChanged(VideoControlChangedEvent),
    VideoQualityChanged(VideoQualityChangedEvent),
    ScreenStarted(ParticipantEvent),
    ScreenStopped(ParticipantEvent),

    // Presence
    PresenceUpdate(PresenceUpdateEvent),
    HeartbeatAck,

    Error(ErrorEvent),
}

impl ServerEvent {
    /// Build the error event for a failed inbound event in `scope` (e.g. `call`).
    pub fn error(scope: &str, err: &SignalingError) -> Self {
        ServerEvent::Error(ErrorEvent {
            scope: scope.to_string(),
            message: err.to_string(),
            kind: err.kind(),
        })
    }

    /// Get the event name for dispatch
    pub fn event_name(&self) -> Cow<'static, str> {
        let name = match self {
            ServerEvent::AuthReady(_) => "auth:ready",
            ServerEvent::CallInitiated(_) => "call:initiated",
            ServerEvent::CallIncoming(_) => "call:incoming",
            ServerEvent::CallAccepted(_) => "call:accepted",
            ServerEvent::CallDeclined(_) => "call:declined",
            ServerEvent::CallCancelled(_) => "call:cancelled",
            ServerEvent::CallTimeout(_) => "call:timeout",
            ServerEvent::CallEnded(_) => "call:ended",
            ServerEvent::Signal(e) => match e.kind {
                SignalKind::IceCandidate => "webrtc:ice-candidate",
                SignalKind::Offer | SignalKind::Answer => "webrtc:signal",
            },
            ServerEvent::ConferenceCreated(_) => "conference:created",
            ServerEvent::ConferenceJoined(_) => "conference:joined",
            ServerEvent::ConferenceParticipantJoined(_) => "conference:participant-joined",
            ServerEvent::ConferenceParticipantLeft(_) => "conference:participant-left",
            ServerEvent::ConferenceEnded(_) => "conference:ended",
            ServerEvent::VideoPeers(_) => "video:peers",
            ServerEvent::VideoParticipantJoined(_) => "video:participant-joined",
            ServerEvent::VideoParticipantLeft(_) => "video:participant-left",
            ServerEvent::VideoControlChanged(_) => "video:control:changed",
            ServerEvent::VideoQualityChanged(_) => "video:quality:changed",
            ServerEvent::ScreenStarted(_) => "screen:started",
            ServerEvent::ScreenStopped(_) => "screen:stopped",
            ServerEvent::PresenceUpdate(_) => "presence:update",
            ServerEvent::HeartbeatAck => "presence:heartbeat-ack",
            ServerEvent::Error(e) => return Cow::Owned(format!("{}:error", e.scope)),
        };
        Cow::Borrowed(name)
    }

    /// Serialize into a complete wire frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let event = self.event_name();
        match self {
            ServerEvent::AuthReady(e) => frame(&event, e),
            ServerEvent::CallInitiated(e) => frame(&event, e),
            ServerEvent::CallIncoming(e) => frame(&event, e),
            ServerEvent::CallAccepted(e) => frame(&event, e),
            ServerEvent::CallDeclined(e) => frame(&event, e),
            ServerEvent::CallCancelled(e) => frame(&event, e),
            ServerEvent::CallTimeout(e) => frame(&event, e),
            ServerEvent::CallEnded(e) => frame(&event, e),
            ServerEvent::Signal(e) => frame(&event, e),
            ServerEvent::ConferenceCreated(e) => frame(&event, e),
            ServerEvent::ConferenceJoined(e) => frame(&event, e),
            ServerEvent::ConferenceParticipantJoined(e) => frame(&event, e),
            ServerEvent::ConferenceParticipantLeft(e) => frame(&event, e),
            ServerEvent::ConferenceEnded(e) => frame(&event, e),
            ServerEvent::VideoPeers(e) => frame(&event, e),
            ServerEvent::VideoParticipantJoined(e) => frame(&event, e),
            ServerEvent::VideoParticipantLeft(e) => frame(&event, e),
            ServerEvent::VideoControlChanged(e) => frame(&event, e),
            ServerEvent::VideoQualityChanged(e) => frame(&event, e),
            ServerEvent::ScreenStarted(e) => frame(&event, e),
            ServerEvent::ScreenStopped(e) => frame(&event, e),
            ServerEvent::PresenceUpdate(e) => frame(&event, e),
            ServerEvent::HeartbeatAck => frame(&event, &serde_json::Map::new()),
            ServerEvent::Error(e) => frame(&event, e),
        }
    }
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

fn frame<T: Serialize>(event: &str, data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame { event, data })
}

// Event payload structs

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReadyEvent {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRefEvent {
    pub call_id: CallId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInitiatedEvent {
    pub call_id: CallId,
    pub receiver_id: UserId,
    pub call_type: CallType,
    pub chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncomingEvent {
    pub call_id: CallId,
    pub caller: UserProfile,
    pub call_type: CallType,
    pub chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAcceptedEvent {
    pub call_id: CallId,
    pub participants: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndedEvent {
    pub call_id: CallId,
    pub ended_by: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EndReason>,
    /// Seconds since the call was answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEvent {
    pub call_id: CallId,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Forwarded exactly as the sender wrote it.
    pub data: Box<RawValue>,
    pub from: UserId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceCreatedEvent {
    pub call_id: CallId,
    pub creator: UserId,
    pub call_type: CallType,
    pub chat_id: ChatId,
}

/// Full conference state handed to a joiner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceRoster {
    pub call_id: CallId,
    pub chat_id: Option<ChatId>,
    pub call_type: CallType,
    pub participants: Vec<UserId>,
    pub screen_sharer_id: Option<UserId>,
    pub media: HashMap<UserId, ParticipantMediaState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterChangeEvent {
    pub call_id: CallId,
    pub user_id: UserId,
    pub participants: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceEndedEvent {
    pub call_id: CallId,
    pub chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEvent {
    pub call_id: CallId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaParticipantEvent {
    pub call_id: CallId,
    pub user_id: UserId,
    pub media: ParticipantMediaState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPeersEvent {
    pub call_id: CallId,
    pub peers: HashMap<UserId, ParticipantMediaState>,
    pub screen_sharer_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoControlChangedEvent {
    pub call_id: CallId,
    pub user_id: UserId,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQualityChangedEvent {
    pub call_id: CallId,
    pub user_id: UserId,
    pub quality: VideoQuality,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdateEvent {
    pub user_id: UserId,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    #[serde(skip)]
    pub scope: String,
    pub message: String,
    pub kind: &'static str,
}
