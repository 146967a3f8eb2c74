//! Call Session entity and the call-record repository trait.
//!
//! A `CallSession` is the in-memory authoritative record of a call that is
//! ringing or in progress. Ended calls never stay in memory; what survives
//! them is the `CallRecord` handed to the persistence collaborator.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;

/// User identifier (bigint key of the surrounding application).
pub type UserId = i64;

/// Chat identifier (bigint key of the surrounding application).
pub type ChatId = i64;

/// Call identifier.
pub type CallId = Uuid;

/// Media kind of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Audio,
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Lifecycle status of a session held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a call was resolved. Every outcome is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// Answered (or a conference) and later ended.
    Completed,
    Declined,
    Cancelled,
    /// Ringing window elapsed without a response.
    Missed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Missed => "missed",
        }
    }
}

/// Why a call was ended on a participant's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The participant's last connection went away.
    UserDisconnected,
    /// The presence sweep found the participant idle past the threshold.
    Inactive,
}

/// Requested stream quality for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
    #[default]
    Auto,
}

/// Per-participant media flags for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMediaState {
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: VideoQuality,
    pub is_screen_sharing: bool,
}

impl Default for ParticipantMediaState {
    fn default() -> Self {
        Self {
            has_video: false,
            has_audio: true,
            quality: VideoQuality::Auto,
            is_screen_sharing: false,
        }
    }
}

/// A single media flag change requested by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaToggle {
    Video(bool),
    Audio(bool),
    Quality(VideoQuality),
    ScreenSharing(bool),
}

/// In-memory state of a ringing or in-progress call.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    /// Caller of a direct call, creator of a conference.
    pub initiator_id: UserId,
    pub participants: BTreeSet<UserId>,
    pub call_type: CallType,
    pub status: CallStatus,
    pub chat_id: Option<ChatId>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_conference: bool,
    pub screen_sharer_id: Option<UserId>,
    pub media: HashMap<UserId, ParticipantMediaState>,
}

impl CallSession {
    /// Create a ringing direct call between two users.
    pub fn direct(
        caller_id: UserId,
        receiver_id: UserId,
        call_type: CallType,
        chat_id: Option<ChatId>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            initiator_id: caller_id,
            participants: BTreeSet::from([caller_id, receiver_id]),
            call_type,
            status: CallStatus::Ringing,
            chat_id,
            created_at: Utc::now(),
            accepted_at: None,
            ended_at: None,
            is_conference: false,
            screen_sharer_id: None,
            media: HashMap::new(),
        }
    }

    /// Create an active conference with the creator as its only participant.
    pub fn conference(creator_id: UserId, chat_id: ChatId, call_type: CallType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            initiator_id: creator_id,
            participants: BTreeSet::from([creator_id]),
            call_type,
            status: CallStatus::Active,
            chat_id: Some(chat_id),
            created_at: now,
            accepted_at: Some(now),
            ended_at: None,
            is_conference: true,
            screen_sharer_id: None,
            media: HashMap::new(),
        }
    }

    /// The callee of a direct call. Conferences have no receiver.
    pub fn receiver_id(&self) -> Option<UserId> {
        if self.is_conference {
            return None;
        }
        self.participants
            .iter()
            .copied()
            .find(|id| *id != self.initiator_id)
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_ringing(&self) -> bool {
        self.status == CallStatus::Ringing
    }

    pub fn is_ended(&self) -> bool {
        self.status == CallStatus::Ended
    }

    pub fn participant_list(&self) -> Vec<UserId> {
        self.participants.iter().copied().collect()
    }

    /// Mark the session ended. Returns the answered duration in whole seconds.
    pub fn mark_ended(&mut self, at: DateTime<Utc>) -> Option<i64> {
        self.status = CallStatus::Ended;
        self.ended_at = Some(at);
        self.accepted_at
            .map(|accepted| (at - accepted).num_seconds().max(0))
    }

    /// Apply a media flag change, creating default state on first use.
    ///
    /// Returns the updated state for the participant.
    pub fn apply_media(&mut self, user_id: UserId, toggle: MediaToggle) -> ParticipantMediaState {
        let state = self.media.entry(user_id).or_default();
        match toggle {
            MediaToggle::Video(enabled) => state.has_video = enabled,
            MediaToggle::Audio(enabled) => state.has_audio = enabled,
            MediaToggle::Quality(quality) => state.quality = quality,
            MediaToggle::ScreenSharing(enabled) => state.is_screen_sharing = enabled,
        }
        let updated = state.clone();

        if let MediaToggle::ScreenSharing(enabled) = toggle {
            if enabled {
                self.screen_sharer_id = Some(user_id);
            } else if self.screen_sharer_id == Some(user_id) {
                self.screen_sharer_id = None;
            }
        }

        updated
    }

    /// Drop a participant's media state, clearing screen sharing if it was theirs.
    ///
    /// Returns true when the participant was the active screen sharer.
    pub fn clear_media(&mut self, user_id: UserId) -> bool {
        self.media.remove(&user_id);
        if self.screen_sharer_id == Some(user_id) {
            self.screen_sharer_id = None;
            return true;
        }
        false
    }

    /// Snapshot used when handing the call to the persistence collaborator.
    pub fn to_record(&self) -> CallRecord {
        CallRecord {
            id: self.id,
            initiator_id: self.initiator_id,
            receiver_id: self.receiver_id(),
            chat_id: self.chat_id,
            call_type: self.call_type,
            is_conference: self.is_conference,
            created_at: self.created_at,
        }
    }
}

/// Durable representation of a call as written by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub initiator_id: UserId,
    pub receiver_id: Option<UserId>,
    pub chat_id: Option<ChatId>,
    pub call_type: CallType,
    pub is_conference: bool,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    /// Type column value; conferences are stored as their own type.
    pub fn stored_type(&self) -> &'static str {
        if self.is_conference {
            "conference"
        } else {
            self.call_type.as_str()
        }
    }
}

/// Repository trait for the best-effort call history writer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    /// Insert the record for a newly created call.
    async fn create(&self, record: &CallRecord) -> Result<(), AppError>;

    /// Record that a direct call was answered.
    async fn mark_accepted(&self, call_id: CallId, accepted_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Record a participant joining (conferences) or being part of the call.
    async fn add_participant(
        &self,
        call_id: CallId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Record a participant leaving a conference.
    async fn mark_participant_left(
        &self,
        call_id: CallId,
        user_id: UserId,
        left_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Record the terminal outcome.
    async fn finish(
        &self,
        call_id: CallId,
        outcome: CallOutcome,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    ) -> Result<(), AppError>;
}
