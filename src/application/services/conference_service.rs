//! Conference and Media Service
//!
//! Multi-party calls scoped to a chat, plus the per-participant media state
//! (camera, microphone, quality, screen share) that applies to direct calls
//! and conferences alike.

use std::sync::Arc;

use chrono::Utc;

use crate::application::broadcaster::Broadcaster;
use crate::application::events::{
    CallEndedEvent, ConferenceCreatedEvent, ConferenceEndedEvent, ConferenceRoster,
    MediaParticipantEvent, ParticipantEvent, RosterChangeEvent, ServerEvent,
    VideoControlChangedEvent, VideoPeersEvent, VideoQualityChangedEvent,
};
use crate::application::recorder::CallRecorder;
use crate::application::session_store::{SessionHandle, SessionStore, Slot};
use crate::domain::{
    CallId, CallOutcome, CallSession, CallType, ChatId, ConnectionId, MediaToggle,
    ParticipantMediaState, RelationshipOracle, Topic, UserId,
};
use crate::infrastructure::metrics;
use crate::shared::error::SignalingError;

pub struct ConferenceService {
    store: Arc<SessionStore>,
    broadcaster: Arc<dyn Broadcaster>,
    recorder: CallRecorder,
    relationships: Arc<dyn RelationshipOracle>,
}

impl ConferenceService {
    pub fn new(
        store: Arc<SessionStore>,
        broadcaster: Arc<dyn Broadcaster>,
        recorder: CallRecorder,
        relationships: Arc<dyn RelationshipOracle>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            recorder,
            relationships,
        }
    }

    /// Open a conference in a chat with the creator as its first member.
    pub async fn create_conference(
        &self,
        creator_id: UserId,
        chat_id: ChatId,
        call_type: CallType,
    ) -> Result<CallId, SignalingError> {
        self.ensure_chat_member(chat_id, creator_id).await?;

        let session = CallSession::conference(creator_id, chat_id, call_type);
        let call_id = session.id;
        self.store
            .claim(Slot::Conference, call_id, &[creator_id])
            .map_err(|_| SignalingError::AlreadyInCall)?;

        // Queued before the session is visible so no later write can overtake it
        self.recorder.created(session.to_record());
        let handle = self.store.insert(session);

        {
            let _session = handle.lock();
            self.broadcaster.join_user(Topic::Call(call_id), creator_id);
            self.broadcaster.join_user(Topic::Screen(call_id), creator_id);

            let event = ServerEvent::ConferenceCreated(ConferenceCreatedEvent {
                call_id,
                creator: creator_id,
                call_type,
                chat_id,
            });
            self.broadcaster
                .publish_except(Topic::Chat(chat_id), event.clone(), creator_id);
            self.broadcaster.publish(Topic::User(creator_id), event);
        }

        metrics::record_call_started(true);

        tracing::info!(call_id = %call_id, creator_id, chat_id, "Conference created");
        Ok(call_id)
    }

    /// Add a user to a conference and return the roster they join into.
    ///
    /// Joining a conference one is already in just returns the roster.
    pub async fn join_conference(
        &self,
        user_id: UserId,
        call_id: CallId,
    ) -> Result<ConferenceRoster, SignalingError> {
        let chat_id = {
            let handle = self.conference(&call_id)?;
            let session = handle.lock();
            if session.is_ended() {
                return Err(SignalingError::NotFound("Conference"));
            }
            if session.is_participant(user_id) {
                return Ok(roster(&session));
            }
            session.chat_id
        };

        if let Some(chat_id) = chat_id {
            self.ensure_chat_member(chat_id, user_id).await?;
        }

        let handle = self.conference(&call_id)?;
        let mut session = handle.lock();
        if session.is_ended() {
            return Err(SignalingError::NotFound("Conference"));
        }
        if session.is_participant(user_id) {
            return Ok(roster(&session));
        }

        self.store
            .claim(Slot::Conference, call_id, &[user_id])
            .map_err(|_| SignalingError::AlreadyInCall)?;
        session.participants.insert(user_id);
        self.store.index_participant(user_id, call_id);

        self.broadcaster.publish(
            Topic::Call(call_id),
            ServerEvent::ConferenceParticipantJoined(RosterChangeEvent {
                call_id,
                user_id,
                participants: session.participant_list(),
            }),
        );
        self.broadcaster.join_user(Topic::Call(call_id), user_id);
        self.broadcaster.join_user(Topic::Screen(call_id), user_id);
        self.recorder.joined(call_id, user_id, Utc::now());

        tracing::info!(
            call_id = %call_id,
            user_id,
            participants = session.participants.len(),
            "Joined conference"
        );
        Ok(roster(&session))
    }

    /// Remove a user from a conference. The last one out ends it.
    ///
    /// Leaving a conference one is not part of does nothing.
    pub fn leave_conference(&self, user_id: UserId, call_id: CallId) {
        let Some(handle) = self.store.get(&call_id) else {
            return;
        };
        let mut session = handle.lock();
        if !session.is_conference || session.is_ended() || !session.is_participant(user_id) {
            return;
        }

        session.participants.remove(&user_id);
        let had_media = session.media.contains_key(&user_id);
        let was_sharing = session.clear_media(user_id);
        self.store.unindex_participant(user_id, call_id);
        self.store.release(Slot::Conference, call_id, user_id);
        for topic in Topic::call_scoped(call_id) {
            self.broadcaster.leave_user(topic, user_id);
        }

        let now = Utc::now();
        self.recorder.left(call_id, user_id, now);

        if session.participants.is_empty() {
            let duration = session.mark_ended(now);
            self.store.remove(&session);

            self.broadcaster.publish(
                Topic::Call(call_id),
                ServerEvent::CallEnded(CallEndedEvent {
                    call_id,
                    ended_by: user_id,
                    reason: None,
                    duration,
                }),
            );
            if let Some(chat_id) = session.chat_id {
                self.broadcaster.publish(
                    Topic::Chat(chat_id),
                    ServerEvent::ConferenceEnded(ConferenceEndedEvent {
                        call_id,
                        chat_id: Some(chat_id),
                    }),
                );
            }
            self.broadcaster.drop_call_topics(call_id);
            self.recorder
                .finished(call_id, CallOutcome::Completed, now, duration);
            metrics::record_call_outcome(CallOutcome::Completed);

            tracing::info!(call_id = %call_id, user_id, "Conference ended, last participant left");
            return;
        }

        if was_sharing {
            self.broadcaster.publish(
                Topic::Screen(call_id),
                ServerEvent::ScreenStopped(ParticipantEvent { call_id, user_id }),
            );
        }
        if had_media {
            self.broadcaster.publish(
                Topic::Video(call_id),
                ServerEvent::VideoParticipantLeft(ParticipantEvent { call_id, user_id }),
            );
        }
        self.broadcaster.publish(
            Topic::Call(call_id),
            ServerEvent::ConferenceParticipantLeft(RosterChangeEvent {
                call_id,
                user_id,
                participants: session.participant_list(),
            }),
        );

        tracing::info!(
            call_id = %call_id,
            user_id,
            participants = session.participants.len(),
            "Left conference"
        );
    }

    /// Change one media flag and tell the other participants.
    ///
    /// Requests from non-participants and for unknown calls are dropped.
    pub fn toggle_media(
        &self,
        call_id: CallId,
        user_id: UserId,
        toggle: MediaToggle,
    ) -> Result<(), SignalingError> {
        let Some(handle) = self.store.get(&call_id) else {
            return Ok(());
        };
        let mut session = handle.lock();
        if session.is_ended() || !session.is_participant(user_id) {
            return Ok(());
        }

        if let MediaToggle::ScreenSharing(enabled) = toggle {
            match (enabled, session.screen_sharer_id) {
                (true, Some(sharer)) if sharer != user_id => {
                    return Err(SignalingError::InvalidTransition(
                        "Another participant is already sharing their screen".into(),
                    ));
                }
                (true, Some(_)) => return Ok(()),
                (false, sharer) if sharer != Some(user_id) => return Ok(()),
                _ => {}
            }
        }

        let state = session.apply_media(user_id, toggle);
        let (topic, event) = match toggle {
            MediaToggle::Video(_) | MediaToggle::Audio(_) => (
                Topic::Call(call_id),
                ServerEvent::VideoControlChanged(VideoControlChangedEvent {
                    call_id,
                    user_id,
                    has_video: state.has_video,
                    has_audio: state.has_audio,
                }),
            ),
            MediaToggle::Quality(quality) => (
                Topic::Call(call_id),
                ServerEvent::VideoQualityChanged(VideoQualityChangedEvent {
                    call_id,
                    user_id,
                    quality,
                }),
            ),
            MediaToggle::ScreenSharing(true) => (
                Topic::Screen(call_id),
                ServerEvent::ScreenStarted(ParticipantEvent { call_id, user_id }),
            ),
            MediaToggle::ScreenSharing(false) => (
                Topic::Screen(call_id),
                ServerEvent::ScreenStopped(ParticipantEvent { call_id, user_id }),
            ),
        };
        self.broadcaster.publish_except(topic, event, user_id);

        tracing::debug!(call_id = %call_id, user_id, ?toggle, "Media state changed");
        Ok(())
    }

    /// Start a participant's media stream on one connection.
    ///
    /// Returns the media state of the other peers, or `None` when the user is
    /// not a participant of a live call.
    pub fn start_media(
        &self,
        call_id: CallId,
        user_id: UserId,
        connection_id: ConnectionId,
        initial: ParticipantMediaState,
    ) -> Option<VideoPeersEvent> {
        let handle = self.store.get(&call_id)?;
        let mut session = handle.lock();
        if session.is_ended() || !session.is_participant(user_id) {
            return None;
        }

        self.broadcaster.join(Topic::Video(call_id), connection_id);
        self.broadcaster.join(Topic::Screen(call_id), connection_id);

        let is_sharing = session.screen_sharer_id == Some(user_id);
        let state = session.media.entry(user_id).or_default();
        state.has_video = initial.has_video;
        state.has_audio = initial.has_audio;
        state.quality = initial.quality;
        state.is_screen_sharing = is_sharing;
        let media = state.clone();

        self.broadcaster.publish_except(
            Topic::Video(call_id),
            ServerEvent::VideoParticipantJoined(MediaParticipantEvent {
                call_id,
                user_id,
                media,
            }),
            user_id,
        );

        let peers = session
            .media
            .iter()
            .filter(|(peer_id, _)| **peer_id != user_id)
            .map(|(peer_id, state)| (*peer_id, state.clone()))
            .collect();

        tracing::debug!(call_id = %call_id, user_id, connection_id = %connection_id, "Media started");
        Some(VideoPeersEvent {
            call_id,
            peers,
            screen_sharer_id: session.screen_sharer_id,
        })
    }

    /// Stop a participant's media stream.
    pub fn stop_media(&self, call_id: CallId, user_id: UserId) {
        let Some(handle) = self.store.get(&call_id) else {
            return;
        };
        let mut session = handle.lock();
        if session.is_ended() || !session.is_participant(user_id) {
            return;
        }

        let had_media = session.media.contains_key(&user_id);
        let was_sharing = session.clear_media(user_id);
        self.broadcaster.leave_user(Topic::Video(call_id), user_id);

        if was_sharing {
            self.broadcaster.publish_except(
                Topic::Screen(call_id),
                ServerEvent::ScreenStopped(ParticipantEvent { call_id, user_id }),
                user_id,
            );
        }
        if had_media {
            self.broadcaster.publish(
                Topic::Video(call_id),
                ServerEvent::VideoParticipantLeft(ParticipantEvent { call_id, user_id }),
            );
        }

        tracing::debug!(call_id = %call_id, user_id, "Media stopped");
    }

    fn conference(&self, call_id: &CallId) -> Result<SessionHandle, SignalingError> {
        let handle = self
            .store
            .get(call_id)
            .ok_or(SignalingError::NotFound("Conference"))?;
        if !handle.lock().is_conference {
            return Err(SignalingError::NotFound("Conference"));
        }
        Ok(handle)
    }

    async fn ensure_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), SignalingError> {
        if self.relationships.is_chat_member(chat_id, user_id).await? {
            Ok(())
        } else {
            Err(SignalingError::AccessDenied(
                "Not a member of this chat".into(),
            ))
        }
    }
}

fn roster(session: &CallSession) -> ConferenceRoster {
    ConferenceRoster {
        call_id: session.id,
        chat_id: session.chat_id,
        call_type: session.call_type,
        participants: session.participant_list(),
        screen_sharer_id: session.screen_sharer_id,
        media: session.media.clone(),
    }
}
