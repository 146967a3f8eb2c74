//! Call Lifecycle Service
//!
//! Drives direct calls through `ringing → {active, declined, cancelled,
//! timeout}` and `active → ended`. Every check-and-mutate runs inside one
//! acquisition of the session's lock, so exactly one of accept, decline,
//! cancel, timeout or end resolves a ringing call. The loser of a race finds
//! the session gone or ended and gets `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::application::broadcaster::Broadcaster;
use crate::application::events::{
    CallAcceptedEvent, CallEndedEvent, CallIncomingEvent, CallInitiatedEvent, CallRefEvent,
    ConferenceEndedEvent, ServerEvent,
};
use crate::application::recorder::CallRecorder;
use crate::application::scheduler::TimeoutScheduler;
use crate::application::session_store::{SessionStore, Slot};
use crate::domain::{
    CallId, CallOutcome, CallSession, CallStatus, CallType, ChatId, EndReason,
    RelationshipOracle, Topic, UserDirectory, UserId,
};
use crate::infrastructure::metrics;
use crate::shared::error::SignalingError;

/// Receiver's answer to a ringing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAction {
    Accept,
    Decline,
}

/// In-flight call as listed by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub call_id: CallId,
    pub call_type: CallType,
    pub status: CallStatus,
    pub participants: Vec<UserId>,
    pub is_conference: bool,
    pub chat_id: Option<ChatId>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<&CallSession> for CallSummary {
    fn from(session: &CallSession) -> Self {
        Self {
            call_id: session.id,
            call_type: session.call_type,
            status: session.status,
            participants: session.participant_list(),
            is_conference: session.is_conference,
            chat_id: session.chat_id,
            created_at: session.created_at,
            accepted_at: session.accepted_at,
        }
    }
}

pub struct CallService {
    store: Arc<SessionStore>,
    scheduler: Arc<TimeoutScheduler>,
    broadcaster: Arc<dyn Broadcaster>,
    recorder: CallRecorder,
    users: Arc<dyn UserDirectory>,
    relationships: Arc<dyn RelationshipOracle>,
    ring_timeout: Duration,
}

impl CallService {
    pub fn new(
        store: Arc<SessionStore>,
        scheduler: Arc<TimeoutScheduler>,
        broadcaster: Arc<dyn Broadcaster>,
        recorder: CallRecorder,
        users: Arc<dyn UserDirectory>,
        relationships: Arc<dyn RelationshipOracle>,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            store,
            scheduler,
            broadcaster,
            recorder,
            users,
            relationships,
            ring_timeout,
        }
    }

    /// Place a direct call. The receiver is notified and the ringing
    /// deadline is armed.
    pub async fn initiate_call(
        &self,
        caller_id: UserId,
        receiver_id: UserId,
        call_type: CallType,
        chat_id: Option<ChatId>,
    ) -> Result<CallId, SignalingError> {
        if caller_id == receiver_id {
            return Err(SignalingError::InvalidTransition(
                "Cannot call yourself".into(),
            ));
        }
        if self.store.has_active_direct_call(receiver_id) {
            return Err(SignalingError::AlreadyInCall);
        }

        let caller = self
            .users
            .find_profile(caller_id)
            .await?
            .ok_or(SignalingError::NotFound("User"))?;
        self.users
            .find_profile(receiver_id)
            .await?
            .ok_or(SignalingError::NotFound("User"))?;

        if !self.relationships.can_call(caller_id, receiver_id).await? {
            return Err(SignalingError::AccessDenied(
                "Calls are only allowed between friends".into(),
            ));
        }
        if let Some(chat_id) = chat_id {
            if !self.relationships.is_chat_member(chat_id, caller_id).await? {
                return Err(SignalingError::AccessDenied(
                    "Not a member of this chat".into(),
                ));
            }
        }

        // State may have moved while the lookups were in flight
        if self.store.has_active_direct_call(receiver_id) {
            return Err(SignalingError::AlreadyInCall);
        }

        let session = CallSession::direct(caller_id, receiver_id, call_type, chat_id);
        let call_id = session.id;
        // Everything a concurrent hang-up relies on is in place before the
        // session becomes visible
        self.recorder.created(session.to_record());
        for user_id in [caller_id, receiver_id] {
            self.broadcaster.join_user(Topic::Call(call_id), user_id);
            self.broadcaster.join_user(Topic::Screen(call_id), user_id);
        }
        self.scheduler.schedule(call_id, self.ring_timeout);
        metrics::record_call_started(false);
        let handle = self.store.insert(session);

        {
            let session = handle.lock();
            if session.is_ended() {
                tracing::debug!(call_id = %call_id, "Call ended before it was announced");
                return Ok(call_id);
            }

            self.broadcaster.publish(
                Topic::User(receiver_id),
                ServerEvent::CallIncoming(CallIncomingEvent {
                    call_id,
                    caller,
                    call_type,
                    chat_id,
                }),
            );
            self.broadcaster.publish(
                Topic::User(caller_id),
                ServerEvent::CallInitiated(CallInitiatedEvent {
                    call_id,
                    receiver_id,
                    call_type,
                    chat_id,
                }),
            );
        }

        tracing::info!(
            call_id = %call_id,
            caller_id,
            receiver_id,
            call_type = call_type.as_str(),
            "Call initiated"
        );
        Ok(call_id)
    }

    /// Accept or decline a ringing call. Only the receiver may respond.
    pub fn respond_to_call(
        &self,
        call_id: CallId,
        user_id: UserId,
        action: CallAction,
    ) -> Result<(), SignalingError> {
        let handle = self
            .store
            .get(&call_id)
            .ok_or_else(SignalingError::call_not_found)?;
        let mut session = handle.lock();

        if session.is_ended() {
            return Err(SignalingError::call_not_found());
        }
        if session.receiver_id() != Some(user_id) {
            return Err(SignalingError::AccessDenied(
                "Only the receiver can respond to this call".into(),
            ));
        }
        if !session.is_ringing() {
            return Err(SignalingError::InvalidTransition(
                "Call is not ringing".into(),
            ));
        }

        match action {
            CallAction::Accept => {
                let participants = session.participant_list();
                if let Err(busy_user) = self.store.claim(Slot::Direct, call_id, &participants) {
                    tracing::debug!(call_id = %call_id, busy_user, "Accept rejected, user busy");
                    return Err(SignalingError::AlreadyInCall);
                }

                // A deadline that already fired finds the call active and does nothing
                self.scheduler.cancel(call_id);
                let now = Utc::now();
                session.status = CallStatus::Active;
                session.accepted_at = Some(now);

                self.broadcaster.publish(
                    Topic::Call(call_id),
                    ServerEvent::CallAccepted(CallAcceptedEvent {
                        call_id,
                        participants,
                    }),
                );
                self.recorder.accepted(call_id, now);
                self.recorder.joined(call_id, user_id, now);

                tracing::info!(call_id = %call_id, user_id, "Call accepted");
            }
            CallAction::Decline => {
                self.scheduler.cancel(call_id);
                let now = Utc::now();
                session.mark_ended(now);
                self.store.remove(&session);

                self.broadcaster.publish(
                    Topic::User(session.initiator_id),
                    ServerEvent::CallDeclined(CallRefEvent { call_id }),
                );
                self.broadcaster.drop_call_topics(call_id);
                self.finish(call_id, CallOutcome::Declined, now, None);

                tracing::info!(call_id = %call_id, user_id, "Call declined");
            }
        }
        Ok(())
    }

    /// Withdraw a ringing call. Only the caller may cancel.
    pub fn cancel_call(&self, call_id: CallId, user_id: UserId) -> Result<(), SignalingError> {
        let handle = self
            .store
            .get(&call_id)
            .ok_or_else(SignalingError::call_not_found)?;
        let mut session = handle.lock();

        if session.is_ended() {
            return Err(SignalingError::call_not_found());
        }
        if session.is_conference || session.initiator_id != user_id {
            return Err(SignalingError::AccessDenied(
                "Only the caller can cancel this call".into(),
            ));
        }
        if !session.is_ringing() {
            return Err(SignalingError::InvalidTransition(
                "Call is not ringing".into(),
            ));
        }

        self.scheduler.cancel(call_id);
        let now = Utc::now();
        session.mark_ended(now);
        self.store.remove(&session);

        if let Some(receiver_id) = session.receiver_id() {
            self.broadcaster.publish(
                Topic::User(receiver_id),
                ServerEvent::CallCancelled(CallRefEvent { call_id }),
            );
        }
        self.broadcaster.drop_call_topics(call_id);
        self.finish(call_id, CallOutcome::Cancelled, now, None);

        tracing::info!(call_id = %call_id, user_id, "Call cancelled");
        Ok(())
    }

    /// Hang up. A call that is already gone is not an error.
    pub fn end_call(&self, call_id: CallId, user_id: UserId) -> Result<(), SignalingError> {
        self.terminate(call_id, user_id, None)
    }

    /// End a call on a participant's behalf (disconnect, inactivity).
    pub fn force_end(&self, call_id: CallId, user_id: UserId, reason: EndReason) {
        if let Err(e) = self.terminate(call_id, user_id, Some(reason)) {
            tracing::debug!(call_id = %call_id, user_id, error = %e, "Forced end skipped");
        }
    }

    fn terminate(
        &self,
        call_id: CallId,
        user_id: UserId,
        reason: Option<EndReason>,
    ) -> Result<(), SignalingError> {
        let Some(handle) = self.store.get(&call_id) else {
            return Ok(());
        };
        let mut session = handle.lock();

        if session.is_ended() {
            return Ok(());
        }
        if !session.is_participant(user_id) {
            return Err(SignalingError::AccessDenied(
                "Not a participant of this call".into(),
            ));
        }

        let was_ringing = session.is_ringing();
        if was_ringing {
            self.scheduler.cancel(call_id);
        }
        let now = Utc::now();
        let duration = session.mark_ended(now);
        self.store.remove(&session);

        self.broadcaster.publish(
            Topic::Call(call_id),
            ServerEvent::CallEnded(CallEndedEvent {
                call_id,
                ended_by: user_id,
                reason,
                duration,
            }),
        );
        if session.is_conference {
            if let Some(chat_id) = session.chat_id {
                self.broadcaster.publish(
                    Topic::Chat(chat_id),
                    ServerEvent::ConferenceEnded(ConferenceEndedEvent {
                        call_id,
                        chat_id: Some(chat_id),
                    }),
                );
            }
        }
        self.broadcaster.drop_call_topics(call_id);

        let outcome = match (was_ringing, user_id == session.initiator_id) {
            (false, _) => CallOutcome::Completed,
            (true, true) => CallOutcome::Cancelled,
            (true, false) => CallOutcome::Declined,
        };
        self.finish(call_id, outcome, now, duration);

        tracing::info!(
            call_id = %call_id,
            user_id,
            ?reason,
            duration_secs = duration,
            "Call ended"
        );
        Ok(())
    }

    /// Resolve a call whose ringing window elapsed.
    ///
    /// Does nothing unless the call still exists and is still ringing.
    pub fn handle_timeout(&self, call_id: CallId) {
        let Some(handle) = self.store.get(&call_id) else {
            return;
        };
        let mut session = handle.lock();

        if !session.is_ringing() {
            tracing::debug!(call_id = %call_id, status = %session.status, "Stale ringing deadline");
            return;
        }

        let now = Utc::now();
        session.mark_ended(now);
        self.store.remove(&session);

        let event = ServerEvent::CallTimeout(CallRefEvent { call_id });
        for user_id in session.participant_list() {
            self.broadcaster.publish(Topic::User(user_id), event.clone());
        }
        self.broadcaster.drop_call_topics(call_id);
        self.finish(call_id, CallOutcome::Missed, now, None);

        tracing::info!(call_id = %call_id, "Call timed out");
    }

    /// Consume fired deadlines until the scheduler goes away.
    pub async fn run_timeout_driver(self: Arc<Self>, mut fired: mpsc::UnboundedReceiver<CallId>) {
        while let Some(call_id) = fired.recv().await {
            self.handle_timeout(call_id);
        }
        tracing::debug!("Timeout driver stopped");
    }

    /// Calls the user is currently part of, oldest first.
    pub fn active_calls_for(&self, user_id: UserId) -> Vec<CallSummary> {
        let mut calls: Vec<CallSummary> = self
            .store
            .calls_for_user(user_id)
            .into_iter()
            .filter_map(|call_id| self.store.get(&call_id))
            .filter_map(|handle| {
                let session = handle.lock();
                (!session.is_ended()).then(|| CallSummary::from(&*session))
            })
            .collect();
        calls.sort_by_key(|call| call.created_at);
        calls
    }

    fn finish(
        &self,
        call_id: CallId,
        outcome: CallOutcome,
        at: DateTime<Utc>,
        duration_secs: Option<i64>,
    ) {
        self.recorder.finished(call_id, outcome, at, duration_secs);
        metrics::record_call_outcome(outcome);
    }
}
