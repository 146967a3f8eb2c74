//! Signal Relay
//!
//! Forwards opaque negotiation payloads (offers, answers, ICE candidates)
//! between participants of a live call. The payload is never parsed; it is
//! carried as raw JSON and written out unchanged with the sender attached.

use std::sync::Arc;

use serde_json::value::RawValue;

use crate::application::broadcaster::Broadcaster;
use crate::application::events::{ServerEvent, SignalEvent, SignalKind};
use crate::application::session_store::SessionStore;
use crate::domain::{CallId, Topic, UserId};
use crate::infrastructure::metrics;

pub struct SignalRelay {
    store: Arc<SessionStore>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl SignalRelay {
    pub fn new(store: Arc<SessionStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// Relay one signal. Returns false when it was dropped.
    ///
    /// Dropped silently: unknown or ended calls, senders that are not
    /// participants, and targets that are not participants.
    pub fn relay(
        &self,
        from: UserId,
        call_id: CallId,
        kind: SignalKind,
        data: Box<RawValue>,
        target: Option<UserId>,
    ) -> bool {
        let relayed = self.forward(from, call_id, kind, data, target);
        metrics::record_signal(kind.as_str(), relayed);
        if !relayed {
            tracing::debug!(call_id = %call_id, from, ?target, kind = kind.as_str(), "Signal dropped");
        }
        relayed
    }

    fn forward(
        &self,
        from: UserId,
        call_id: CallId,
        kind: SignalKind,
        data: Box<RawValue>,
        target: Option<UserId>,
    ) -> bool {
        let Some(handle) = self.store.get(&call_id) else {
            return false;
        };
        let session = handle.lock();
        if session.is_ended() || !session.is_participant(from) {
            return false;
        }

        let event = ServerEvent::Signal(SignalEvent {
            call_id,
            kind,
            data,
            from,
        });

        match target {
            Some(target_id) => {
                if target_id == from || !session.is_participant(target_id) {
                    return false;
                }
                self.broadcaster.publish(Topic::User(target_id), event);
            }
            None => {
                self.broadcaster
                    .publish_except(Topic::Call(call_id), event, from);
            }
        }
        true
    }
}
