//! Call Session Store
//!
//! Owns every ringing or in-progress `CallSession`. The maps here are used for
//! lookup only; each session is mutated under its own mutex.
//!
//! Lock order: a session mutex may be held while touching the maps, never the
//! other way round. `get` clones the handle out of the map before returning so
//! no shard guard is alive when the caller locks the session.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::{CallId, CallSession, UserId};
use crate::infrastructure::metrics;

/// Shared, individually locked session.
pub type SessionHandle = Arc<Mutex<CallSession>>;

/// Exclusive per-user claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Held by both users of an answered direct call.
    Direct,
    /// Held by every member of a conference.
    Conference,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<CallId, SessionHandle>,
    user_calls: DashMap<UserId, HashSet<CallId>>,
    direct_slots: DashMap<UserId, CallId>,
    conference_slots: DashMap<UserId, CallId>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh session and index its participants.
    pub fn insert(&self, session: CallSession) -> SessionHandle {
        let call_id = session.id;
        for user_id in &session.participants {
            self.index_participant(*user_id, call_id);
        }
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(call_id, Arc::clone(&handle));
        metrics::set_calls_in_flight(self.sessions.len());
        handle
    }

    pub fn get(&self, call_id: &CallId) -> Option<SessionHandle> {
        self.sessions.get(call_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a session and everything indexed for it.
    ///
    /// Called with the session's own lock held, after it was marked ended.
    pub fn remove(&self, session: &CallSession) {
        if self.sessions.remove(&session.id).is_none() {
            return;
        }
        for user_id in &session.participants {
            self.unindex_participant(*user_id, session.id);
            self.release(Slot::Direct, session.id, *user_id);
            self.release(Slot::Conference, session.id, *user_id);
        }
        metrics::set_calls_in_flight(self.sessions.len());
    }

    pub fn index_participant(&self, user_id: UserId, call_id: CallId) {
        self.user_calls.entry(user_id).or_default().insert(call_id);
    }

    pub fn unindex_participant(&self, user_id: UserId, call_id: CallId) {
        if let Entry::Occupied(mut entry) = self.user_calls.entry(user_id) {
            entry.get_mut().remove(&call_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Calls the user currently participates in.
    pub fn calls_for_user(&self, user_id: UserId) -> Vec<CallId> {
        self.user_calls
            .get(&user_id)
            .map(|calls| calls.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_active_direct_call(&self, user_id: UserId) -> bool {
        self.direct_slots.contains_key(&user_id)
    }

    pub fn conference_of(&self, user_id: UserId) -> Option<CallId> {
        self.conference_slots.get(&user_id).map(|entry| *entry.value())
    }

    /// Claim a slot for every user in `users`, all or nothing.
    ///
    /// Re-claiming a slot already held for the same call succeeds. On conflict
    /// the claims made by this call are rolled back and the conflicting user
    /// is returned.
    pub fn claim(&self, slot: Slot, call_id: CallId, users: &[UserId]) -> Result<(), UserId> {
        let map = self.slots(slot);
        let mut claimed = Vec::with_capacity(users.len());
        let mut conflict = None;

        for &user_id in users {
            match map.entry(user_id) {
                Entry::Occupied(entry) => {
                    if *entry.get() != call_id {
                        conflict = Some(user_id);
                        break;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(call_id);
                    claimed.push(user_id);
                }
            }
        }

        match conflict {
            Some(user_id) => {
                for claimed_user in claimed {
                    map.remove_if(&claimed_user, |_, held| *held == call_id);
                }
                Err(user_id)
            }
            None => Ok(()),
        }
    }

    /// Release a slot if it is held for `call_id`.
    pub fn release(&self, slot: Slot, call_id: CallId, user_id: UserId) {
        self.slots(slot)
            .remove_if(&user_id, |_, held| *held == call_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn slots(&self, slot: Slot) -> &DashMap<UserId, CallId> {
        match slot {
            Slot::Direct => &self.direct_slots,
            Slot::Conference => &self.conference_slots,
        }
    }
}
