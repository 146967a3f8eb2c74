//! Presence Service
//!
//! Tracks every live connection per user and the user's coarse status.
//! When the last connection of a user goes away their calls are ended right
//! away; the offline status is only announced after a grace period so a
//! quick reconnect (page reload) does not flap presence for their friends.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::application::broadcaster::Broadcaster;
use crate::application::events::{PresenceUpdateEvent, ServerEvent};
use crate::application::services::call_service::CallService;
use crate::application::services::conference_service::ConferenceService;
use crate::application::session_store::SessionStore;
use crate::domain::{
    ConnectionId, EndReason, PresenceEntry, RelationshipOracle, Topic, UserId, UserStatus,
};

pub struct PresenceService {
    entries: DashMap<UserId, PresenceEntry>,
    store: Arc<SessionStore>,
    calls: Arc<CallService>,
    conferences: Arc<ConferenceService>,
    broadcaster: Arc<dyn Broadcaster>,
    relationships: Arc<dyn RelationshipOracle>,
    offline_grace: Duration,
    inactivity_threshold: Duration,
}

impl PresenceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SessionStore>,
        calls: Arc<CallService>,
        conferences: Arc<ConferenceService>,
        broadcaster: Arc<dyn Broadcaster>,
        relationships: Arc<dyn RelationshipOracle>,
        offline_grace: Duration,
        inactivity_threshold: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            store,
            calls,
            conferences,
            broadcaster,
            relationships,
            offline_grace,
            inactivity_threshold,
        }
    }

    /// Track a newly authenticated connection.
    ///
    /// Subscribes the connection to the user's chats and to the calls the user
    /// is already part of. Friends are told the user came online only when
    /// this is the first connection or the user had been swept as idle.
    pub async fn register_connection(&self, user_id: UserId, connection_id: ConnectionId) {
        let announce = {
            let (mut entry, created) = match self.entries.entry(user_id) {
                Entry::Occupied(entry) => (entry.into_ref(), false),
                Entry::Vacant(entry) => (entry.insert(PresenceEntry::new(user_id)), true),
            };
            entry.connections.insert(connection_id);
            entry.epoch += 1;
            let revived = std::mem::replace(&mut entry.idle, false);
            entry.touch();
            (created || revived)
                .then(|| entry.visible_status())
                .filter(|status| *status != UserStatus::Offline)
        };

        for call_id in self.store.calls_for_user(user_id) {
            self.broadcaster.join(Topic::Call(call_id), connection_id);
            self.broadcaster.join(Topic::Screen(call_id), connection_id);
        }

        match self.relationships.chat_ids(user_id).await {
            Ok(chat_ids) => {
                for chat_id in chat_ids {
                    self.broadcaster.join(Topic::Chat(chat_id), connection_id);
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load chat subscriptions");
            }
        }

        tracing::info!(user_id, connection_id = %connection_id, "Connection registered");

        if let Some(status) = announce {
            self.notify_friends(user_id, status).await;
        }
    }

    /// Forget a closed connection.
    ///
    /// When it was the user's last one their calls are force-ended and the
    /// entry is dropped after the grace period unless they reconnect.
    pub fn unregister_connection(self: &Arc<Self>, user_id: UserId, connection_id: ConnectionId) {
        let epoch = {
            let Some(mut entry) = self.entries.get_mut(&user_id) else {
                return;
            };
            entry.connections.remove(&connection_id);
            if entry.has_connections() {
                tracing::debug!(user_id, connection_id = %connection_id, "Connection closed, others remain");
                return;
            }
            entry.epoch
        };

        tracing::info!(user_id, connection_id = %connection_id, "Last connection closed");
        self.end_calls_for(user_id, EndReason::UserDisconnected);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.offline_grace).await;
            this.finalize_offline(user_id, epoch).await;
        });
    }

    /// Drop the entry if nothing reconnected since `epoch`.
    async fn finalize_offline(&self, user_id: UserId, epoch: u64) {
        let removed = self
            .entries
            .remove_if(&user_id, |_, entry| {
                entry.epoch == epoch && !entry.has_connections()
            });

        if let Some((_, entry)) = removed {
            tracing::info!(user_id, "User went offline");
            // Idle entries were already announced offline by the sweep
            if entry.visible_status() != UserStatus::Offline {
                self.notify_friends(user_id, UserStatus::Offline).await;
            }
        }
    }

    /// Set the user's status. Returns the status others will see.
    pub async fn set_status(&self, user_id: UserId, status: UserStatus) -> UserStatus {
        let change = {
            let Some(mut entry) = self.entries.get_mut(&user_id) else {
                return UserStatus::Offline;
            };
            let before = entry.visible_status();
            entry.status = status;
            entry.idle = false;
            entry.touch();
            let after = entry.visible_status();
            (before != after).then_some(after)
        };

        if let Some(visible) = change {
            tracing::debug!(user_id, status = %status, "Status changed");
            self.notify_friends(user_id, visible).await;
        }
        status.visible()
    }

    /// Record activity for the user. An idle user becomes visible again.
    pub async fn touch(&self, user_id: UserId) {
        let revived = {
            let Some(mut entry) = self.entries.get_mut(&user_id) else {
                return;
            };
            entry.touch();
            std::mem::replace(&mut entry.idle, false).then(|| entry.visible_status())
        };

        if let Some(status) = revived {
            tracing::info!(user_id, "Idle user active again");
            if status != UserStatus::Offline {
                self.notify_friends(user_id, status).await;
            }
        }
    }

    /// Status as seen by other users.
    pub fn status_of(&self, user_id: UserId) -> UserStatus {
        self.entries
            .get(&user_id)
            .map(|entry| entry.visible_status())
            .unwrap_or(UserStatus::Offline)
    }

    pub fn online_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.idle).count()
    }

    /// Evict users idle past the inactivity threshold and end their calls.
    ///
    /// Users whose connections are still open keep their entry, marked idle,
    /// so a later disconnect still goes through `unregister_connection`.
    pub async fn sweep(&self) -> usize {
        let stale: Vec<UserId> = self
            .entries
            .iter()
            .filter(|entry| entry.is_stale(self.inactivity_threshold))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for user_id in stale {
            let status = match self.entries.entry(user_id) {
                Entry::Occupied(mut entry) if entry.get().is_stale(self.inactivity_threshold) => {
                    if entry.get().has_connections() {
                        entry.get_mut().idle = true;
                        entry.get().status
                    } else {
                        entry.remove().status
                    }
                }
                _ => continue,
            };

            evicted += 1;
            tracing::info!(user_id, "Evicting inactive user");
            self.end_calls_for(user_id, EndReason::Inactive);
            if status != UserStatus::Invisible {
                self.notify_friends(user_id, UserStatus::Offline).await;
            }
        }
        evicted
    }

    /// Run `sweep` on a fixed interval until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = this.sweep().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Presence sweep finished");
                }
            }
        })
    }

    async fn notify_friends(&self, user_id: UserId, status: UserStatus) {
        let friends = match self.relationships.friend_ids(user_id).await {
            Ok(friends) => friends,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load friends for presence update");
                return;
            }
        };

        let event = ServerEvent::PresenceUpdate(PresenceUpdateEvent { user_id, status });
        for friend_id in friends {
            self.broadcaster.publish(Topic::User(friend_id), event.clone());
        }
    }

    fn end_calls_for(&self, user_id: UserId, reason: EndReason) {
        for call_id in self.store.calls_for_user(user_id) {
            let is_conference = match self.store.get(&call_id) {
                Some(handle) => handle.lock().is_conference,
                None => continue,
            };
            if is_conference {
                self.conferences.leave_conference(user_id, call_id);
            } else {
                self.calls.force_end(call_id, user_id, reason);
            }
        }
    }
}
