//! Presence entry.
//!
//! One entry per user with at least one live connection (or a connection that
//! closed less than a grace period ago). An entry swept for inactivity while
//! its connections stay open is kept as idle until the user shows activity.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::call::UserId;
use super::user::UserStatus;

/// Identifier of a single transport connection (tab, device).
pub type ConnectionId = Uuid;

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub connections: HashSet<ConnectionId>,
    pub status: UserStatus,
    pub last_activity: Instant,
    /// Bumped on every connect so a pending offline transition can tell it is stale.
    pub epoch: u64,
    /// Swept for inactivity; reported offline until the next activity.
    pub idle: bool,
}

impl PresenceEntry {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            connections: HashSet::new(),
            status: UserStatus::Online,
            last_activity: Instant::now(),
            epoch: 0,
            idle: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        !self.idle && self.last_activity.elapsed() > threshold
    }

    /// Status as seen by other users.
    pub fn visible_status(&self) -> UserStatus {
        if self.idle {
            UserStatus::Offline
        } else {
            self.status.visible()
        }
    }
}
