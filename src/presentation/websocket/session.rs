//! WebSocket Session Management

use std::time::Instant;

use crate::domain::{ConnectionId, UserId};

/// WebSocket session state
#[derive(Debug)]
pub struct SessionState {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    pub last_heartbeat: Instant,
}

impl SessionState {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_id: None,
            last_heartbeat: Instant::now(),
        }
    }

    pub fn identify(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
        self.heartbeat();
    }

    pub fn is_identified(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_heartbeat.elapsed().as_millis() < timeout_ms as u128
    }
}
