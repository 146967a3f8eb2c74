//! WebSocket Gateway
//!
//! Manages WebSocket connections and topic subscriptions, and routes every
//! event the call core publishes to the connections subscribed to its topic.
//! `user:{id}` topics are not stored: they resolve to the user's live
//! connections.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::application::{Broadcaster, ServerEvent};
use crate::domain::{ConnectionId, Topic, UserId};

/// Encoded frame queued for one connection.
pub type OutboundFrame = Arc<str>;

/// Connected session with message sender
pub struct ConnectedSession {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub sender: mpsc::UnboundedSender<OutboundFrame>,
}

/// WebSocket gateway managing all connections
pub struct Gateway {
    /// Authenticated connections by id
    connections: DashMap<ConnectionId, Arc<ConnectedSession>>,
    /// User ID to connection IDs (one user can have multiple tabs and devices)
    user_connections: DashMap<UserId, HashSet<ConnectionId>>,
    /// Topic subscribers
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    /// Reverse index for cleanup on disconnect
    connection_topics: DashMap<ConnectionId, HashSet<Topic>>,
    /// Heartbeat interval in milliseconds
    heartbeat_interval_ms: u64,
}

impl Gateway {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self {
            connections: DashMap::new(),
            user_connections: DashMap::new(),
            topics: DashMap::new(),
            connection_topics: DashMap::new(),
            heartbeat_interval_ms,
        }
    }

    /// Get the heartbeat interval
    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    /// Register an authenticated connection
    pub fn register_connection(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        sender: mpsc::UnboundedSender<OutboundFrame>,
    ) {
        let session = Arc::new(ConnectedSession {
            user_id,
            connection_id,
            sender,
        });
        self.connections.insert(connection_id, session);
        self.user_connections
            .entry(user_id)
            .or_default()
            .insert(connection_id);

        tracing::debug!(
            user_id = user_id,
            connection_id = %connection_id,
            "Connection registered with gateway"
        );
    }

    /// Unregister a connection and drop all of its subscriptions
    pub fn unregister_connection(&self, connection_id: &ConnectionId) -> Option<UserId> {
        let (_, session) = self.connections.remove(connection_id)?;

        if let Some(mut connections) = self.user_connections.get_mut(&session.user_id) {
            connections.remove(connection_id);
        }
        self.user_connections
            .remove_if(&session.user_id, |_, connections| connections.is_empty());

        let subscribed = self
            .connection_topics
            .remove(connection_id)
            .map(|(_, topics)| topics)
            .unwrap_or_default();
        for topic in subscribed {
            self.remove_subscriber(&topic, connection_id);
        }

        tracing::debug!(
            user_id = session.user_id,
            connection_id = %connection_id,
            "Connection unregistered from gateway"
        );
        Some(session.user_id)
    }

    /// Get live connection count
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Check if user is online (has at least one connection)
    pub fn is_user_online(&self, user_id: UserId) -> bool {
        self.user_connections
            .get(&user_id)
            .map(|connections| !connections.is_empty())
            .unwrap_or(false)
    }

    /// Number of connections subscribed to a topic
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        match topic {
            Topic::User(user_id) => self
                .user_connections
                .get(user_id)
                .map(|connections| connections.len())
                .unwrap_or(0),
            other => self.topics.get(other).map(|subs| subs.len()).unwrap_or(0),
        }
    }

    fn connections_of(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.user_connections
            .get(&user_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }

    fn recipients(&self, topic: &Topic) -> Vec<ConnectionId> {
        match topic {
            Topic::User(user_id) => self.connections_of(*user_id),
            other => self
                .topics
                .get(other)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    fn remove_subscriber(&self, topic: &Topic, connection_id: &ConnectionId) {
        if let Some(mut subs) = self.topics.get_mut(topic) {
            subs.remove(connection_id);
        }
        self.topics.remove_if(topic, |_, subs| subs.is_empty());
    }

    fn deliver(&self, topic: &Topic, event: &ServerEvent, excluded: Option<UserId>) {
        let frame: OutboundFrame = match event.to_frame() {
            Ok(frame) => frame.into(),
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to serialize event");
                return;
            }
        };

        let mut delivered = 0usize;
        for connection_id in self.recipients(topic) {
            let Some(session) = self.connections.get(&connection_id).map(|s| Arc::clone(&s)) else {
                continue;
            };
            if excluded == Some(session.user_id) {
                continue;
            }
            if session.sender.send(Arc::clone(&frame)).is_ok() {
                delivered += 1;
            }
        }

        tracing::trace!(
            topic = %topic,
            event = %event.event_name(),
            delivered,
            "Event published"
        );
    }
}

impl Broadcaster for Gateway {
    fn join(&self, topic: Topic, connection_id: ConnectionId) {
        if matches!(topic, Topic::User(_)) || !self.connections.contains_key(&connection_id) {
            return;
        }
        self.topics.entry(topic).or_default().insert(connection_id);
        self.connection_topics
            .entry(connection_id)
            .or_default()
            .insert(topic);
    }

    fn join_user(&self, topic: Topic, user_id: UserId) {
        for connection_id in self.connections_of(user_id) {
            self.join(topic, connection_id);
        }
    }

    fn leave_user(&self, topic: Topic, user_id: UserId) {
        for connection_id in self.connections_of(user_id) {
            self.remove_subscriber(&topic, &connection_id);
            if let Some(mut topics) = self.connection_topics.get_mut(&connection_id) {
                topics.remove(&topic);
            }
        }
    }

    fn drop_topic(&self, topic: Topic) {
        let Some((_, subscribers)) = self.topics.remove(&topic) else {
            return;
        };
        for connection_id in subscribers {
            if let Some(mut topics) = self.connection_topics.get_mut(&connection_id) {
                topics.remove(&topic);
            }
        }
    }

    fn publish(&self, topic: Topic, event: ServerEvent) {
        self.deliver(&topic, &event, None);
    }

    fn publish_except(&self, topic: Topic, event: ServerEvent, excluded: UserId) {
        self.deliver(&topic, &event, Some(excluded));
    }

    fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(session) = self.connections.get(&connection_id).map(|s| Arc::clone(&s)) else {
            return false;
        };
        match event.to_frame() {
            Ok(frame) => session.sender.send(frame.into()).is_ok(),
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Failed to serialize event");
                false
            }
        }
    }
}
