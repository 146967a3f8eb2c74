//! Topic broadcaster contract.
//!
//! The publish-subscribe primitive is provided by the transport layer; the
//! call core only names topics and hands over events. All methods are
//! fire-and-forget: delivery is never acknowledged or awaited.

use crate::application::events::ServerEvent;
use crate::domain::{CallId, ConnectionId, Topic, UserId};

pub trait Broadcaster: Send + Sync {
    /// Subscribe one connection to a topic.
    fn join(&self, topic: Topic, connection_id: ConnectionId);

    /// Subscribe every live connection of a user to a topic.
    fn join_user(&self, topic: Topic, user_id: UserId);

    /// Unsubscribe every connection of a user from a topic.
    fn leave_user(&self, topic: Topic, user_id: UserId);

    /// Forget a topic and all of its subscriptions.
    fn drop_topic(&self, topic: Topic);

    /// Deliver to every subscriber of a topic.
    fn publish(&self, topic: Topic, event: ServerEvent);

    /// Deliver to every subscriber of a topic except the connections of `excluded`.
    fn publish_except(&self, topic: Topic, event: ServerEvent, excluded: UserId);

    /// Deliver to a single connection. Returns false if it is gone.
    fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool;

    /// Forget every per-call topic of a finished call.
    fn drop_call_topics(&self, call_id: CallId) {
        for topic in Topic::call_scoped(call_id) {
            self.drop_topic(topic);
        }
    }
}
