//! Broadcast topic names.
//!
//! Topic names are part of the client compatibility surface, so the string
//! form is fixed: `user:{userId}`, `call:{callId}`, `video:{callId}`,
//! `screen:{callId}` and `chat:{chatId}`.

use std::fmt;

use crate::domain::entities::{CallId, ChatId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every connection of one user.
    User(UserId),
    /// Participants of a call.
    Call(CallId),
    /// Participants that started a media stream in a call.
    Video(CallId),
    /// Screen-share audience of a call.
    Screen(CallId),
    /// Members of a chat.
    Chat(ChatId),
}

impl Topic {
    /// All per-call topics, dropped together when the call ends.
    pub fn call_scoped(call_id: CallId) -> [Topic; 3] {
        [Topic::Call(call_id), Topic::Video(call_id), Topic::Screen(call_id)]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::User(id) => write!(f, "user:{}", id),
            Topic::Call(id) => write!(f, "call:{}", id),
            Topic::Video(id) => write!(f, "video:{}", id),
            Topic::Screen(id) => write!(f, "screen:{}", id),
            Topic::Chat(id) => write!(f, "chat:{}", id),
        }
    }
}
