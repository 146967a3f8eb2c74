//! Relationship oracle contract.
//!
//! Friendships and chat memberships are owned by the messaging side of the
//! application. The call core asks yes/no questions and fetches fan-out lists.

use async_trait::async_trait;

use super::call::{ChatId, UserId};
use crate::shared::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipOracle: Send + Sync {
    /// Whether `caller_id` may place a direct call to `receiver_id`.
    async fn can_call(&self, caller_id: UserId, receiver_id: UserId) -> Result<bool, AppError>;

    /// Whether `user_id` is a member of `chat_id`.
    async fn is_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, AppError>;

    /// Users who should see `user_id`'s presence changes.
    async fn friend_ids(&self, user_id: UserId) -> Result<Vec<UserId>, AppError>;

    /// Chats `user_id` belongs to.
    async fn chat_ids(&self, user_id: UserId) -> Result<Vec<ChatId>, AppError>;
}
