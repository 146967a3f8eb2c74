//! Relationship Repository Implementation
//!
//! PostgreSQL implementation of the RelationshipOracle trait.
//! Reads the `friendships` and `chat_members` tables of the messaging schema.
//! A friendship row is stored once per pair with `status = 'accepted'` once
//! confirmed; a `blocked` row in either direction forbids calls.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{ChatId, RelationshipOracle, UserId};
use crate::shared::error::AppError;

#[derive(Clone)]
pub struct PgRelationshipRepository {
    pool: PgPool,
}

impl PgRelationshipRepository {
    /// Create a new PgRelationshipRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipOracle for PgRelationshipRepository {
    async fn can_call(&self, caller_id: UserId, receiver_id: UserId) -> Result<bool, AppError> {
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM friendships
                WHERE status = 'accepted'
                  AND ((user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1))
            ) AND NOT EXISTS (
                SELECT 1 FROM friendships
                WHERE status = 'blocked'
                  AND ((user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1))
            )
            "#,
        )
        .bind(caller_id)
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(allowed)
    }

    async fn is_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, AppError> {
        let member: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM chat_members
                WHERE chat_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(member)
    }

    async fn friend_ids(&self, user_id: UserId) -> Result<Vec<UserId>, AppError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT friend_id FROM friendships
            WHERE user_id = $1 AND status = 'accepted'
            UNION
            SELECT user_id FROM friendships
            WHERE friend_id = $1 AND status = 'accepted'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn chat_ids(&self, user_id: UserId) -> Result<Vec<ChatId>, AppError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT chat_id FROM chat_members
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
