//! User Directory Implementation
//!
//! PostgreSQL implementation of the UserDirectory trait on the shared
//! `users` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{UserDirectory, UserId, UserProfile};
use crate::shared::error::AppError;

/// Database row for the public profile columns.
#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    username: String,
    avatar_url: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username,
            avatar: self.avatar_url,
        }
    }
}

/// PostgreSQL user directory.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserRepository {
    async fn find_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, username, avatar_url
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProfileRow::into_profile))
    }
}
