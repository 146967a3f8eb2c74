//! Call Record Repository Implementation
//!
//! PostgreSQL implementation of the CallRecordRepository trait.
//! Writes to the `calls` and `call_participants` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{CallId, CallOutcome, CallRecord, CallRecordRepository, UserId};
use crate::shared::error::AppError;

/// PostgreSQL call history writer.
#[derive(Clone)]
pub struct PgCallRecordRepository {
    pool: PgPool,
}

impl PgCallRecordRepository {
    /// Create a new PgCallRecordRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordRepository for PgCallRecordRepository {
    async fn create(&self, record: &CallRecord) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO calls (id, caller_id, receiver_id, chat_id, call_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.initiator_id)
        .bind(record.receiver_id)
        .bind(record.chat_id)
        .bind(record.stored_type())
        .bind(if record.is_conference { "active" } else { "ringing" })
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        // The initiator is a participant from the start
        sqlx::query(
            r#"
            INSERT INTO call_participants (call_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (call_id, user_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.initiator_id)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_accepted(&self, call_id: CallId, accepted_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE calls
            SET status = 'active', accepted_at = $2
            WHERE id = $1 AND status = 'ringing'
            "#,
        )
        .bind(call_id)
        .bind(accepted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_participant(
        &self,
        call_id: CallId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // A rejoin reopens the existing row
        sqlx::query(
            r#"
            INSERT INTO call_participants (call_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (call_id, user_id)
            DO UPDATE SET joined_at = EXCLUDED.joined_at, left_at = NULL
            "#,
        )
        .bind(call_id)
        .bind(user_id)
        .bind(joined_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_participant_left(
        &self,
        call_id: CallId,
        user_id: UserId,
        left_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE call_participants
            SET left_at = $3
            WHERE call_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(call_id)
        .bind(user_id)
        .bind(left_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish(
        &self,
        call_id: CallId,
        outcome: CallOutcome,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE calls
            SET status = $2, ended_at = $3, duration_secs = $4
            WHERE id = $1 AND ended_at IS NULL
            "#,
        )
        .bind(call_id)
        .bind(outcome.as_str())
        .bind(ended_at)
        .bind(duration_secs)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Open call record {}", call_id)));
        }

        sqlx::query(
            r#"
            UPDATE call_participants
            SET left_at = $2
            WHERE call_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(call_id)
        .bind(ended_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
