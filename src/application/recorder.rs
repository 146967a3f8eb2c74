//! Call history writer.
//!
//! Decisions are made in memory first; the durable record follows on a
//! background task fed through an unbounded channel, so writes for one call
//! land in the order they were issued. A failed write is logged and counted,
//! never surfaced to the connection that caused it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{CallId, CallOutcome, CallRecord, CallRecordRepository, UserId};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, SignalingError};

#[derive(Debug)]
enum RecordCommand {
    Created(CallRecord),
    Accepted {
        call_id: CallId,
        at: DateTime<Utc>,
    },
    Joined {
        call_id: CallId,
        user_id: UserId,
        at: DateTime<Utc>,
    },
    Left {
        call_id: CallId,
        user_id: UserId,
        at: DateTime<Utc>,
    },
    Finished {
        call_id: CallId,
        outcome: CallOutcome,
        at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl RecordCommand {
    fn call_id(&self) -> CallId {
        match self {
            RecordCommand::Created(record) => record.id,
            RecordCommand::Accepted { call_id, .. }
            | RecordCommand::Joined { call_id, .. }
            | RecordCommand::Left { call_id, .. }
            | RecordCommand::Finished { call_id, .. } => *call_id,
        }
    }
}

/// Cheap handle for queueing writes.
#[derive(Clone)]
pub struct CallRecorder {
    tx: mpsc::UnboundedSender<RecordCommand>,
}

impl CallRecorder {
    /// Start the writer task. It runs until every recorder handle is dropped.
    pub fn spawn(repository: Arc<dyn CallRecordRepository>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RecordCommand>();

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let call_id = command.call_id();
                if let Err(e) = apply(repository.as_ref(), command).await {
                    let err = SignalingError::PersistenceFailure(e.to_string());
                    tracing::warn!(call_id = %call_id, error = %err, "Call record write failed");
                    metrics::record_persistence_failure();
                }
            }
            tracing::debug!("Call recorder drained");
        });

        (Self { tx }, task)
    }

    pub fn created(&self, record: CallRecord) {
        self.send(RecordCommand::Created(record));
    }

    pub fn accepted(&self, call_id: CallId, at: DateTime<Utc>) {
        self.send(RecordCommand::Accepted { call_id, at });
    }

    pub fn joined(&self, call_id: CallId, user_id: UserId, at: DateTime<Utc>) {
        self.send(RecordCommand::Joined { call_id, user_id, at });
    }

    pub fn left(&self, call_id: CallId, user_id: UserId, at: DateTime<Utc>) {
        self.send(RecordCommand::Left { call_id, user_id, at });
    }

    pub fn finished(
        &self,
        call_id: CallId,
        outcome: CallOutcome,
        at: DateTime<Utc>,
        duration_secs: Option<i64>,
    ) {
        self.send(RecordCommand::Finished {
            call_id,
            outcome,
            at,
            duration_secs,
        });
    }

    fn send(&self, command: RecordCommand) {
        if self.tx.send(command).is_err() {
            tracing::warn!("Call recorder is closed, dropping record");
        }
    }
}

async fn apply(repository: &dyn CallRecordRepository, command: RecordCommand) -> Result<(), AppError> {
    match command {
        RecordCommand::Created(record) => repository.create(&record).await,
        RecordCommand::Accepted { call_id, at } => repository.mark_accepted(call_id, at).await,
        RecordCommand::Joined { call_id, user_id, at } => {
            repository.add_participant(call_id, user_id, at).await
        }
        RecordCommand::Left { call_id, user_id, at } => {
            repository.mark_participant_left(call_id, user_id, at).await
        }
        RecordCommand::Finished {
            call_id,
            outcome,
            at,
            duration_secs,
        } => repository.finish(call_id, outcome, at, duration_secs).await,
    }
}
