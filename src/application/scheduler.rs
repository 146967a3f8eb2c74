//! Ringing Timeout Scheduler
//!
//! One cancellable deadline per ringing call. A deadline lives in `armed`
//! until either its timer task or `cancel` removes it; only the remover acts.
//! Fired call ids are sent to the driver, which runs the timeout handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::domain::CallId;

struct ArmedDeadline {
    token: u64,
    abort: Option<AbortHandle>,
}

pub struct TimeoutScheduler {
    armed: Arc<DashMap<CallId, ArmedDeadline>>,
    next_token: AtomicU64,
    fired_tx: mpsc::UnboundedSender<CallId>,
}

impl TimeoutScheduler {
    /// Create a scheduler and the receiver of fired call ids.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            armed: Arc::new(DashMap::new()),
            next_token: AtomicU64::new(1),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Arm a deadline for `call_id`, replacing any earlier one.
    pub fn schedule(&self, call_id: CallId, after: Duration) {
        self.cancel(call_id);

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.armed.insert(call_id, ArmedDeadline { token, abort: None });

        let armed = Arc::clone(&self.armed);
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if armed
                .remove_if(&call_id, |_, deadline| deadline.token == token)
                .is_some()
            {
                tracing::debug!(call_id = %call_id, "Ringing deadline fired");
                let _ = fired_tx.send(call_id);
            }
        });

        if let Some(mut deadline) = self.armed.get_mut(&call_id) {
            if deadline.token == token {
                deadline.abort = Some(task.abort_handle());
            }
        }
    }

    /// Disarm the deadline. Returns false if there was none or it already fired.
    ///
    /// After a `true` return the timeout handler is guaranteed not to run for
    /// this deadline.
    pub fn cancel(&self, call_id: CallId) -> bool {
        match self.armed.remove(&call_id) {
            Some((_, deadline)) => {
                if let Some(abort) = deadline.abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, call_id: &CallId) -> bool {
        self.armed.contains_key(call_id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Abort every armed deadline.
    pub fn shutdown(&self) {
        let call_ids: Vec<CallId> = self.armed.iter().map(|entry| *entry.key()).collect();
        let cancelled = call_ids.into_iter().filter(|id| self.cancel(*id)).count();
        tracing::info!(cancelled, "Timeout scheduler stopped");
    }
}
