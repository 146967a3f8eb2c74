//! Call core wiring.
//!
//! Builds the session store, deadline scheduler, history writer and the four
//! services around one broadcaster, and owns the background tasks that keep
//! them running.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::application::broadcaster::Broadcaster;
use crate::application::recorder::CallRecorder;
use crate::application::scheduler::TimeoutScheduler;
use crate::application::services::{CallService, ConferenceService, PresenceService, SignalRelay};
use crate::application::session_store::SessionStore;
use crate::domain::{CallRecordRepository, RelationshipOracle, UserDirectory};

/// Storage-side collaborators the core calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub relationships: Arc<dyn RelationshipOracle>,
    pub records: Arc<dyn CallRecordRepository>,
}

/// Timing knobs of the call core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTimings {
    pub ring_timeout: Duration,
    pub offline_grace: Duration,
    pub sweep_interval: Duration,
    pub inactivity_threshold: Duration,
}

impl Default for CoreTimings {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(30),
            offline_grace: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            inactivity_threshold: Duration::from_secs(300),
        }
    }
}

pub struct CallCore {
    pub store: Arc<SessionStore>,
    pub scheduler: Arc<TimeoutScheduler>,
    pub calls: Arc<CallService>,
    pub conferences: Arc<ConferenceService>,
    pub relay: SignalRelay,
    pub presence: Arc<PresenceService>,
    background: Mutex<Vec<AbortHandle>>,
}

impl CallCore {
    /// Build the core and start its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        broadcaster: Arc<dyn Broadcaster>,
        collaborators: Collaborators,
        timings: CoreTimings,
    ) -> Arc<Self> {
        let store = Arc::new(SessionStore::new());
        let (scheduler, fired) = TimeoutScheduler::new();
        let scheduler = Arc::new(scheduler);
        // The writer drains on its own once every recorder handle is gone
        let (recorder, _writer) = CallRecorder::spawn(collaborators.records);

        let calls = Arc::new(CallService::new(
            store.clone(),
            scheduler.clone(),
            broadcaster.clone(),
            recorder.clone(),
            collaborators.users,
            collaborators.relationships.clone(),
            timings.ring_timeout,
        ));
        let conferences = Arc::new(ConferenceService::new(
            store.clone(),
            broadcaster.clone(),
            recorder,
            collaborators.relationships.clone(),
        ));
        let relay = SignalRelay::new(store.clone(), broadcaster.clone());
        let presence = Arc::new(PresenceService::new(
            store.clone(),
            calls.clone(),
            conferences.clone(),
            broadcaster,
            collaborators.relationships,
            timings.offline_grace,
            timings.inactivity_threshold,
        ));

        let driver = tokio::spawn(calls.clone().run_timeout_driver(fired));
        let sweeper = presence.spawn_sweeper(timings.sweep_interval);

        tracing::info!(
            ring_timeout_secs = timings.ring_timeout.as_secs(),
            offline_grace_secs = timings.offline_grace.as_secs(),
            "Call core started"
        );

        Arc::new(Self {
            store,
            scheduler,
            calls,
            conferences,
            relay,
            presence,
            background: Mutex::new(vec![driver.abort_handle(), sweeper.abort_handle()]),
        })
    }

    /// Calls currently ringing or in progress.
    pub fn calls_in_flight(&self) -> usize {
        self.store.len()
    }

    /// Abort armed deadlines and stop the background tasks.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        for task in self.background.lock().drain(..) {
            task.abort();
        }
        tracing::info!(calls_in_flight = self.store.len(), "Call core stopped");
    }
}
