//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Calls started, by kind (direct / conference)
//! - Call outcomes (completed / declined / cancelled / missed)
//! - Calls currently held in memory
//! - Signals relayed or dropped, by kind
//! - Active WebSocket connections
//! - Failed call-record writes

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::CallOutcome;

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Calls started, labelled by kind
pub static CALLS_STARTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("calls_started_total", "Total number of calls started").namespace("call_server"),
        &["kind"], // "direct", "conference"
    )
    .expect("Failed to create CALLS_STARTED_TOTAL metric")
});

/// Terminal call outcomes
pub static CALL_OUTCOMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("call_outcomes_total", "Total number of resolved calls by outcome")
            .namespace("call_server"),
        &["outcome"],
    )
    .expect("Failed to create CALL_OUTCOMES_TOTAL metric")
});

/// Calls currently ringing or in progress
pub static CALLS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("calls_in_flight", "Calls currently held in the session store")
            .namespace("call_server"),
    )
    .expect("Failed to create CALLS_IN_FLIGHT metric")
});

/// Relayed and dropped negotiation signals
pub static SIGNALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("signals_total", "Negotiation signals handled by the relay")
            .namespace("call_server"),
        &["kind", "result"], // result: "relayed", "dropped"
    )
    .expect("Failed to create SIGNALS_TOTAL metric")
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of authenticated WebSocket connections",
        )
        .namespace("call_server"),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Call-record writes that failed
pub static PERSISTENCE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "persistence_failures_total",
            "Call record writes rejected by the storage backend",
        )
        .namespace("call_server"),
    )
    .expect("Failed to create PERSISTENCE_FAILURES_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CALLS_STARTED_TOTAL.clone()))
        .expect("Failed to register CALLS_STARTED_TOTAL");
    registry
        .register(Box::new(CALL_OUTCOMES_TOTAL.clone()))
        .expect("Failed to register CALL_OUTCOMES_TOTAL");
    registry
        .register(Box::new(CALLS_IN_FLIGHT.clone()))
        .expect("Failed to register CALLS_IN_FLIGHT");
    registry
        .register(Box::new(SIGNALS_TOTAL.clone()))
        .expect("Failed to register SIGNALS_TOTAL");
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(PERSISTENCE_FAILURES_TOTAL.clone()))
        .expect("Failed to register PERSISTENCE_FAILURES_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_call_started(conference: bool) {
    let kind = if conference { "conference" } else { "direct" };
    CALLS_STARTED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_call_outcome(outcome: CallOutcome) {
    CALL_OUTCOMES_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
}

pub fn set_calls_in_flight(count: usize) {
    CALLS_IN_FLIGHT.set(count as i64);
}

pub fn record_signal(kind: &str, relayed: bool) {
    let result = if relayed { "relayed" } else { "dropped" };
    SIGNALS_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn websocket_connected() {
    WEBSOCKET_CONNECTIONS_ACTIVE.inc();
}

pub fn websocket_disconnected() {
    WEBSOCKET_CONNECTIONS_ACTIVE.dec();
}

pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES_TOTAL.inc();
}
