//! Application Services
//!
//! The call core: everything that reads or mutates call sessions and
//! presence goes through these services.
//!
//! ## Available Services
//!
//! - **CallService**: Direct call lifecycle and ringing timeouts
//! - **ConferenceService**: Conference rosters and per-participant media state
//! - **SignalRelay**: Forwarding of opaque negotiation payloads
//! - **PresenceService**: Connections, status and inactivity sweeps

pub mod call_service;
pub mod conference_service;
pub mod presence_service;
pub mod signal_relay;

pub use call_service::{CallAction, CallService, CallSummary};
pub use conference_service::ConferenceService;
pub use presence_service::PresenceService;
pub use signal_relay::SignalRelay;
