//! Application Layer
//!
//! The call core. Owns the session store and the ringing deadlines, and
//! orchestrates the domain model between the transport (which feeds it
//! events and implements the broadcaster) and the storage collaborators.

pub mod broadcaster;
pub mod call_core;
pub mod events;
pub mod recorder;
pub mod scheduler;
pub mod services;
pub mod session_store;


pub use broadcaster::Broadcaster;
pub use call_core::{CallCore, Collaborators, CoreTimings};
pub use events::ServerEvent;
