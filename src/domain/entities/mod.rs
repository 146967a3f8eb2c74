//! # Domain Entities
//!
//! Core entities of the call core and the collaborator contracts it depends on.
//!
//! ## Entities
//!
//! - **CallSession**: A ringing or in-progress call, direct or conference
//! - **ParticipantMediaState**: Per-participant media flags within a call
//! - **PresenceEntry**: A user's live connections and coarse status
//!
//! ## Collaborator Traits
//!
//! - **CallRecordRepository**: Best-effort call history writer
//! - **UserDirectory** / **IdentityProvider**: Who a user is
//! - **RelationshipOracle**: Friendships and chat memberships
//!
//! The traits are implemented in the infrastructure layer, following the
//! dependency inversion principle.

mod call;
mod presence;
mod relationship;
mod user;

pub use call::{
    CallId, CallOutcome, CallRecord, CallRecordRepository, CallSession, CallStatus, CallType,
    ChatId, EndReason, MediaToggle, ParticipantMediaState, UserId, VideoQuality,
};
pub use presence::{ConnectionId, PresenceEntry};
pub use relationship::RelationshipOracle;
pub use user::{IdentityProvider, UserDirectory, UserProfile, UserStatus};

#[cfg(test)]
pub use call::MockCallRecordRepository;
#[cfg(test)]
pub use relationship::MockRelationshipOracle;
#[cfg(test)]
pub use user::MockUserDirectory;
