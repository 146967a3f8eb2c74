//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.
//!
//! ## Value Objects
//!
//! - **Topic**: Name of a publish-subscribe channel (`user:1`, `call:<uuid>`, ...)

mod topic;

pub use topic::*;
