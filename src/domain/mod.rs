//! # Domain Layer
//!
//! The domain layer contains the core call and presence model.
//! It is independent of the transport and of the storage backends.
//!
//! ## Structure
//!
//! - **entities**: Call sessions, media state, presence entries and the
//!   collaborator traits (call records, user directory, relationships)
//! - **value_objects**: Immutable value types (broadcast topics)

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
