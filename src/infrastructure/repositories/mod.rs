//! Repository Implementations
//!
//! PostgreSQL implementations of the collaborator traits defined in the
//! domain layer.
//!
//! ## Available Repositories
//!
//! - **PgCallRecordRepository** - Call history (`calls`, `call_participants`)
//! - **PgUserRepository** - Public user profiles (`users`)
//! - **PgRelationshipRepository** - Friendships and chat memberships
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{
//!     PgCallRecordRepository, PgRelationshipRepository, PgUserRepository,
//! };
//!
//! fn setup_repositories(pool: PgPool) {
//!     let records = PgCallRecordRepository::new(pool.clone());
//!     let users = PgUserRepository::new(pool.clone());
//!     let relationships = PgRelationshipRepository::new(pool);
//! }
//! ```

pub mod call_record_repository;
pub mod relationship_repository;
pub mod user_repository;

pub use call_record_repository::PgCallRecordRepository;
pub use relationship_repository::PgRelationshipRepository;
pub use user_repository::PgUserRepository;
