//! # Call Server Library
//!
//! This crate provides call orchestration for a real-time messenger:
//! - WebSocket gateway carrying call, conference, media and presence events
//! - WebRTC offer/answer/ICE relay between call participants
//! - Ring timeouts, presence tracking and inactivity sweeps
//! - PostgreSQL-backed call history
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Call sessions, presence entries and collaborator traits
//! - **Application Layer**: Session store, scheduler and the call core services
//! - **Infrastructure Layer**: Database repositories, token verification, metrics
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! call_server/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, value objects, and traits
//! +-- application/    Call core services and events
//! +-- infrastructure/ Database, identity and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core call model
pub mod domain;

// Application layer - Call core
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
