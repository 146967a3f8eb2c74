//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Database repositories (PostgreSQL)
//! - Token verification (JWT)
//! - Prometheus metrics

pub mod database;
pub mod identity;
pub mod metrics;
pub mod repositories;
