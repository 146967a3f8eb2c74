//! HTTP Surface
//!
//! Health probes, Prometheus metrics and the call listing API.

pub mod handlers;
pub mod routes;
