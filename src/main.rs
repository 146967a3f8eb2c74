//! # Call Server
//!
//! Call orchestration and WebRTC signaling relay for a real-time messenger.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool
//! - HTTP/WebSocket server and the call core

use anyhow::Result;
use tracing::info;

use call_server::config::Settings;
use call_server::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    call_server::telemetry::init_tracing();

    info!("Starting Call Server...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        ring_timeout_secs = settings.calls.ring_timeout_secs,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    info!("Server stopped");
    Ok(())
}
