//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::{CallCore, Collaborators};
use crate::config::Settings;
use crate::domain::IdentityProvider;
use crate::infrastructure::database;
use crate::infrastructure::identity::JwtIdentityProvider;
use crate::infrastructure::repositories::{
    PgCallRecordRepository, PgRelationshipRepository, PgUserRepository,
};
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::Gateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub core: Arc<CallCore>,
    pub gateway: Arc<Gateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the gateway and call core around the given collaborators.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        db: PgPool,
        collaborators: Collaborators,
        identity: Arc<dyn IdentityProvider>,
        settings: Settings,
    ) -> Self {
        let gateway = Arc::new(Gateway::new(settings.websocket.heartbeat_interval_ms));
        let core = CallCore::start(gateway.clone(), collaborators, settings.core_timings());

        Self {
            db,
            core,
            gateway,
            identity,
            settings: Arc::new(settings),
        }
    }
}

/// Build the router with the global middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors::create_cors_layer(&state.settings.cors);
    routes::create_router(state)
        .layer(logging::create_trace_layer())
        .layer(cors)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    core: Arc<CallCore>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        handlers::health::init_server_start();

        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        database::run_migrations(&db).await?;
        tracing::info!("Database migrations applied");

        let collaborators = Collaborators {
            users: Arc::new(PgUserRepository::new(db.clone())),
            relationships: Arc::new(PgRelationshipRepository::new(db.clone())),
            records: Arc::new(PgCallRecordRepository::new(db.clone())),
        };
        let identity = Arc::new(JwtIdentityProvider::new(&settings.jwt));

        let addr = settings.server_addr();
        let state = AppState::new(db, collaborators, identity, settings);
        let core = state.core.clone();

        // Build router with middleware
        let router = build_router(state);

        // Bind to address
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            core,
        })
    }

    /// Run the server until Ctrl-C, then stop the call core
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.core.shutdown();
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
