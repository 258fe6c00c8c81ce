//! services/tracker/src/bin/tracker.rs

use commission_guard_core::ports::{IdentityProvider, TicketStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker_lib::{
    adapters::{db, MemoryBackend, PgIdentityAdapter, PgTicketStore},
    config::{Config, StoreBackend},
    error::AppError,
    web::{self, state::AppState},
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    // Configuration is validated before anything else starts; a bad value stops
    // the process with a typed error.
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("CommissionGuard cannot start: {}", e);
            return Err(e.into());
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded for app '{}'.", config.app_id);

    // --- 2. Build the Identity and Ticket Backends ---
    let identity: Arc<dyn IdentityProvider>;
    let store: Arc<dyn TicketStore>;
    match config.backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            info!("Database migrations complete.");
            identity = Arc::new(PgIdentityAdapter::new(pool.clone()));
            store = Arc::new(PgTicketStore::connect(pool, config.app_id.clone()).await?);
        }
        StoreBackend::Memory => {
            info!("Using the in-memory backend; tickets are lost on restart.");
            let backend = MemoryBackend::new();
            identity = Arc::new(backend.clone());
            store = Arc::new(backend);
        }
    }

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        identity,
        store,
        config: config.clone(),
    });
    let app = web::router(app_state);

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server stopped: {}", e);
        return Err(e.into());
    }

    Ok(())
}
