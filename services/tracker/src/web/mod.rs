//! services/tracker/src/web/mod.rs
//!
//! The WebSocket client surface and the service router.

pub mod protocol;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler so the binary can build the router directly.
pub use ws_handler::ws_handler;

use axum::{routing::get, Router};
use std::sync::Arc;

use state::AppState;

/// Builds the service router: the WebSocket endpoint plus a liveness probe.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

async fn health_handler() -> &'static str {
    "ok"
}
