//! services/tracker/src/web/state.rs
//!
//! Defines the application state shared by every connection.

use crate::config::Config;
use commission_guard_core::ports::{IdentityProvider, TicketStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// Provider handles are injected here rather than held in globals, so each
/// connection's controller borrows the same backend explicitly.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn TicketStore>,
    pub config: Arc<Config>,
}
