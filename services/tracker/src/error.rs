//! services/tracker/src/error.rs
//!
//! Defines the primary error type for the tracker service.

use crate::config::ConfigError;
use commission_guard_core::ports::PortError;

/// The primary error type for the `tracker` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A port failed while the service was starting, e.g. the ticket store could
    /// not open its change listener.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_store() -> Result<(), PortError> {
        Err(PortError::Unexpected("listener refused".to_string()))
    }

    fn start() -> Result<(), AppError> {
        start_store()?;
        Ok(())
    }

    #[test]
    fn test_port_failures_propagate_into_app_error() {
        let err = start().unwrap_err();
        assert!(matches!(err, AppError::Port(PortError::Unexpected(_))));
        assert!(err.to_string().contains("listener refused"));
    }
}
