//! services/tracker/src/config.rs
//!
//! Defines the service configuration and its loading logic.
//!
//! All configuration is loaded from environment variables at startup and
//! validated once. The `.env` file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which document store and identity provider backs the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("'{}' is not one of postgres, memory", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Scopes the ticket collection; several deployments can share one database.
    pub app_id: String,
    pub backend: StoreBackend,
    /// Always `Some` when `backend` is `Postgres`.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to keep tests hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let app_id = lookup("COMMISSION_APP_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("COMMISSION_APP_ID".to_string()))?;

        let backend = match lookup("STORE_BACKEND") {
            Some(value) => value
                .parse::<StoreBackend>()
                .map_err(|e| ConfigError::InvalidValue("STORE_BACKEND".to_string(), e))?,
            None => StoreBackend::Postgres,
        };

        // --- Database settings are only required for the Postgres backend ---
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "DATABASE_MAX_CONNECTIONS".to_string(),
                        format!("'{}' is not a positive integer", value),
                    )
                })?,
            None => 5,
        };

        Ok(Self {
            bind_address,
            log_level,
            app_id,
            backend,
            database_url,
            database_max_connections,
        })
    }
}
