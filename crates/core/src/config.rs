//! Shared configuration loader for Herbwise services
//!
//! Configuration is read from environment variables with the `HERBWISE_`
//! prefix, optionally seeded from a `.env` file. Override order is
//! defaults < .env < environment.
//!
//! # Example
//!
//! ```no_run
//! use herbwise_core::config::{load_dotenv, ConfigLoader, ServiceConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! load_dotenv();
//!
//! let service_config = ServiceConfig::from_env()?;
//! service_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::HerbwiseError;
use std::time::Duration;

/// Configuration loader trait
///
/// Implemented by every configuration section so services load and validate
/// them the same way.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset optional values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a variable is set but cannot be parsed.
    fn from_env() -> Result<Self, HerbwiseError>;

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the offending variable.
    fn validate(&self) -> Result<(), HerbwiseError>;
}

/// HTTP service configuration
///
/// # Environment Variables
///
/// - `HERBWISE_SERVICE_HOST` (optional): bind host (default: "0.0.0.0")
/// - `HERBWISE_SERVICE_PORT` (optional): bind port (default: 8082)
/// - `HERBWISE_SERVICE_WORKERS` (optional): worker threads (default: CPU count)
/// - `HERBWISE_SERVICE_REQUEST_TIMEOUT` (optional): request timeout in seconds (default: 30)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            workers: num_cpus::get(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, HerbwiseError> {
        let defaults = ServiceConfig::default();

        let host = std::env::var("HERBWISE_SERVICE_HOST").unwrap_or(defaults.host);

        let port = match std::env::var("HERBWISE_SERVICE_PORT") {
            Ok(_) => parse_env_var("HERBWISE_SERVICE_PORT", defaults.port)?,
            Err(_) => parse_env_var("PORT", defaults.port)?,
        };

        let workers = parse_env_var("HERBWISE_SERVICE_WORKERS", defaults.workers)?;

        let request_timeout_secs = parse_env_var(
            "HERBWISE_SERVICE_REQUEST_TIMEOUT",
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            host,
            port,
            workers,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), HerbwiseError> {
        if self.port == 0 {
            return Err(HerbwiseError::config(
                "port must be greater than 0",
                "HERBWISE_SERVICE_PORT",
            ));
        }

        if self.workers == 0 {
            return Err(HerbwiseError::config(
                "workers must be greater than 0",
                "HERBWISE_SERVICE_WORKERS",
            ));
        }

        if self.request_timeout.as_secs() == 0 {
            return Err(HerbwiseError::config(
                "request_timeout must be greater than 0 seconds",
                "HERBWISE_SERVICE_REQUEST_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable, returning `default` when it is unset.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the variable is set but fails to parse.
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, HerbwiseError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| HerbwiseError::config(format!("Failed to parse {}: {}", key, e), key)),
        Err(_) => Ok(default),
    }
}

/// Load a `.env` file if present. A missing file is not an error.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "Failed to load .env file");
        }
    }
}
