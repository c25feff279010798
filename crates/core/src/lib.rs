//! # Herbwise Core
//!
//! Shared building blocks for Herbwise services.
//!
//! ## Modules
//!
//! - `config`: environment-driven configuration loading and validation
//! - `error`: the shared error type
//! - `hash`: deterministic, cross-platform string hashing
//! - `observability`: structured logging initialization
//! - `retry`: exponential backoff retry utilities

pub mod config;
pub mod error;
pub mod hash;
pub mod observability;
pub mod retry;

pub use config::{load_dotenv, parse_env_var, ConfigLoader, ServiceConfig};
pub use error::HerbwiseError;
pub use hash::hash_string;
pub use observability::{init_logging, LogConfig, LogFormat, ObservabilityError};
pub use retry::{retry_with_backoff, RetryPolicy};

/// Result type alias for Herbwise core operations
pub type Result<T> = std::result::Result<T, HerbwiseError>;
