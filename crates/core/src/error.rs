//! Error type shared by Herbwise services

use thiserror::Error;

/// Errors raised by the shared infrastructure layer
#[derive(Debug, Error)]
pub enum HerbwiseError {
    /// A configuration value is missing, unparsable or out of range
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable responsible for the failure, if known
        key: Option<String>,
    },
}

impl HerbwiseError {
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HerbwiseError::config("port must be greater than 0", "HERBWISE_SERVICE_PORT");
        assert_eq!(
            err.to_string(),
            "Configuration error: port must be greater than 0"
        );
    }

    #[test]
    fn test_error_keeps_offending_key() {
        let err = HerbwiseError::config("workers must be greater than 0", "HERBWISE_SERVICE_WORKERS");
        let HerbwiseError::ConfigurationError { key, .. } = err;
        assert_eq!(key.as_deref(), Some("HERBWISE_SERVICE_WORKERS"));
    }
}
