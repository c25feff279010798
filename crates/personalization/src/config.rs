//! Recommendation tuning loaded from the environment
//!
//! # Environment Variables
//!
//! - `HERBWISE_RECO_DEFAULT_LIMIT` (optional): items returned when the request has no limit (default: 20)
//! - `HERBWISE_RECO_MAX_LIMIT` (optional): upper bound on any requested limit (default: 100)
//! - `HERBWISE_RECO_SCORING_DEADLINE_MS` (optional): scoring budget per request (default: 150)
//! - `HERBWISE_RECO_FETCH_TIMEOUT_MS` (optional): timeout of each collaborator read (default: 200)
//! - `HERBWISE_RECO_CANDIDATE_RETRIES` (optional): retries of the candidate fetch (default: 2)
//! - `HERBWISE_RECO_LOG_BUFFER` (optional): recommendation log queue capacity (default: 1024)
//! - `HERBWISE_RECO_LOG_RETENTION_DAYS` (optional): recommendation log retention (default: 90)

use herbwise_core::{parse_env_var, ConfigLoader, HerbwiseError};
use std::time::Duration;

use crate::logger::DEFAULT_RETENTION_DAYS;

#[derive(Debug, Clone)]
pub struct PersonalizationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub scoring_deadline: Duration,
    pub fetch_timeout: Duration,
    pub candidate_retries: u32,
    pub log_buffer: usize,
    pub log_retention_days: u32,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            scoring_deadline: Duration::from_millis(150),
            fetch_timeout: Duration::from_millis(200),
            candidate_retries: 2,
            log_buffer: 1024,
            log_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl PersonalizationConfig {
    /// Requested limit, defaulted and clamped to `1..=max_limit`
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

impl ConfigLoader for PersonalizationConfig {
    fn from_env() -> Result<Self, HerbwiseError> {
        let defaults = PersonalizationConfig::default();

        let scoring_deadline_ms = parse_env_var(
            "HERBWISE_RECO_SCORING_DEADLINE_MS",
            defaults.scoring_deadline.as_millis() as u64,
        )?;
        let fetch_timeout_ms = parse_env_var(
            "HERBWISE_RECO_FETCH_TIMEOUT_MS",
            defaults.fetch_timeout.as_millis() as u64,
        )?;

        Ok(Self {
            default_limit: parse_env_var("HERBWISE_RECO_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: parse_env_var("HERBWISE_RECO_MAX_LIMIT", defaults.max_limit)?,
            scoring_deadline: Duration::from_millis(scoring_deadline_ms),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            candidate_retries: parse_env_var(
                "HERBWISE_RECO_CANDIDATE_RETRIES",
                defaults.candidate_retries,
            )?,
            log_buffer: parse_env_var("HERBWISE_RECO_LOG_BUFFER", defaults.log_buffer)?,
            log_retention_days: parse_env_var(
                "HERBWISE_RECO_LOG_RETENTION_DAYS",
                defaults.log_retention_days,
            )?,
        })
    }

    fn validate(&self) -> Result<(), HerbwiseError> {
        if self.default_limit == 0 {
            return Err(HerbwiseError::config(
                "default_limit must be greater than 0",
                "HERBWISE_RECO_DEFAULT_LIMIT",
            ));
        }

        if self.max_limit == 0 {
            return Err(HerbwiseError::config(
                "max_limit must be greater than 0",
                "HERBWISE_RECO_MAX_LIMIT",
            ));
        }

        if self.default_limit > self.max_limit {
            return Err(HerbwiseError::config(
                format!(
                    "default_limit ({}) must not exceed max_limit ({})",
                    self.default_limit, self.max_limit
                ),
                "HERBWISE_RECO_DEFAULT_LIMIT",
            ));
        }

        if self.scoring_deadline.is_zero() {
            return Err(HerbwiseError::config(
                "scoring deadline must be greater than 0ms",
                "HERBWISE_RECO_SCORING_DEADLINE_MS",
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(HerbwiseError::config(
                "fetch timeout must be greater than 0ms",
                "HERBWISE_RECO_FETCH_TIMEOUT_MS",
            ));
        }

        if self.log_buffer == 0 {
            return Err(HerbwiseError::config(
                "log buffer must be greater than 0",
                "HERBWISE_RECO_LOG_BUFFER",
            ));
        }

        if self.log_retention_days == 0 {
            return Err(HerbwiseError::config(
                "log retention must be at least one day",
                "HERBWISE_RECO_LOG_RETENTION_DAYS",
            ));
        }

        Ok(())
    }
}
