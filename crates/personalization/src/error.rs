use herbwise_core::HerbwiseError;

pub type Result<T> = std::result::Result<T, PersonalizationError>;

#[derive(Debug, thiserror::Error)]
pub enum PersonalizationError {
    #[error("Invalid experiment definition: {0}")]
    InvalidExperiment(String),

    #[error("Invalid seasonal promotion: {0}")]
    InvalidPromotion(String),

    #[error("Failed to fetch candidate content: {0}")]
    CandidateFetch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Recommendation log channel closed")]
    LogChannelClosed,

    #[error(transparent)]
    Config(#[from] HerbwiseError),
}

impl PersonalizationError {
    /// Failures that may clear up on a retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Storage(_))
    }
}
