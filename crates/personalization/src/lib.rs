//! Herbwise personalization core
//!
//! Scores recommendation candidates for the Herbwise TCM wellness app from
//! decaying user interests, body-constitution preferences, seasonal
//! promotions and A/B test variants, and logs what was served so the
//! experiments can be evaluated.

pub mod ab_testing;
pub mod config;
pub mod constitution;
pub mod error;
pub mod http;
pub mod interest;
pub mod logger;
pub mod recommendation;
pub mod repository;
pub mod scorer;
pub mod seasonal;
pub mod types;

// Re-export key types
pub use ab_testing::{select_assignment, Assignment, Experiment, ExperimentBuilder, Variant};
pub use config::PersonalizationConfig;
pub use constitution::{Constitution, ProfileMatch};
pub use error::{PersonalizationError, Result};
pub use interest::{apply_time_decay, record_interaction, InterestScore, InterestTracker};
pub use logger::{
    AlgorithmStats, InMemoryLogStore, LogAnalytics, RecommendationEvent, RecommendationLogStore,
    RecommendationLogger, ResponseMetrics, VariantStats,
};
pub use recommendation::{Collaborators, RecommendationService};
pub use repository::{
    CandidateQuery, ContentStore, ExperimentStore, InMemoryContentStore,
    InMemoryExperimentStore, InMemoryInterestStore, InMemoryProfileStore,
    InMemoryPromotionStore, InterestStore, ProfileStore, PromotionStore,
};
pub use scorer::{popular_fallback, CandidateScorer, ScoringOutcome, ScoringWeights};
pub use seasonal::{
    PromotedContent, Recurrence, RecurrencePattern, SeasonalBooster, SeasonalPromotion,
};
pub use types::*;
