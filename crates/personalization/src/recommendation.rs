//! Recommendation orchestration
//!
//! Gathers every scoring input from the collaborators, runs the candidate
//! scorer and logs the result. Optional inputs (interests, profile,
//! experiments, promotions) degrade to empty when their store fails or is
//! slow; only the candidate fetch is mandatory.
//!
//! Steps:
//! 1. Clamp the requested limit
//! 2. Fetch optional inputs concurrently, each under a timeout
//! 3. Fetch candidates with timeout and retry
//! 4. Decay interests, bucket the user, derive scoring weights
//! 5. Score under the scoring deadline
//! 6. Fall back to popular ordering when nothing personalized fired
//! 7. Log the event off the request path

use chrono::{DateTime, Utc};
use herbwise_core::retry::{retry_with_backoff, RetryPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::ab_testing::select_assignment;
use crate::config::PersonalizationConfig;
use crate::error::{PersonalizationError, Result};
use crate::interest::{InterestScore, InterestTracker};
use crate::logger::{LogAnalytics, RecommendationEvent, RecommendationLogStore, RecommendationLogger};
use crate::repository::{
    CandidateQuery, ContentStore, ExperimentStore, InterestStore, ProfileStore, PromotionStore,
};
use crate::scorer::{popular_fallback, CandidateScorer, ScoringWeights};
use crate::seasonal::{SeasonalBooster, SeasonalPromotion};
use crate::types::{
    Algorithm, RecommendationRequest, RecommendationResponse, RecommendedItem, UserProfile,
};

/// Candidates requested per returned item
const CANDIDATE_POOL_MULTIPLIER: usize = 5;

/// Stores the service reads from and writes to
#[derive(Clone)]
pub struct Collaborators {
    pub interests: Arc<dyn InterestStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub content: Arc<dyn ContentStore>,
    pub promotions: Arc<dyn PromotionStore>,
    pub experiments: Arc<dyn ExperimentStore>,
    pub recommendation_log: Arc<dyn RecommendationLogStore>,
}

async fn with_timeout<T, F>(operation: &str, timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PersonalizationError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Value of an optional read, or its default when the read failed
fn or_degraded<T: Default>(operation: &str, user_id: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(
                operation = %operation,
                user_id = %user_id,
                error = %e,
                "Optional input unavailable, continuing without it"
            );
            T::default()
        }
    }
}

/// Stored profile with per-request overrides applied on top
fn merge_profile(
    stored: Option<UserProfile>,
    request: &RecommendationRequest,
) -> UserProfile {
    let mut profile = stored.unwrap_or_else(|| UserProfile::new(request.user_id.clone()));

    if let Some(constitution) = request.constitution {
        profile.constitution = Some(constitution);
    }
    if let Some(segments) = &request.segments {
        profile.segments = segments.clone();
    }
    if let Some(region) = &request.region {
        profile.region = Some(region.clone());
    }

    profile
}

pub struct RecommendationService {
    config: PersonalizationConfig,
    stores: Collaborators,
    tracker: InterestTracker,
    logger: RecommendationLogger,
}

impl RecommendationService {
    /// Must be called inside a Tokio runtime; spawns the log writer.
    pub fn new(config: PersonalizationConfig, stores: Collaborators) -> Self {
        let tracker = InterestTracker::new(Arc::clone(&stores.interests));
        let logger =
            RecommendationLogger::new(Arc::clone(&stores.recommendation_log), config.log_buffer);

        Self {
            config,
            stores,
            tracker,
            logger,
        }
    }

    pub fn config(&self) -> &PersonalizationConfig {
        &self.config
    }

    pub fn logger(&self) -> &RecommendationLogger {
        &self.logger
    }

    pub fn analytics(&self) -> LogAnalytics {
        LogAnalytics::new(
            Arc::clone(&self.stores.recommendation_log),
            self.config.log_retention_days,
        )
    }

    /// Record one interaction of `user_id` with content carrying `tags`
    pub async fn record_interaction(
        &self,
        user_id: &str,
        tags: &[String],
        explicit: bool,
    ) -> Result<Vec<InterestScore>> {
        self.tracker.record(user_id, tags, explicit, Utc::now()).await
    }

    pub async fn recommend(&self, request: RecommendationRequest) -> Result<RecommendationResponse> {
        self.recommend_at(request, Utc::now()).await
    }

    /// Recommend as of `now`
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn recommend_at(
        &self,
        request: RecommendationRequest,
        now: DateTime<Utc>,
    ) -> Result<RecommendationResponse> {
        let started = Instant::now();
        let user_id = request.user_id.as_str();
        let timeout = self.config.fetch_timeout;

        // Step 1: clamp the limit
        let limit = self.config.effective_limit(request.limit);

        // Step 2: optional inputs, concurrently
        let (interests, stored_profile, experiments, promotions) = tokio::join!(
            with_timeout(
                "fetch_interests",
                timeout,
                self.stores.interests.interests_for_user(user_id)
            ),
            with_timeout("fetch_profile", timeout, self.stores.profiles.get_profile(user_id)),
            with_timeout(
                "fetch_experiments",
                timeout,
                self.stores.experiments.running_experiments(now)
            ),
            with_timeout(
                "fetch_promotions",
                timeout,
                self.stores.promotions.active_promotions(now)
            ),
        );
        let interests = or_degraded("fetch_interests", user_id, interests);
        let profile = merge_profile(or_degraded("fetch_profile", user_id, stored_profile), &request);
        let experiments = or_degraded("fetch_experiments", user_id, experiments);
        let promotions: Vec<SeasonalPromotion> = or_degraded("fetch_promotions", user_id, promotions);

        // Step 3: candidates, mandatory
        let query = CandidateQuery {
            user_id: user_id.to_string(),
            context: request.context,
            limit: limit.saturating_mul(CANDIDATE_POOL_MULTIPLIER),
        };
        let policy = RetryPolicy {
            max_retries: self.config.candidate_retries,
            ..RetryPolicy::default()
        };
        let content = &self.stores.content;
        let query_ref = &query;
        let candidates = retry_with_backoff(
            move || with_timeout("fetch_candidates", timeout, content.candidates(query_ref)),
            policy,
            |e: &PersonalizationError| e.is_transient(),
        )
        .await
        .map_err(|e| PersonalizationError::CandidateFetch(e.to_string()))?;

        // Step 4: decay, bucketing, weights
        let decayed: HashMap<String, f64> = interests
            .iter()
            .map(|record| (record.tag.clone(), record.decayed_score(now)))
            .collect();
        let assignment = select_assignment(&experiments, user_id, now);
        let weights = assignment
            .as_ref()
            .map(|a| ScoringWeights::from_parameters(&a.variant.parameters))
            .unwrap_or_default();
        let targeted: Vec<SeasonalPromotion> = SeasonalBooster::new(&promotions)
            .find_for_user(&profile, now)
            .into_iter()
            .cloned()
            .collect();

        // Step 5: score under the deadline
        let scorer = CandidateScorer::new(user_id, &decayed, Some(&profile), &targeted, &weights);
        let deadline = Instant::now() + self.config.scoring_deadline;
        let outcome = scorer.rank(&candidates, limit, Some(deadline));

        // Step 6: popular fallback
        let (items, algorithm): (Vec<RecommendedItem>, Algorithm) = if outcome.is_personalized() {
            let algorithm = outcome.algorithm();
            (outcome.items.into_iter().map(Into::into).collect(), algorithm)
        } else {
            debug!(user_id = %user_id, "No personalization signal, using popular ordering");
            (popular_fallback(&candidates, limit), Algorithm::Popular)
        };

        let ab_test_id = assignment.as_ref().map(|a| a.experiment_id.to_string());
        let ab_test_variant = assignment.as_ref().map(|a| a.variant.name.clone());

        // Step 7: log off the request path
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let mut event = RecommendationEvent::new(
            user_id,
            items.iter().map(|i| i.content_id.clone()).collect(),
            algorithm,
            now,
        )
        .with_context(request.context)
        .with_request_parameters(serde_json::to_value(&request).unwrap_or_default())
        .with_metrics(processing_time_ms, candidates.len());
        if let (Some(id), Some(variant)) = (&ab_test_id, &ab_test_variant) {
            event = event.with_ab_test(id.clone(), variant.clone());
        }
        self.logger.log(event);

        info!(
            user_id = %user_id,
            algorithm = algorithm.as_str(),
            returned = items.len(),
            candidates = candidates.len(),
            processing_time_ms,
            "Served recommendations"
        );

        Ok(RecommendationResponse {
            items,
            algorithm,
            ab_test_id,
            ab_test_variant,
        })
    }
}
