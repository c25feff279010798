//! Collaborator interfaces for the scoring core
//!
//! Persistence lives behind these traits so the scoring logic only ever sees
//! plain records. The in-memory implementations back the service binary and
//! the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::ab_testing::Experiment;
use crate::error::{PersonalizationError, Result};
use crate::interest::{normalize_tag, InterestScore};
use crate::seasonal::{SeasonalBooster, SeasonalPromotion};
use crate::types::{Content, RecommendationContext, UserProfile};

/// Interest records keyed by (user_id, tag)
#[async_trait]
pub trait InterestStore: Send + Sync {
    async fn get_interest(&self, user_id: &str, tag: &str) -> Result<Option<InterestScore>>;
    async fn save_interest(&self, record: InterestScore) -> Result<()>;
    async fn interests_for_user(&self, user_id: &str) -> Result<Vec<InterestScore>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

/// Query passed to the content store when gathering candidates
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub user_id: String,
    pub context: Option<RecommendationContext>,
    /// Upper bound on the number of candidates to return
    pub limit: usize,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Content>>;
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// Promotions whose window contains `now`
    async fn active_promotions(&self, now: DateTime<Utc>) -> Result<Vec<SeasonalPromotion>>;
}

#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Experiments that are running at `now`
    async fn running_experiments(&self, now: DateTime<Utc>) -> Result<Vec<Experiment>>;
}

#[derive(Default)]
pub struct InMemoryInterestStore {
    records: DashMap<(String, String), InterestScore>,
}

impl InMemoryInterestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterestStore for InMemoryInterestStore {
    async fn get_interest(&self, user_id: &str, tag: &str) -> Result<Option<InterestScore>> {
        Ok(self
            .records
            .get(&(user_id.to_string(), normalize_tag(tag)))
            .map(|r| r.value().clone()))
    }

    async fn save_interest(&self, record: InterestScore) -> Result<()> {
        self.records
            .insert((record.user_id.clone(), record.tag.clone()), record);
        Ok(())
    }

    async fn interests_for_user(&self, user_id: &str) -> Result<Vec<InterestScore>> {
        let mut records: Vec<InterestScore> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.tag.cmp(&b.tag));
        Ok(records)
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<String, UserProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: UserProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.value().clone()))
    }
}

/// Content catalog held in memory; returns the most recent items first
#[derive(Default)]
pub struct InMemoryContentStore {
    items: RwLock<Vec<Content>>,
    unavailable: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new(items: Vec<Content>) -> Self {
        Self {
            items: RwLock::new(items),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn insert(&self, item: Content) {
        self.items.write().await.push(item);
    }

    /// Simulate an outage of the content store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Content>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersonalizationError::Storage(
                "content store unavailable".to_string(),
            ));
        }

        let mut items = self.items.read().await.clone();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(a.id.cmp(&b.id)));
        items.truncate(query.limit);
        Ok(items)
    }
}

#[derive(Default)]
pub struct InMemoryPromotionStore {
    promotions: RwLock<Vec<SeasonalPromotion>>,
}

impl InMemoryPromotionStore {
    pub fn new(promotions: Vec<SeasonalPromotion>) -> Self {
        Self {
            promotions: RwLock::new(promotions),
        }
    }

    pub async fn insert(&self, promotion: SeasonalPromotion) {
        self.promotions.write().await.push(promotion);
    }
}

#[async_trait]
impl PromotionStore for InMemoryPromotionStore {
    async fn active_promotions(&self, now: DateTime<Utc>) -> Result<Vec<SeasonalPromotion>> {
        let promotions = self.promotions.read().await;
        Ok(SeasonalBooster::new(promotions.as_slice())
            .find_active(now)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryExperimentStore {
    experiments: RwLock<Vec<Experiment>>,
}

impl InMemoryExperimentStore {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self {
            experiments: RwLock::new(experiments),
        }
    }

    pub async fn insert(&self, experiment: Experiment) {
        self.experiments.write().await.push(experiment);
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn running_experiments(&self, now: DateTime<Utc>) -> Result<Vec<Experiment>> {
        Ok(self
            .experiments
            .read()
            .await
            .iter()
            .filter(|e| e.is_running(now))
            .cloned()
            .collect())
    }
}
