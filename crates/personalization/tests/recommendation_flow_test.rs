//! End-to-end tests for the recommendation flow
//!
//! Drives `RecommendationService` through its public API with in-memory
//! collaborators.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use herbwise_personalization::{
    Algorithm, Collaborators, Constitution, Content, ContentType, Experiment,
    InMemoryContentStore, InMemoryExperimentStore, InMemoryInterestStore, InMemoryLogStore,
    InMemoryProfileStore, InMemoryPromotionStore, PersonalizationConfig, PersonalizationError,
    ProfileStore, RecommendationContext, RecommendationLogStore, RecommendationRequest,
    RecommendationService, SeasonalPromotion, TcmNature, UserProfile, Variant,
};
use std::sync::Arc;

struct Harness {
    service: RecommendationService,
    content: Arc<InMemoryContentStore>,
    profiles: Arc<InMemoryProfileStore>,
    log: Arc<InMemoryLogStore>,
}

fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 9, 0, 0).unwrap()
}

fn catalog() -> Vec<Content> {
    vec![
        Content::new("ginseng-guide", "Ginseng guide", ContentType::Article, day(1, 10))
            .with_tags(&["ginseng", "energy"])
            .with_popularity(40),
        Content::new("ginger-soup", "Ginger soup", ContentType::Recipe, day(1, 5))
            .with_tags(&["winter", "soup"])
            .with_nature(TcmNature::Warm)
            .with_popularity(10),
        Content::new("mung-bean", "Mung bean soup", ContentType::Recipe, day(1, 6))
            .with_tags(&["summer", "soup"])
            .with_nature(TcmNature::Cold)
            .with_popularity(90),
        Content::new("spring-tea", "Chrysanthemum tea", ContentType::Recipe, day(1, 1))
            .with_tags(&["spring", "tea"])
            .with_popularity(5),
    ]
}

fn harness_with(
    config: PersonalizationConfig,
    promotions: Vec<SeasonalPromotion>,
    experiments: Vec<Experiment>,
) -> Harness {
    let content = Arc::new(InMemoryContentStore::new(catalog()));
    let profiles = Arc::new(InMemoryProfileStore::new());
    let log = Arc::new(InMemoryLogStore::new());

    let stores = Collaborators {
        interests: Arc::new(InMemoryInterestStore::new()),
        profiles: profiles.clone(),
        content: content.clone(),
        promotions: Arc::new(InMemoryPromotionStore::new(promotions)),
        experiments: Arc::new(InMemoryExperimentStore::new(experiments)),
        recommendation_log: log.clone(),
    };

    Harness {
        service: RecommendationService::new(config, stores),
        content,
        profiles,
        log,
    }
}

fn harness() -> Harness {
    harness_with(PersonalizationConfig::default(), Vec::new(), Vec::new())
}

#[tokio::test]
async fn test_interests_drive_ranking() -> Result<()> {
    let h = harness();
    for _ in 0..10 {
        h.service
            .record_interaction("user-1", &["Ginseng".to_string()], false)
            .await?;
    }

    let response = h
        .service
        .recommend(RecommendationRequest::for_user("user-1").with_limit(3))
        .await?;

    assert_eq!(response.items.len(), 3);
    assert_eq!(response.items[0].content_id, "ginseng-guide");
    assert!((response.items[0].score - 0.632).abs() < 1e-3);
    assert_eq!(response.algorithm, Algorithm::InterestBased);
    assert!(response.ab_test_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_cold_start_falls_back_to_popular() -> Result<()> {
    let h = harness();

    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("newcomer"), day(2, 1))
        .await?;

    let ids: Vec<&str> = response.items.iter().map(|i| i.content_id.as_str()).collect();
    assert_eq!(ids, vec!["mung-bean", "ginseng-guide", "ginger-soup", "spring-tea"]);
    assert_eq!(response.algorithm, Algorithm::Popular);
    assert_eq!(response.items[0].reason.as_deref(), Some("Popular right now"));
    Ok(())
}

#[tokio::test]
async fn test_constitution_override_prefers_warming_content() -> Result<()> {
    let h = harness();
    let mut stored = UserProfile::new("user-2");
    stored.constitution = Some(Constitution::YinDeficiency);
    h.profiles.upsert(stored);

    let mut request = RecommendationRequest::for_user("user-2").with_limit(2);
    request.constitution = Some(Constitution::YangDeficiency);
    let response = h.service.recommend_at(request, day(2, 1)).await?;

    assert_eq!(response.items[0].content_id, "ginger-soup");
    assert!((response.items[0].score - 0.3).abs() < 1e-9);
    assert_eq!(
        response.items[0].reason.as_deref(),
        Some("Suits your yang-deficient constitution")
    );
    assert_eq!(response.algorithm, Algorithm::ProfileBased);
    Ok(())
}

#[tokio::test]
async fn test_seasonal_promotion_boosts_matching_content() -> Result<()> {
    let promotion = SeasonalPromotion::builder("Spring Liver Care", day(3, 1), day(5, 31))
        .global_boost_factor(1.3)
        .boosted_tag("spring")
        .build()?;
    let h = harness_with(PersonalizationConfig::default(), vec![promotion], Vec::new());

    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-3"), day(4, 10))
        .await?;
    assert_eq!(response.items[0].content_id, "spring-tea");
    assert!((response.items[0].score - 0.13).abs() < 1e-9);
    assert_eq!(response.algorithm, Algorithm::Seasonal);

    // outside the window nothing is boosted
    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-3"), day(7, 1))
        .await?;
    assert_eq!(response.algorithm, Algorithm::Popular);
    Ok(())
}

#[tokio::test]
async fn test_segment_targeted_promotion_skips_other_users() -> Result<()> {
    let promotion = SeasonalPromotion::builder("Members spring", day(3, 1), day(5, 31))
        .boosted_tag("spring")
        .target_segment("premium")
        .build()?;
    let h = harness_with(PersonalizationConfig::default(), vec![promotion], Vec::new());

    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-4"), day(4, 10))
        .await?;
    assert_eq!(response.algorithm, Algorithm::Popular);

    let mut request = RecommendationRequest::for_user("user-4");
    request.segments = Some(vec!["premium".to_string()]);
    let response = h.service.recommend_at(request, day(4, 10)).await?;
    assert_eq!(response.algorithm, Algorithm::Seasonal);
    assert_eq!(response.items[0].content_id, "spring-tea");
    Ok(())
}

#[tokio::test]
async fn test_experiment_variant_is_applied_and_logged() -> Result<()> {
    let experiment = Experiment::builder("homepage-ranking", day(1, 1), day(12, 31))
        .variant(Variant::new("A"))
        .variant(Variant::new("B").with_parameters(serde_json::json!({
            "content_type_boosts": { "recipe": 2.0 }
        })))
        .goal("click_through_rate")
        .build()?;
    let experiment_id = experiment.id.to_string();
    let h = harness_with(PersonalizationConfig::default(), Vec::new(), vec![experiment]);

    let mut stored = UserProfile::new("user123");
    stored.constitution = Some(Constitution::YangDeficiency);
    h.profiles.upsert(stored);

    let request = RecommendationRequest::for_user("user123")
        .with_context(RecommendationContext::Home)
        .with_limit(2);
    let response = h.service.recommend_at(request, day(6, 1)).await?;

    assert_eq!(response.ab_test_id.as_deref(), Some(experiment_id.as_str()));
    assert_eq!(response.ab_test_variant.as_deref(), Some("B"));
    assert_eq!(response.items[0].content_id, "ginger-soup");
    assert!((response.items[0].score - 0.6).abs() < 1e-9);

    h.service.logger().flush().await;
    let events = h.log.events_for_ab_test(&experiment_id).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].ab_test_variant.as_deref(), Some("B"));
    assert_eq!(events[0].context, Some(RecommendationContext::Home));
    assert_eq!(events[0].response_metrics.returned_count, 2);
    assert_eq!(events[0].response_metrics.candidate_count, 4);

    let stats = h.service.analytics().ab_test_stats(&experiment_id).await?;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].variant, "B");
    assert_eq!(stats[0].distinct_users, 1);
    Ok(())
}

#[tokio::test]
async fn test_candidate_outage_surfaces_error() {
    let h = harness();
    h.content.set_unavailable(true);

    let result = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-5"), day(2, 1))
        .await;

    assert!(matches!(result, Err(PersonalizationError::CandidateFetch(_))));
    h.service.logger().flush().await;
    assert!(h.log.is_empty().await);
}

struct SlowProfileStore;

#[async_trait]
impl ProfileStore for SlowProfileStore {
    async fn get_profile(&self, user_id: &str) -> herbwise_personalization::Result<Option<UserProfile>> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let mut profile = UserProfile::new(user_id);
        profile.constitution = Some(Constitution::YangDeficiency);
        Ok(Some(profile))
    }
}

#[tokio::test]
async fn test_slow_profile_store_degrades() -> Result<()> {
    let config = PersonalizationConfig {
        fetch_timeout: std::time::Duration::from_millis(50),
        ..PersonalizationConfig::default()
    };
    let stores = Collaborators {
        interests: Arc::new(InMemoryInterestStore::new()),
        profiles: Arc::new(SlowProfileStore),
        content: Arc::new(InMemoryContentStore::new(catalog())),
        promotions: Arc::new(InMemoryPromotionStore::default()),
        experiments: Arc::new(InMemoryExperimentStore::default()),
        recommendation_log: Arc::new(InMemoryLogStore::new()),
    };
    let service = RecommendationService::new(config, stores);

    let response = tokio_test::assert_ok!(
        service
            .recommend_at(RecommendationRequest::for_user("user-6"), day(2, 1))
            .await
    );
    assert_eq!(response.items.len(), 4);
    assert_eq!(response.algorithm, Algorithm::Popular);
    Ok(())
}

#[tokio::test]
async fn test_limit_is_clamped_and_events_logged() -> Result<()> {
    let config = PersonalizationConfig {
        default_limit: 2,
        max_limit: 3,
        ..PersonalizationConfig::default()
    };
    let h = harness_with(config, Vec::new(), Vec::new());

    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-7"), day(2, 1))
        .await?;
    assert_eq!(response.items.len(), 2);

    let response = h
        .service
        .recommend_at(
            RecommendationRequest::for_user("user-7").with_limit(50),
            day(2, 2),
        )
        .await?;
    assert_eq!(response.items.len(), 3);

    h.service.logger().flush().await;
    let events = h.log.events_for_user("user-7", day(1, 1)).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].content_ids.len(), 2);
    assert_eq!(events[1].algorithm, Algorithm::Popular);

    let stats = h
        .service
        .analytics()
        .user_stats("user-7", 30, day(2, 3))
        .await?;
    assert_eq!(stats[0].algorithm, Algorithm::Popular);
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].total_recommendations, 5);

    assert_eq!(h.service.analytics().purge_expired(day(6, 1)).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_recorded_interest_decays_but_keeps_floor() -> Result<()> {
    let h = harness();
    h.service
        .record_interaction("user-8", &["soup".to_string()], true)
        .await?;

    let later = Utc::now() + Duration::days(400);
    let response = h
        .service
        .recommend_at(RecommendationRequest::for_user("user-8").with_limit(2), later)
        .await?;

    // explicit interest floors at 0.3 however long ago
    assert_eq!(response.algorithm, Algorithm::InterestBased);
    assert!(response.items[0].score >= 0.3 - 1e-9);
    assert_eq!(response.items[0].content_id, "mung-bean");
    Ok(())
}
