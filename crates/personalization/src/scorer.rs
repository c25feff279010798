//! Candidate scoring
//!
//! Combines the user's decayed interests, constitution-based profile
//! bonuses, experiment weights and seasonal boosts into one ranking score
//! per candidate. Scoring is pure and synchronous; the caller gathers every
//! input beforehand.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::constitution::ProfileMatch;
use crate::interest::normalize_tag;
use crate::seasonal::{SeasonalBooster, SeasonalPromotion};
use crate::types::{Algorithm, Content, RecommendedItem, UserProfile};

/// Base affinity for a user without any recorded interests
pub const COLD_START_AFFINITY: f64 = 0.1;
/// Bonus when a content tag matches one of the user's health goals
pub const GOAL_MATCH_BONUS: f64 = 0.1;

/// Ranking knobs an experiment variant may override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub interest_weight: f64,
    pub profile_weight: f64,
    /// Multiplier per tag
    pub tag_boosts: HashMap<String, f64>,
    /// Multiplier per content type name
    pub content_type_boosts: HashMap<String, f64>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            interest_weight: 1.0,
            profile_weight: 1.0,
            tag_boosts: HashMap::new(),
            content_type_boosts: HashMap::new(),
        }
    }
}

impl ScoringWeights {
    /// Read weights from variant parameters. Missing keys keep their
    /// defaults; malformed parameters fall back to the defaults entirely.
    pub fn from_parameters(parameters: &serde_json::Value) -> Self {
        if !parameters.is_object() {
            return Self::default();
        }

        match serde_json::from_value::<ScoringWeights>(parameters.clone()) {
            Ok(mut weights) => {
                weights.tag_boosts = weights
                    .tag_boosts
                    .into_iter()
                    .map(|(tag, boost)| (normalize_tag(&tag), boost))
                    .collect();
                weights
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed scoring parameters");
                Self::default()
            }
        }
    }

    fn multiplier_for(&self, content: &Content) -> f64 {
        let tag_multiplier = content
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .collect::<HashSet<_>>()
            .iter()
            .filter_map(|tag| self.tag_boosts.get(tag))
            .product::<f64>();

        let type_multiplier = self
            .content_type_boosts
            .get(content.content_type.as_str())
            .copied()
            .unwrap_or(1.0);

        tag_multiplier * type_multiplier
    }
}

/// Which personalization signals contributed to a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub interest: bool,
    pub profile: bool,
    pub seasonal: bool,
}

impl Signals {
    pub fn any(&self) -> bool {
        self.interest || self.profile || self.seasonal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub content_id: String,
    pub score: f64,
    pub reason: Option<String>,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub signals: Signals,
}

impl From<ScoredCandidate> for RecommendedItem {
    fn from(candidate: ScoredCandidate) -> Self {
        RecommendedItem {
            content_id: candidate.content_id,
            score: candidate.score,
            reason: candidate.reason,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    /// Ranked and truncated
    pub items: Vec<ScoredCandidate>,
    pub scored: usize,
    pub total: usize,
    pub deadline_exceeded: bool,
}

impl ScoringOutcome {
    /// Algorithm label from the signals present in the returned items
    pub fn algorithm(&self) -> Algorithm {
        let mut signals = Signals::default();
        for item in &self.items {
            signals.interest |= item.signals.interest;
            signals.profile |= item.signals.profile;
            signals.seasonal |= item.signals.seasonal;
        }

        match (signals.interest, signals.profile, signals.seasonal) {
            (false, false, false) => Algorithm::Popular,
            (true, false, false) => Algorithm::InterestBased,
            (false, true, false) => Algorithm::ProfileBased,
            (false, false, true) => Algorithm::Seasonal,
            _ => Algorithm::Hybrid,
        }
    }

    pub fn is_personalized(&self) -> bool {
        self.items.iter().any(|item| item.signals.any())
    }
}

/// Score descending, then newer first, then id ascending
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.content_id.cmp(&b.content_id))
}

pub struct CandidateScorer<'a> {
    user_id: &'a str,
    /// Decayed interest score per normalized tag
    interests: &'a HashMap<String, f64>,
    profile: Option<&'a UserProfile>,
    promotions: &'a [SeasonalPromotion],
    weights: &'a ScoringWeights,
    goals: HashSet<String>,
}

impl<'a> CandidateScorer<'a> {
    pub fn new(
        user_id: &'a str,
        interests: &'a HashMap<String, f64>,
        profile: Option<&'a UserProfile>,
        promotions: &'a [SeasonalPromotion],
        weights: &'a ScoringWeights,
    ) -> Self {
        let goals = profile
            .map(|p| p.goals.iter().map(|g| normalize_tag(g)).collect())
            .unwrap_or_default();

        Self {
            user_id,
            interests,
            profile,
            promotions,
            weights,
            goals,
        }
    }

    pub fn score(&self, content: &Content) -> ScoredCandidate {
        let tags: HashSet<String> = content.tags.iter().map(|t| normalize_tag(t)).collect();

        // Step 1: interest affinity
        let (affinity, top_interest) = if self.interests.is_empty() {
            (COLD_START_AFFINITY, None)
        } else {
            let mut affinity = 0.0;
            let mut top: Option<(&str, f64)> = None;
            for tag in &tags {
                if let Some(&interest) = self.interests.get(tag) {
                    affinity += interest;
                    let better = top.map_or(true, |(best_tag, best)| {
                        interest > best || (interest == best && tag.as_str() < best_tag)
                    });
                    if better {
                        top = Some((tag.as_str(), interest));
                    }
                }
            }
            (affinity, top.map(|(tag, _)| tag.to_string()))
        };
        let interest_contribution = self.weights.interest_weight * affinity;

        // Step 2: profile bonus
        let profile_match = self
            .profile
            .and_then(|p| p.constitution)
            .map(|c| (c, ProfileMatch::evaluate(c, &content.tcm)));
        let matched_goal = tags.iter().filter(|t| self.goals.contains(*t)).min().cloned();

        let mut profile_bonus = profile_match.map(|(_, m)| m.bonus()).unwrap_or(0.0);
        if matched_goal.is_some() {
            profile_bonus += GOAL_MATCH_BONUS;
        }
        let profile_contribution = self.weights.profile_weight * profile_bonus;

        // Step 3: variant multipliers and seasonal boost
        let base = (interest_contribution + profile_contribution)
            * self.weights.multiplier_for(content);
        let seasonal_factor = SeasonalBooster::boost_factor_for(content, self.promotions);
        let score = base * seasonal_factor;

        // A boost on a zero base changes nothing and is not a signal
        let seasonal_uplift = score - base;
        let signals = Signals {
            interest: top_interest.is_some(),
            profile: profile_bonus > 0.0,
            seasonal: seasonal_uplift > 0.0,
        };

        let reason = if !signals.any() {
            None
        } else if signals.seasonal
            && seasonal_uplift >= interest_contribution
            && seasonal_uplift >= profile_contribution
        {
            self.promotions
                .iter()
                .filter(|p| p.matches_content(content))
                .max_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.name.cmp(&a.name)))
                .map(|p| format!("Seasonal pick: {}", p.name))
        } else if signals.interest && interest_contribution >= profile_contribution {
            top_interest.map(|tag| format!("Because you're interested in {tag}"))
        } else if let Some((constitution, _)) = profile_match.filter(|(_, m)| m.any()) {
            Some(format!("Suits your {} constitution", constitution.label()))
        } else {
            matched_goal.map(|goal| format!("Supports your {goal} goal"))
        };

        ScoredCandidate {
            content_id: content.id.clone(),
            score,
            reason,
            published_at: content.published_at,
            signals,
        }
    }

    /// Score candidates until done or until `deadline` passes, then rank
    /// whatever was scored and keep the top `limit`.
    #[instrument(skip_all, fields(user_id = %self.user_id, candidates = candidates.len()))]
    pub fn rank(
        &self,
        candidates: &[Content],
        limit: usize,
        deadline: Option<Instant>,
    ) -> ScoringOutcome {
        let mut scored = Vec::with_capacity(candidates.len());
        let mut deadline_exceeded = false;

        for content in candidates {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                deadline_exceeded = true;
                break;
            }
            scored.push(self.score(content));
        }

        if deadline_exceeded {
            warn!(
                user_id = %self.user_id,
                scored = scored.len(),
                total = candidates.len(),
                "Scoring deadline exceeded, ranking partial set"
            );
        }

        let scored_count = scored.len();
        scored.sort_by(rank_order);
        scored.truncate(limit);

        debug!(
            user_id = %self.user_id,
            returned = scored.len(),
            "Ranked candidates"
        );

        ScoringOutcome {
            items: scored,
            scored: scored_count,
            total: candidates.len(),
            deadline_exceeded,
        }
    }
}

/// Non-personalized ordering: popularity descending, then newer first, then
/// id. Scores are popularity relative to the most popular candidate.
pub fn popular_fallback(candidates: &[Content], limit: usize) -> Vec<RecommendedItem> {
    let mut ordered: Vec<&Content> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        b.popularity
            .cmp(&a.popularity)
            .then_with(|| b.published_at.cmp(&a.published_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered.truncate(limit);

    let max_popularity = ordered.first().map(|c| c.popularity).unwrap_or(0);

    ordered
        .into_iter()
        .map(|content| RecommendedItem {
            content_id: content.id.clone(),
            score: if max_popularity == 0 {
                0.0
            } else {
                content.popularity as f64 / max_popularity as f64
            },
            reason: Some("Popular right now".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitution::Constitution;
    use crate::types::{ContentType, TcmNature};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn date(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
    }

    fn interests(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn test_interest_affinity_sums_matching_tags() {
        let interests = interests(&[("ginseng", 0.6), ("sleep", 0.3), ("tea", 0.9)]);
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);

        let content = Content::new("c1", "Ginseng for sleep", ContentType::Article, date(1, 1))
            .with_tags(&["Ginseng", "sleep", "ginseng"]);
        let scored = scorer.score(&content);

        assert!((scored.score - 0.9).abs() < 1e-9);
        assert!(scored.signals.interest);
        assert_eq!(
            scored.reason.as_deref(),
            Some("Because you're interested in ginseng")
        );
    }

    #[test]
    fn test_constitution_scenario() {
        let interests = interests(&[("winter", 0.4)]);
        let mut profile = UserProfile::new("u1");
        profile.constitution = Some(Constitution::YangDeficiency);
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, Some(&profile), &[], &weights);

        let warming = Content::new("warm", "Ginger soup", ContentType::Recipe, date(1, 1))
            .with_tags(&["winter"])
            .with_nature(TcmNature::Warm);
        let cooling = Content::new("cool", "Mung bean soup", ContentType::Recipe, date(1, 2))
            .with_tags(&["winter"])
            .with_nature(TcmNature::Cold);

        let outcome = scorer.rank(&[cooling, warming], 10, None);
        assert_eq!(outcome.items[0].content_id, "warm");
        assert!((outcome.items[0].score - 0.6).abs() < 1e-9);
        assert!((outcome.items[1].score - 0.4).abs() < 1e-9);
        assert_eq!(outcome.algorithm(), Algorithm::Hybrid);
    }

    #[test]
    fn test_seasonal_boost_multiplies() {
        let interests = interests(&[("tea", 0.5)]);
        let promotions = vec![SeasonalPromotion::builder("Spring", date(3, 1), date(5, 31))
            .global_boost_factor(1.3)
            .boosted_tag("spring")
            .build()
            .unwrap()];
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &promotions, &weights);

        let content = Content::new("c1", "Spring tea", ContentType::Recipe, date(1, 1))
            .with_tags(&["spring", "tea"]);
        let scored = scorer.score(&content);

        assert!((scored.score - 0.65).abs() < 1e-9);
        assert!(scored.signals.seasonal && scored.signals.interest);
    }

    #[test]
    fn test_boost_on_unmatched_item_is_not_a_seasonal_signal() {
        let interests = interests(&[("ginseng", 0.632)]);
        let promotions = vec![SeasonalPromotion::builder("Spring", date(3, 1), date(5, 31))
            .global_boost_factor(1.3)
            .boosted_tag("spring")
            .build()
            .unwrap()];
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &promotions, &weights);

        let candidates = vec![
            Content::new("g", "Ginseng", ContentType::Herb, date(1, 1)).with_tags(&["ginseng"]),
            Content::new("s", "Spring tea", ContentType::Recipe, date(1, 1))
                .with_tags(&["spring"]),
        ];
        let outcome = scorer.rank(&candidates, 10, None);

        let spring = outcome.items.iter().find(|i| i.content_id == "s").unwrap();
        assert_eq!(spring.score, 0.0);
        assert!(!spring.signals.seasonal);
        assert!(spring.reason.is_none());
        assert_eq!(outcome.algorithm(), Algorithm::InterestBased);
    }

    #[test]
    fn test_cold_start_uses_constant_base() {
        let interests = HashMap::new();
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);

        let content = Content::new("c1", "Anything", ContentType::Video, date(1, 1));
        let scored = scorer.score(&content);
        assert_eq!(scored.score, COLD_START_AFFINITY);
        assert!(!scored.signals.any());
        assert!(scored.reason.is_none());
    }

    #[test]
    fn test_goal_match_adds_bonus() {
        let interests = HashMap::new();
        let mut profile = UserProfile::new("u1");
        profile.goals = vec!["Sleep".to_string()];
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, Some(&profile), &[], &weights);

        let content = Content::new("c1", "Sleep routine", ContentType::Exercise, date(1, 1))
            .with_tags(&["sleep"]);
        let scored = scorer.score(&content);
        assert!((scored.score - 0.2).abs() < 1e-9);
        assert_eq!(scored.reason.as_deref(), Some("Supports your sleep goal"));
    }

    #[test]
    fn test_ties_break_by_recency_then_id() {
        let interests = HashMap::new();
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);

        let candidates = vec![
            Content::new("b", "B", ContentType::Article, date(1, 1)),
            Content::new("a", "A", ContentType::Article, date(1, 1)),
            Content::new("c", "C", ContentType::Article, date(2, 1)),
        ];
        let outcome = scorer.rank(&candidates, 10, None);
        let ids: Vec<&str> = outcome.items.iter().map(|i| i.content_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_limit_and_empty_input() {
        let interests = HashMap::new();
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);

        let outcome = scorer.rank(&[], 10, None);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.total, 0);

        let candidates: Vec<Content> = (0..5)
            .map(|i| Content::new(format!("c{i}"), "x", ContentType::Herb, date(1, 1)))
            .collect();
        assert_eq!(scorer.rank(&candidates, 3, None).items.len(), 3);
    }

    #[test]
    fn test_expired_deadline_returns_partial_outcome() {
        let interests = HashMap::new();
        let weights = ScoringWeights::default();
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);

        let candidates = vec![Content::new("c1", "x", ContentType::Herb, date(1, 1))];
        let outcome = scorer.rank(&candidates, 10, Some(Instant::now()));
        assert!(outcome.deadline_exceeded);
        assert_eq!(outcome.scored, 0);
        assert_eq!(outcome.total, 1);

        let far = Instant::now() + std::time::Duration::from_secs(60);
        let outcome = scorer.rank(&candidates, 10, Some(far));
        assert!(!outcome.deadline_exceeded);
        assert_eq!(outcome.scored, 1);
    }

    #[test]
    fn test_weights_from_variant_parameters() {
        let params = serde_json::json!({
            "interest_weight": 2.0,
            "tag_boosts": { "Tea": 1.5 },
            "content_type_boosts": { "recipe": 2.0 },
            "unrelated": true
        });
        let weights = ScoringWeights::from_parameters(&params);
        assert_eq!(weights.interest_weight, 2.0);
        assert_eq!(weights.profile_weight, 1.0);
        assert_eq!(weights.tag_boosts.get("tea"), Some(&1.5));

        let interests = interests(&[("tea", 0.5)]);
        let scorer = CandidateScorer::new("u1", &interests, None, &[], &weights);
        let content = Content::new("c1", "Tea", ContentType::Recipe, date(1, 1))
            .with_tags(&["tea"]);
        assert!((scorer.score(&content).score - 3.0).abs() < 1e-9);

        let malformed = serde_json::json!({ "interest_weight": "heavy" });
        assert_eq!(
            ScoringWeights::from_parameters(&malformed),
            ScoringWeights::default()
        );
        assert_eq!(
            ScoringWeights::from_parameters(&serde_json::Value::Null),
            ScoringWeights::default()
        );
    }

    #[test]
    fn test_popular_fallback_ordering() {
        let base = date(1, 1);
        let candidates = vec![
            Content::new("quiet", "q", ContentType::Article, base).with_popularity(10),
            Content::new("hit-old", "h", ContentType::Article, base).with_popularity(100),
            Content::new("hit-new", "h", ContentType::Article, base + Duration::days(1))
                .with_popularity(100),
        ];
        let items = popular_fallback(&candidates, 2);
        let ids: Vec<&str> = items.iter().map(|i| i.content_id.as_str()).collect();
        assert_eq!(ids, vec!["hit-new", "hit-old"]);
        assert_eq!(items[0].score, 1.0);
    }
}
