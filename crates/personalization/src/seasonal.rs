//! Seasonal promotions and the boost they apply to candidate content
//!
//! A promotion is a time-bounded rule that multiplies the ranking score of
//! matching content. When several promotions match the same item their
//! factors compound, applied in priority order.
//!
//! Recurring promotions are not materialized. A promotion with a recurrence
//! rule is treated as the base window shifted by a whole number of periods,
//! and is active whenever `now` falls inside one of those shifted windows.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::error::{PersonalizationError, Result};
use crate::interest::normalize_tag;
use crate::types::{Content, ContentType, UserProfile};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const MIN_GLOBAL_BOOST: f64 = 1.0;
pub const MAX_GLOBAL_BOOST: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Yearly,
    Monthly,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub pattern: RecurrencePattern,
    /// No occurrence starts after this instant
    pub until: Option<DateTime<Utc>>,
}

impl Recurrence {
    pub fn new(pattern: RecurrencePattern) -> Self {
        Self {
            pattern,
            until: None,
        }
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Shortest length of one period; an occurrence window must be shorter
    fn min_period(&self) -> Duration {
        match self.pattern {
            RecurrencePattern::Yearly => Duration::days(365),
            RecurrencePattern::Monthly => Duration::days(28),
            RecurrencePattern::Weekly => Duration::weeks(1),
        }
    }

    /// Whole periods from `start` to `now`, rounded down by calendar fields
    fn periods_between(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        match self.pattern {
            RecurrencePattern::Yearly => i64::from(now.year() - start.year()),
            RecurrencePattern::Monthly => {
                i64::from(now.year() - start.year()) * 12 + i64::from(now.month())
                    - i64::from(start.month())
            }
            RecurrencePattern::Weekly => (now - start).num_weeks(),
        }
    }

    fn shift(&self, instant: DateTime<Utc>, periods: u32) -> Option<DateTime<Utc>> {
        match self.pattern {
            RecurrencePattern::Yearly => {
                instant.checked_add_months(Months::new(periods.checked_mul(12)?))
            }
            RecurrencePattern::Monthly => instant.checked_add_months(Months::new(periods)),
            RecurrencePattern::Weekly => {
                instant.checked_add_signed(Duration::weeks(i64::from(periods)))
            }
        }
    }
}

/// Content explicitly promoted with its own boost factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotedContent {
    pub content_id: String,
    pub boost_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPromotion {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    /// 1-10, higher wins
    pub priority: u8,
    #[serde(default)]
    pub boosted_tags: Vec<String>,
    #[serde(default)]
    pub boosted_content_types: Vec<ContentType>,
    #[serde(default)]
    pub promoted_content: Vec<PromotedContent>,
    /// Empty means every segment
    #[serde(default)]
    pub target_user_segments: Vec<String>,
    /// Empty means every region
    #[serde(default)]
    pub regions: Vec<String>,
    pub global_boost_factor: f64,
    pub recurrence: Option<Recurrence>,
}

impl SeasonalPromotion {
    pub fn builder(
        name: impl Into<String>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> PromotionBuilder {
        PromotionBuilder {
            promotion: SeasonalPromotion {
                id: Uuid::new_v4(),
                name: name.into(),
                description: None,
                start_date,
                end_date,
                is_active: true,
                priority: 5,
                boosted_tags: Vec::new(),
                boosted_content_types: Vec::new(),
                promoted_content: Vec::new(),
                target_user_segments: Vec::new(),
                regions: Vec::new(),
                global_boost_factor: 1.2,
                recurrence: None,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PersonalizationError::InvalidPromotion(
                "name must not be empty".to_string(),
            ));
        }

        if self.end_date <= self.start_date {
            return Err(PersonalizationError::InvalidPromotion(format!(
                "promotion '{}' ends before it starts",
                self.name
            )));
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(PersonalizationError::InvalidPromotion(format!(
                "priority must be within {}-{}, got {}",
                MIN_PRIORITY, MAX_PRIORITY, self.priority
            )));
        }

        if !(MIN_GLOBAL_BOOST..=MAX_GLOBAL_BOOST).contains(&self.global_boost_factor) {
            return Err(PersonalizationError::InvalidPromotion(format!(
                "global_boost_factor must be within {:.1}-{:.1}, got {}",
                MIN_GLOBAL_BOOST, MAX_GLOBAL_BOOST, self.global_boost_factor
            )));
        }

        if let Some(bad) = self
            .promoted_content
            .iter()
            .find(|p| !p.boost_factor.is_finite() || p.boost_factor <= 0.0)
        {
            return Err(PersonalizationError::InvalidPromotion(format!(
                "promoted content '{}' has invalid boost factor {}",
                bad.content_id, bad.boost_factor
            )));
        }

        if let Some(recurrence) = &self.recurrence {
            if self.end_date - self.start_date >= recurrence.min_period() {
                return Err(PersonalizationError::InvalidPromotion(format!(
                    "promotion '{}' window is not shorter than its {:?} recurrence period",
                    self.name, recurrence.pattern
                )));
            }
        }

        if let Some(until) = self.recurrence.as_ref().and_then(|r| r.until) {
            if until < self.start_date {
                return Err(PersonalizationError::InvalidPromotion(format!(
                    "promotion '{}' recurs until before its first start",
                    self.name
                )));
            }
        }

        Ok(())
    }

    /// The occurrence window containing `now`, if any
    pub fn window_containing(
        &self,
        now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if now < self.start_date {
            return None;
        }

        let recurrence = match &self.recurrence {
            None => {
                return (now <= self.end_date).then_some((self.start_date, self.end_date));
            }
            Some(recurrence) => recurrence,
        };

        let periods = recurrence.periods_between(self.start_date, now);
        // The calendar count may overshoot by one when `now` precedes the
        // anniversary within its period, so also try the previous occurrence.
        for offset in [periods, periods - 1] {
            let Ok(offset) = u32::try_from(offset) else {
                continue;
            };
            let (Some(start), Some(end)) = (
                recurrence.shift(self.start_date, offset),
                recurrence.shift(self.end_date, offset),
            ) else {
                continue;
            };

            if recurrence.until.is_some_and(|until| start > until) {
                continue;
            }

            if start <= now && now <= end {
                return Some((start, end));
            }
        }

        None
    }

    /// `is_active` and `now` inside the (possibly recurring) window
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.window_containing(now).is_some()
    }

    pub fn explicit_boost_for(&self, content_id: &str) -> Option<f64> {
        self.promoted_content
            .iter()
            .find(|p| p.content_id == content_id)
            .map(|p| p.boost_factor)
    }

    /// Tag overlap, boosted content type, or explicit promotion
    pub fn matches_content(&self, content: &Content) -> bool {
        let tag_match = content.tags.iter().any(|tag| {
            let tag = normalize_tag(tag);
            self.boosted_tags
                .iter()
                .any(|boosted| normalize_tag(boosted) == tag)
        });

        tag_match
            || self.boosted_content_types.contains(&content.content_type)
            || self.explicit_boost_for(&content.id).is_some()
    }

    /// Segment and region targeting; empty lists target everyone
    pub fn matches_user(&self, user: &UserProfile) -> bool {
        let segment_match = self.target_user_segments.is_empty()
            || self
                .target_user_segments
                .iter()
                .any(|segment| user.segments.contains(segment));

        let region_match = self.regions.is_empty()
            || user.region.as_deref().is_some_and(|region| {
                self.regions
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(region.trim()))
            });

        segment_match && region_match
    }

    /// Factor this promotion contributes for `content`: the explicit
    /// promoted factor when present, else the global factor.
    pub fn factor_for(&self, content: &Content) -> f64 {
        self.explicit_boost_for(&content.id)
            .unwrap_or(self.global_boost_factor)
    }
}

pub struct PromotionBuilder {
    promotion: SeasonalPromotion,
}

impl PromotionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.promotion.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.promotion.priority = priority;
        self
    }

    pub fn global_boost_factor(mut self, factor: f64) -> Self {
        self.promotion.global_boost_factor = factor;
        self
    }

    pub fn boosted_tag(mut self, tag: &str) -> Self {
        self.promotion.boosted_tags.push(normalize_tag(tag));
        self
    }

    pub fn boosted_content_type(mut self, content_type: ContentType) -> Self {
        self.promotion.boosted_content_types.push(content_type);
        self
    }

    pub fn promote(mut self, content_id: impl Into<String>, boost_factor: f64) -> Self {
        self.promotion.promoted_content.push(PromotedContent {
            content_id: content_id.into(),
            boost_factor,
        });
        self
    }

    pub fn target_segment(mut self, segment: impl Into<String>) -> Self {
        self.promotion.target_user_segments.push(segment.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.promotion.regions.push(region.into());
        self
    }

    pub fn recurrence(mut self, recurrence: Recurrence) -> Self {
        self.promotion.recurrence = Some(recurrence);
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.promotion.is_active = is_active;
        self
    }

    pub fn build(self) -> Result<SeasonalPromotion> {
        self.promotion.validate()?;
        Ok(self.promotion)
    }
}

/// Priority descending; ties by name then id so the order is stable
fn by_priority(a: &&SeasonalPromotion, b: &&SeasonalPromotion) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Resolves which promotions apply to a query
pub struct SeasonalBooster<'a> {
    promotions: &'a [SeasonalPromotion],
}

impl<'a> SeasonalBooster<'a> {
    pub fn new(promotions: &'a [SeasonalPromotion]) -> Self {
        Self { promotions }
    }

    /// Active promotions at `now`, highest priority first
    pub fn find_active(&self, now: DateTime<Utc>) -> Vec<&'a SeasonalPromotion> {
        let mut active: Vec<&SeasonalPromotion> = self
            .promotions
            .iter()
            .filter(|p| p.is_active_at(now))
            .collect();
        active.sort_by(by_priority);
        active
    }

    pub fn find_for_content(
        &self,
        content: &Content,
        now: DateTime<Utc>,
    ) -> Vec<&'a SeasonalPromotion> {
        self.find_active(now)
            .into_iter()
            .filter(|p| p.matches_content(content))
            .collect()
    }

    pub fn find_for_user(
        &self,
        user: &UserProfile,
        now: DateTime<Utc>,
    ) -> Vec<&'a SeasonalPromotion> {
        self.find_active(now)
            .into_iter()
            .filter(|p| p.matches_user(user))
            .collect()
    }

    /// Combined multiplier for `content`: the product of the factors of every
    /// promotion in `promotions` that matches it, applied in priority order.
    /// 1.0 when none match.
    pub fn boost_factor_for<'p, I>(content: &Content, promotions: I) -> f64
    where
        I: IntoIterator<Item = &'p SeasonalPromotion>,
    {
        let mut matching: Vec<&SeasonalPromotion> = promotions
            .into_iter()
            .filter(|p| p.matches_content(content))
            .collect();
        matching.sort_by(by_priority);

        matching
            .iter()
            .fold(1.0, |factor, promotion| factor * promotion.factor_for(content))
    }
}
