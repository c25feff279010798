//! User interest scores with saturation and time decay
//!
//! One [`InterestScore`] exists per (user, tag). Each interaction bumps the
//! count and recomputes the score on a saturating curve
//! (`1 - e^(-0.1 * count)`); explicitly selected interests get a flat boost.
//! Decay is computed on read against a caller-supplied reference time and
//! never written back implicitly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::repository::InterestStore;

/// Growth rate of the saturating score curve
pub const SATURATION_RATE: f64 = 0.1;
/// Flat boost for interests the user selected explicitly
pub const EXPLICIT_BOOST: f64 = 0.3;
pub const DEFAULT_SCORE: f64 = 0.5;
pub const DEFAULT_DECAY_RATE: f64 = 0.05;
pub const EXPLICIT_FLOOR: f64 = 0.3;
pub const IMPLICIT_FLOOR: f64 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Normalize a tag for storage and matching: trimmed and lowercased
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Affinity of one user for one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestScore {
    pub user_id: String,
    pub tag: String,
    pub interaction_count: u32,
    pub explicitly_selected: bool,
    pub score: f64,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub decay_rate: f64,
}

impl InterestScore {
    /// A record that has not seen any interaction yet
    pub fn new(user_id: impl Into<String>, tag: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tag: normalize_tag(tag),
            interaction_count: 0,
            explicitly_selected: false,
            score: DEFAULT_SCORE,
            first_interaction: now,
            last_interaction: now,
            decay_rate: DEFAULT_DECAY_RATE,
        }
    }

    /// Recompute `score` from the interaction count. A count of zero leaves
    /// the score untouched.
    pub fn recompute_score(&mut self) {
        if self.interaction_count > 0 {
            self.score = saturating_score(self.interaction_count, self.explicitly_selected);
        }
    }

    /// Days elapsed between the last interaction and `reference_time`
    pub fn days_since_last_interaction(&self, reference_time: DateTime<Utc>) -> f64 {
        let elapsed = reference_time - self.last_interaction;
        elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
    }

    /// Score decayed to `reference_time`, see [`apply_time_decay`]
    pub fn decayed_score(&self, reference_time: DateTime<Utc>) -> f64 {
        apply_time_decay(self, reference_time)
    }
}

/// `min(1, 1 - e^(-0.1 * count))`, plus the explicit boost, clamped to [0, 1]
pub fn saturating_score(interaction_count: u32, explicit: bool) -> f64 {
    let base = (1.0 - (-SATURATION_RATE * interaction_count as f64).exp()).min(1.0);
    let boosted = if explicit { base + EXPLICIT_BOOST } else { base };
    boosted.clamp(0.0, 1.0)
}

/// Apply one interaction to an existing record, or create the record.
///
/// `explicit` is sticky: once set it is never cleared by later implicit
/// interactions.
pub fn record_interaction(
    existing: Option<InterestScore>,
    user_id: &str,
    tag: &str,
    explicit: bool,
    now: DateTime<Utc>,
) -> InterestScore {
    let mut record = match existing {
        Some(mut record) => {
            record.interaction_count = record.interaction_count.saturating_add(1);
            record.last_interaction = now;
            record
        }
        None => {
            let mut record = InterestScore::new(user_id, tag, now);
            record.interaction_count = 1;
            record
        }
    };

    if explicit {
        record.explicitly_selected = true;
    }

    record.recompute_score();
    record
}

/// Score of `record` decayed to `reference_time`.
///
/// Within the first day the stored score is returned unchanged. Afterwards
/// the score is multiplied by `e^(-decay_rate * days / 30)` and raised to the
/// floor (0.3 explicit, 0.1 implicit).
pub fn apply_time_decay(record: &InterestScore, reference_time: DateTime<Utc>) -> f64 {
    let days = record.days_since_last_interaction(reference_time);
    if days < 1.0 {
        return record.score;
    }

    let time_decay_factor = (-record.decay_rate * days / 30.0).exp();
    let decayed = record.score * time_decay_factor;

    let floor = if record.explicitly_selected {
        EXPLICIT_FLOOR
    } else {
        IMPLICIT_FLOOR
    };

    decayed.max(floor)
}

/// Serializes interest updates per (user, tag).
///
/// The update is a read-modify-write against the store; concurrent events
/// for the same key queue on a per-key mutex so no increment is lost.
pub struct InterestTracker {
    store: Arc<dyn InterestStore>,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl InterestTracker {
    pub fn new(store: Arc<dyn InterestStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn InterestStore> {
        &self.store
    }

    /// Record one interaction touching `tags`. Duplicate and blank tags are
    /// ignored. Returns the updated records.
    #[instrument(skip(self, tags), fields(user_id = %user_id, tag_count = tags.len()))]
    pub async fn record(
        &self,
        user_id: &str,
        tags: &[String],
        explicit: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<InterestScore>> {
        let mut normalized: Vec<String> = tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();

        let mut updated = Vec::with_capacity(normalized.len());
        for tag in normalized {
            updated.push(self.record_one(user_id, &tag, explicit, now).await?);
        }

        Ok(updated)
    }

    async fn record_one(
        &self,
        user_id: &str,
        tag: &str,
        explicit: bool,
        now: DateTime<Utc>,
    ) -> Result<InterestScore> {
        let key = (user_id.to_string(), tag.to_string());
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let updated = self.update(user_id, tag, explicit, now).await;

        // Drop the entry once no other task is queued on it; the map and
        // this task hold the only two references in that case.
        self.locks
            .remove_if(&key, |_, held| Arc::strong_count(held) == 2);
        drop(guard);

        let record = updated?;
        debug!(
            user_id = %user_id,
            tag = %tag,
            interaction_count = record.interaction_count,
            score = record.score,
            "Updated interest score"
        );

        Ok(record)
    }

    async fn update(
        &self,
        user_id: &str,
        tag: &str,
        explicit: bool,
        now: DateTime<Utc>,
    ) -> Result<InterestScore> {
        let existing = self.store.get_interest(user_id, tag).await?;
        let record = record_interaction(existing, user_id, tag, explicit, now);
        self.store.save_interest(record.clone()).await?;
        Ok(record)
    }
}
