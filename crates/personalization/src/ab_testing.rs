//! A/B testing for recommendation strategies
//!
//! Experiments are validated when they are defined and assigned statelessly:
//! a user's variant is a pure function of the user id and the experiment
//! definition, so no assignment table is needed and the same user lands in
//! the same arm on every device and session.

use chrono::{DateTime, Utc};
use herbwise_core::hash_string;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PersonalizationError, Result};

/// One treatment arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    /// Free-form parameters read by the scorer (weights, boosts)
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Variant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: empty_object(),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Experiment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub variants: Vec<Variant>,
    /// Share of users (1-100) enrolled in the experiment
    pub target_user_percentage: u8,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "empty_object")]
    pub segmentation_filters: serde_json::Value,
    /// Metric names the experiment is judged on
    #[serde(default)]
    pub goals: Vec<String>,
    pub is_active: bool,
}

impl Experiment {
    pub fn builder(
        name: impl Into<String>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> ExperimentBuilder {
        ExperimentBuilder {
            experiment: Experiment {
                id: Uuid::new_v4(),
                name: name.into(),
                description: None,
                variants: Vec::new(),
                target_user_percentage: 100,
                start_date,
                end_date,
                segmentation_filters: empty_object(),
                goals: Vec::new(),
                is_active: true,
            },
        }
    }

    /// Reject definitions that could not be bucketed consistently
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PersonalizationError::InvalidExperiment(
                "name must not be empty".to_string(),
            ));
        }

        if self.variants.len() < 2 {
            return Err(PersonalizationError::InvalidExperiment(format!(
                "experiment '{}' needs at least 2 variants, got {}",
                self.name,
                self.variants.len()
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(PersonalizationError::InvalidExperiment(format!(
                    "experiment '{}' has a variant without a name",
                    self.name
                )));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(PersonalizationError::InvalidExperiment(format!(
                    "experiment '{}' has duplicate variant '{}'",
                    self.name, variant.name
                )));
            }
        }

        if !(1..=100).contains(&self.target_user_percentage) {
            return Err(PersonalizationError::InvalidExperiment(format!(
                "target_user_percentage must be within 1-100, got {}",
                self.target_user_percentage
            )));
        }

        if self.end_date <= self.start_date {
            return Err(PersonalizationError::InvalidExperiment(format!(
                "experiment '{}' ends before it starts",
                self.name
            )));
        }

        Ok(())
    }

    /// Active and `now` within [start_date, end_date]
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now >= self.start_date && now <= self.end_date
    }

    /// Whether the user falls inside the targeted percentage of traffic
    pub fn is_in_test(&self, user_id: &str) -> bool {
        self.target_user_percentage >= 100
            || hash_string(user_id) % 100 < u32::from(self.target_user_percentage)
    }

    /// Deterministic variant for `user_id`, or `None` when the experiment is
    /// not running or the user is outside the targeted traffic.
    pub fn variant_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Option<&Variant> {
        if !self.is_running(now) || self.variants.is_empty() {
            return None;
        }

        let hash = hash_string(user_id);

        if self.target_user_percentage < 100
            && hash % 100 >= u32::from(self.target_user_percentage)
        {
            return None;
        }

        let index = (hash % self.variants.len() as u32) as usize;
        self.variants.get(index)
    }
}

pub struct ExperimentBuilder {
    experiment: Experiment,
}

impl ExperimentBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.experiment.description = Some(description.into());
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.experiment.variants.push(variant);
        self
    }

    pub fn target_user_percentage(mut self, percentage: u8) -> Self {
        self.experiment.target_user_percentage = percentage;
        self
    }

    pub fn segmentation_filters(mut self, filters: serde_json::Value) -> Self {
        self.experiment.segmentation_filters = filters;
        self
    }

    pub fn goal(mut self, metric: impl Into<String>) -> Self {
        self.experiment.goals.push(metric.into());
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.experiment.is_active = is_active;
        self
    }

    pub fn build(self) -> Result<Experiment> {
        self.experiment.validate()?;
        Ok(self.experiment)
    }
}

/// The variant a user received in a particular experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: Uuid,
    pub experiment_name: String,
    pub variant: Variant,
}

/// Pick the first running experiment (by start date, then name) that
/// enrolls `user_id`. A user takes part in at most one experiment per
/// recommendation so the logged variant is unambiguous.
pub fn select_assignment(
    experiments: &[Experiment],
    user_id: &str,
    now: DateTime<Utc>,
) -> Option<Assignment> {
    let mut running: Vec<&Experiment> = experiments.iter().filter(|e| e.is_running(now)).collect();
    running.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.name.cmp(&b.name))
    });

    running.into_iter().find_map(|experiment| {
        experiment.variant_for_user(user_id, now).map(|variant| {
            debug!(
                experiment = %experiment.name,
                variant = %variant.name,
                user_id = %user_id,
                "Assigned experiment variant"
            );
            Assignment {
                experiment_id: experiment.id,
                experiment_name: experiment.name.clone(),
                variant: variant.clone(),
            }
        })
    })
}
