//! Recommendation event log
//!
//! Every served recommendation is appended to an event log used to evaluate
//! experiments. Logging is fire-and-forget: [`RecommendationLogger::log`]
//! hands the event to a bounded channel drained by a background writer, and
//! any failure along the way is reported through `tracing` only.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PersonalizationError, Result};
use crate::types::{Algorithm, RecommendationContext};

pub const DEFAULT_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub processing_time_ms: u64,
    pub candidate_count: usize,
    pub returned_count: usize,
}

/// One served recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub id: Uuid,
    pub user_id: String,
    /// In ranking order
    pub content_ids: Vec<String>,
    pub algorithm: Algorithm,
    pub ab_test_id: Option<String>,
    pub ab_test_variant: Option<String>,
    pub context: Option<RecommendationContext>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub request_parameters: serde_json::Value,
    pub response_metrics: ResponseMetrics,
}

impl RecommendationEvent {
    pub fn new(
        user_id: impl Into<String>,
        content_ids: Vec<String>,
        algorithm: Algorithm,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let returned_count = content_ids.len();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content_ids,
            algorithm,
            ab_test_id: None,
            ab_test_variant: None,
            context: None,
            timestamp,
            request_parameters: serde_json::Value::Null,
            response_metrics: ResponseMetrics {
                returned_count,
                ..ResponseMetrics::default()
            },
        }
    }

    pub fn with_ab_test(mut self, ab_test_id: impl Into<String>, variant: impl Into<String>) -> Self {
        self.ab_test_id = Some(ab_test_id.into());
        self.ab_test_variant = Some(variant.into());
        self
    }

    pub fn with_context(mut self, context: Option<RecommendationContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_request_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.request_parameters = parameters;
        self
    }

    pub fn with_metrics(mut self, processing_time_ms: u64, candidate_count: usize) -> Self {
        self.response_metrics.processing_time_ms = processing_time_ms;
        self.response_metrics.candidate_count = candidate_count;
        self
    }
}

#[async_trait]
pub trait RecommendationLogStore: Send + Sync {
    async fn append(&self, event: RecommendationEvent) -> Result<()>;
    /// Events for `user_id` at or after `since`, oldest first
    async fn events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecommendationEvent>>;
    async fn events_for_ab_test(&self, ab_test_id: &str) -> Result<Vec<RecommendationEvent>>;
    /// Remove events strictly older than `cutoff`; returns how many were removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[derive(Default)]
pub struct InMemoryLogStore {
    events: RwLock<Vec<RecommendationEvent>>,
    failing: AtomicBool,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Make subsequent appends fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecommendationLogStore for InMemoryLogStore {
    async fn append(&self, event: RecommendationEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersonalizationError::Storage(
                "recommendation log unavailable".to_string(),
            ));
        }
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecommendationEvent>> {
        let mut events: Vec<RecommendationEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == user_id && e.timestamp >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn events_for_ab_test(&self, ab_test_id: &str) -> Result<Vec<RecommendationEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.ab_test_id.as_deref() == Some(ab_test_id))
            .cloned()
            .collect())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok(before - events.len())
    }
}

enum LogMessage {
    Event(Box<RecommendationEvent>),
    Flush(oneshot::Sender<()>),
}

/// Non-blocking writer in front of a [`RecommendationLogStore`].
///
/// Must be created inside a Tokio runtime. The background writer stops when
/// the logger is dropped.
pub struct RecommendationLogger {
    sender: mpsc::Sender<LogMessage>,
    closed: AtomicBool,
}

impl RecommendationLogger {
    pub fn new(store: Arc<dyn RecommendationLogStore>, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        tokio::spawn(Self::run_writer(store, receiver));

        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }

    async fn run_writer(
        store: Arc<dyn RecommendationLogStore>,
        mut receiver: mpsc::Receiver<LogMessage>,
    ) {
        while let Some(message) = receiver.recv().await {
            match message {
                LogMessage::Event(event) => {
                    let event_id = event.id;
                    let user_id = event.user_id.clone();
                    if let Err(e) = store.append(*event).await {
                        error!(
                            event_id = %event_id,
                            user_id = %user_id,
                            error = %e,
                            "Failed to persist recommendation event"
                        );
                    }
                }
                LogMessage::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Recommendation log writer stopped");
    }

    /// Queue `event` for persistence without waiting. Never fails; a full or
    /// closed queue drops the event with a warning.
    pub fn log(&self, event: RecommendationEvent) {
        if self.closed.load(Ordering::SeqCst) {
            warn!(event_id = %event.id, "Recommendation logger is shut down, dropping event");
            return;
        }

        let event_id = event.id;
        match self.sender.try_send(LogMessage::Event(Box::new(event))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event_id = %event_id, "Recommendation log queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    event_id = %event_id,
                    error = %PersonalizationError::LogChannelClosed,
                    "Dropping recommendation event"
                );
            }
        }
    }

    /// Wait until every event queued before this call has been written
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(LogMessage::Flush(done)).await.is_err() {
            warn!("Recommendation log writer is gone, nothing to flush");
            return;
        }
        let _ = wait.await;
    }

    /// Drain the queue and refuse further events
    pub async fn shutdown(&self) {
        self.flush().await;
        self.closed.store(true, Ordering::SeqCst);
        info!("Recommendation logger shut down");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmStats {
    pub algorithm: Algorithm,
    pub count: usize,
    pub total_recommendations: usize,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStats {
    pub variant: String,
    pub count: usize,
    pub distinct_users: usize,
    pub total_recommendations: usize,
    pub avg_processing_time_ms: f64,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    total_recommendations: usize,
    total_processing_ms: u64,
}

impl Accumulator {
    fn add(&mut self, event: &RecommendationEvent) {
        self.count += 1;
        self.total_recommendations += event.content_ids.len();
        self.total_processing_ms += event.response_metrics.processing_time_ms;
    }

    fn avg_processing_time_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_processing_ms as f64 / self.count as f64
        }
    }
}

/// Aggregations over the recommendation log
pub struct LogAnalytics {
    store: Arc<dyn RecommendationLogStore>,
    retention_days: u32,
}

impl LogAnalytics {
    pub fn new(store: Arc<dyn RecommendationLogStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Per-algorithm stats for one user over the last `days` days, most used
    /// algorithm first
    pub async fn user_stats(
        &self,
        user_id: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlgorithmStats>> {
        let since = now - Duration::days(i64::from(days));
        let events = self.store.events_for_user(user_id, since).await?;

        let mut by_algorithm: HashMap<Algorithm, Accumulator> = HashMap::new();
        for event in &events {
            by_algorithm.entry(event.algorithm).or_default().add(event);
        }

        let mut stats: Vec<AlgorithmStats> = by_algorithm
            .into_iter()
            .map(|(algorithm, acc)| AlgorithmStats {
                algorithm,
                count: acc.count,
                total_recommendations: acc.total_recommendations,
                avg_processing_time_ms: acc.avg_processing_time_ms(),
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then(a.algorithm.cmp(&b.algorithm)));

        Ok(stats)
    }

    /// Per-variant stats for one experiment, ordered by variant name
    pub async fn ab_test_stats(&self, ab_test_id: &str) -> Result<Vec<VariantStats>> {
        let events = self.store.events_for_ab_test(ab_test_id).await?;

        let mut by_variant: BTreeMap<String, (Accumulator, HashSet<String>)> = BTreeMap::new();
        for event in &events {
            let Some(variant) = event.ab_test_variant.as_ref() else {
                continue;
            };
            let (acc, users) = by_variant.entry(variant.clone()).or_default();
            acc.add(event);
            users.insert(event.user_id.clone());
        }

        Ok(by_variant
            .into_iter()
            .map(|(variant, (acc, users))| VariantStats {
                variant,
                count: acc.count,
                distinct_users: users.len(),
                total_recommendations: acc.total_recommendations,
                avg_processing_time_ms: acc.avg_processing_time_ms(),
            })
            .collect())
    }

    /// Delete events older than the retention window
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let purged = self.store.purge_before(cutoff).await?;
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "Purged expired recommendation events");
        }
        Ok(purged)
    }
}
