//! Sequential batch generation over (event, platform) pairs.
//!
//! One result per pair, in selection-major, platform-minor order. A failed
//! pair is recorded and the batch moves on; the client's own retries are the
//! only retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::time::Instant;
use uuid::Uuid;

use crate::angles::{content_priority, primary_angle};
use crate::config::GenerationConfig;
use crate::generation::{ContentBackend, GenerationError};
use crate::models::{
    ContentAngle, Event, GeneratedPost, GenerationOutcome, GenerationResult, Platform,
};
use crate::prompt::PromptBuilder;

/// (event id, platform, angle, template fingerprint)
type ResultKey = (String, Platform, ContentAngle, u64);

/// An event picked for generation, optionally pinned to one angle.
#[derive(Debug, Clone)]
pub struct EventSelection {
    pub event: Event,
    pub angle: Option<ContentAngle>,
}

impl EventSelection {
    pub fn with_angle(event: Event, angle: ContentAngle) -> Self {
        Self {
            event,
            angle: Some(angle),
        }
    }

    pub fn resolved_angle(&self) -> ContentAngle {
        self.angle.unwrap_or_else(|| primary_angle(&self.event))
    }
}

impl From<Event> for EventSelection {
    fn from(event: Event) -> Self {
        Self { event, angle: None }
    }
}

/// One (event, platform) slot of a report to rerun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerateTarget {
    pub event_id: String,
    pub platform: Platform,
    /// Rewrite from this angle instead of the slot's current one.
    #[serde(default)]
    pub angle: Option<ContentAngle>,
}

impl RegenerateTarget {
    pub fn new(event_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            event_id: event_id.into(),
            platform,
            angle: None,
        }
    }

    pub fn with_angle(mut self, angle: ContentAngle) -> Self {
        self.angle = Some(angle);
        self
    }

    fn matches(&self, result: &GenerationResult) -> bool {
        self.event_id == result.event_id && self.platform == result.platform
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Pause between consecutive API calls.
    pub rate_limit_delay: Duration,
    /// Reuse successful posts for this long; `None` disables the cache.
    pub result_cache_ttl: Option<Duration>,
}

impl PipelineOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
            result_cache_ttl: (config.result_cache_ttl_seconds > 0)
                .then(|| Duration::from_secs(config.result_cache_ttl_seconds)),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

/// Outcome of one `run`, mutated in place by `regenerate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub results: Vec<GenerationResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// Successes served from the result cache.
    pub cached: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn recount(&mut self) {
        self.succeeded = self.results.iter().filter(|r| r.is_success()).count();
        self.failed = self.results.len() - self.succeeded;
    }

    pub fn successes(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn angle_counts(&self) -> BTreeMap<ContentAngle, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.angle).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Default)]
struct RunCounters {
    api_calls: usize,
    cache_hits: usize,
}

pub struct BatchPipeline {
    backend: Arc<dyn ContentBackend>,
    options: PipelineOptions,
    result_cache: Option<Cache<ResultKey, GeneratedPost>>,
}

impl BatchPipeline {
    pub fn new(backend: Arc<dyn ContentBackend>, options: PipelineOptions) -> Self {
        let result_cache = options
            .result_cache_ttl
            .map(|ttl| Cache::builder().time_to_live(ttl).build());

        Self {
            backend,
            options,
            result_cache,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub async fn check_backend(&self) -> Result<(), GenerationError> {
        self.backend.check().await
    }

    pub async fn clear_result_cache(&self) {
        if let Some(cache) = &self.result_cache {
            let dropped = cache.entry_count();
            cache.invalidate_all();
            cache.run_pending_tasks().await;
            tracing::info!(dropped, "Cleared result cache");
        }
    }

    pub async fn run(
        &self,
        selections: &[EventSelection],
        platforms: &[Platform],
        prompts: &PromptBuilder,
    ) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            run_id = %run_id,
            events = selections.len(),
            platforms = platforms.len(),
            backend = self.backend.name(),
            "Starting generation batch"
        );

        let mut counters = RunCounters::default();
        let mut results = Vec::with_capacity(selections.len() * platforms.len());

        for selection in selections {
            let angle = selection.resolved_angle();
            for &platform in platforms {
                let result = self
                    .generate_pair(&selection.event, platform, angle, prompts, true, &mut counters)
                    .await;
                results.push(result);
            }
        }

        let mut report = BatchReport {
            run_id,
            results,
            succeeded: 0,
            failed: 0,
            cached: counters.cache_hits,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        report.recount();

        tracing::info!(
            run_id = %run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            cached = report.cached,
            api_calls = counters.api_calls,
            elapsed_ms = report.elapsed_ms,
            "Generation batch complete"
        );

        report
    }

    /// Rerun pairs and replace their results in place.
    ///
    /// With no targets every failed pair is rerun and successes are kept.
    /// Named targets are rerun whatever their outcome, from the target's
    /// angle when it has one, and always reach the backend. Returns how
    /// many pairs were rerun.
    pub async fn regenerate(
        &self,
        report: &mut BatchReport,
        targets: &[RegenerateTarget],
        events: &[Event],
        prompts: &PromptBuilder,
    ) -> usize {
        let start = Instant::now();
        let mut counters = RunCounters::default();
        let mut rerun = 0;

        for slot in report.results.iter_mut() {
            let (angle, use_cache) = if targets.is_empty() {
                if slot.is_success() {
                    continue;
                }
                (slot.angle, true)
            } else {
                match targets.iter().find(|t| t.matches(slot)) {
                    Some(target) => (target.angle.unwrap_or(slot.angle), false),
                    None => continue,
                }
            };

            let Some(event) = events.iter().find(|e| e.event_id == slot.event_id) else {
                tracing::warn!(event_id = %slot.event_id, "Event no longer loaded, cannot regenerate");
                continue;
            };

            *slot = self
                .generate_pair(event, slot.platform, angle, prompts, use_cache, &mut counters)
                .await;
            rerun += 1;
        }

        report.recount();
        report.cached += counters.cache_hits;
        report.finished_at = Utc::now();
        report.elapsed_ms += start.elapsed().as_millis() as u64;

        tracing::info!(
            run_id = %report.run_id,
            rerun,
            succeeded = report.succeeded,
            failed = report.failed,
            "Regenerated content"
        );

        rerun
    }

    async fn generate_pair(
        &self,
        event: &Event,
        platform: Platform,
        angle: ContentAngle,
        prompts: &PromptBuilder,
        use_cache: bool,
        counters: &mut RunCounters,
    ) -> GenerationResult {
        let priority = content_priority(event, angle);
        let finish = |outcome| GenerationResult::new(event, platform, angle, priority, outcome);

        let request = match prompts.build(event, platform, angle) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "Prompt could not be built");
                return finish(GenerationOutcome::Failed {
                    reason: format!("Prompt error: {}", e),
                });
            }
        };

        let key: ResultKey = (
            event.event_id.clone(),
            platform,
            angle,
            prompts.fingerprint(angle),
        );

        if let Some(cache) = self.result_cache.as_ref().filter(|_| use_cache) {
            if let Some(post) = cache.get(&key).await {
                counters.cache_hits += 1;
                tracing::debug!(event_id = %event.event_id, %platform, %angle, "Reusing cached post");
                return finish(post.into());
            }
        }

        if counters.api_calls > 0 && !self.options.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.options.rate_limit_delay).await;
        }
        counters.api_calls += 1;

        match self.backend.generate(&request).await {
            Ok(post) => {
                tracing::info!(
                    event_id = %event.event_id,
                    artist = event.display_artist(),
                    %platform,
                    %angle,
                    "Generated post"
                );
                if let Some(cache) = &self.result_cache {
                    cache.insert(key, post.clone()).await;
                }
                finish(post.into())
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    %platform,
                    %angle,
                    error = %e,
                    "Generation failed, continuing batch"
                );
                finish(GenerationOutcome::Failed {
                    reason: e.user_message(),
                })
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
