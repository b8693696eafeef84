use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentAngle, Event, Platform};

/// A fully resolved model request for one (event, platform, angle).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub event_id: String,
    pub platform: Platform,
    pub angle: ContentAngle,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Model output split into on-asset text and post caption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub visual_text: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { visual_text: String, caption: String },
    Failed { reason: String },
}

/// Event metrics carried alongside a result for exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetrics {
    pub rank: u32,
    pub international_pct: f64,
    pub career_multiple: f64,
    pub genre_rank: Option<u32>,
    pub performance_category: String,
    pub genre_percentile: Option<String>,
}

impl EventMetrics {
    pub fn from_event(event: &Event) -> Self {
        Self {
            rank: event.rank,
            international_pct: event.international_pct,
            career_multiple: event.career_multiple(),
            genre_rank: event.genre_rank(),
            performance_category: event.performance_category().to_string(),
            genre_percentile: event
                .genre_context
                .as_ref()
                .and_then(|g| g.genre_percentile_bucket.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub event_id: String,
    pub artist_name: String,
    pub event_name: String,
    pub venue_location: String,
    pub genre: String,
    pub platform: Platform,
    pub angle: ContentAngle,
    pub priority: u8,
    pub data_quality_score: f64,
    pub metrics: EventMetrics,
    pub outcome: GenerationOutcome,
    pub generated_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn new(
        event: &Event,
        platform: Platform,
        angle: ContentAngle,
        priority: u8,
        outcome: GenerationOutcome,
    ) -> Self {
        Self {
            event_id: event.event_id.clone(),
            artist_name: event.display_artist().to_string(),
            event_name: event.event_name.clone(),
            venue_location: event.location(),
            genre: event.genre.clone(),
            platform,
            angle,
            priority,
            data_quality_score: event.completeness.score,
            metrics: EventMetrics::from_event(event),
            outcome,
            generated_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, GenerationOutcome::Generated { .. })
    }

    /// `(visual_text, caption)` for successful results.
    pub fn post(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            GenerationOutcome::Generated {
                visual_text,
                caption,
            } => Some((visual_text, caption)),
            GenerationOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            GenerationOutcome::Failed { reason } => Some(reason),
            GenerationOutcome::Generated { .. } => None,
        }
    }

    /// Stable identifier used by schedules and webhook exports.
    pub fn content_id(&self) -> String {
        format!("{}_{}_{}", self.event_id, self.angle, self.platform)
    }
}

impl From<GeneratedPost> for GenerationOutcome {
    fn from(post: GeneratedPost) -> Self {
        GenerationOutcome::Generated {
            visual_text: post.visual_text,
            caption: post.caption,
        }
    }
}
