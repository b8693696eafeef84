//! Exports for generated content: JSON, text and CSV files, priority filtering,
//! posting schedules and webhook payloads.
//!
//! Only successful results are exported. Ordering everywhere is priority
//! descending, ties kept in generation order.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ContentAngle, GenerationResult, Platform};
use crate::pipeline::BatchReport;

const HIGH_PRIORITY: u8 = 8;
const RECOMMENDED_ORDER_LEN: usize = 10;
const PREVIEW_CHARS: usize = 100;
const HOURS_BETWEEN_POSTS: i64 = 8;
const MAX_HASHTAGS: usize = 8;
const MAX_ARTIST_TAG_CHARS: usize = 20;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// JSON export
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub total_items: usize,
    pub failed_items: usize,
    pub unique_events: usize,
    pub unique_artists: usize,
    pub average_priority: f64,
    pub average_data_quality: f64,
    pub high_priority_items: usize,
    pub by_angle: BTreeMap<ContentAngle, usize>,
    pub by_priority: BTreeMap<u8, usize>,
    pub by_genre: BTreeMap<String, usize>,
    /// Content ids of the highest-priority items, best first.
    pub recommended_posting_order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentExport {
    pub metadata: ExportMetadata,
    pub content: Vec<GenerationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
    pub csv: PathBuf,
}

pub fn build_export(report: &BatchReport) -> ContentExport {
    let content = by_priority(report.successes());
    let total = content.len();

    let mut by_angle = BTreeMap::new();
    let mut by_priority_counts = BTreeMap::new();
    let mut by_genre = BTreeMap::new();
    for item in &content {
        *by_angle.entry(item.angle).or_insert(0) += 1;
        *by_priority_counts.entry(item.priority).or_insert(0) += 1;
        *by_genre.entry(item.genre.clone()).or_insert(0) += 1;
    }

    let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };

    let metadata = ExportMetadata {
        generated_at: Utc::now(),
        run_id: report.run_id,
        total_items: total,
        failed_items: report.failed,
        unique_events: content.iter().map(|c| &c.event_id).collect::<HashSet<_>>().len(),
        unique_artists: content.iter().map(|c| &c.artist_name).collect::<HashSet<_>>().len(),
        average_priority: round2(mean(content.iter().map(|c| f64::from(c.priority)).sum())),
        average_data_quality: round2(mean(content.iter().map(|c| c.data_quality_score).sum())),
        high_priority_items: content.iter().filter(|c| c.priority >= HIGH_PRIORITY).count(),
        by_angle,
        by_priority: by_priority_counts,
        by_genre,
        recommended_posting_order: content
            .iter()
            .take(RECOMMENDED_ORDER_LEN)
            .map(GenerationResult::content_id)
            .collect(),
    };

    ContentExport { metadata, content }
}

/// Human-readable report, grouped by artist in priority order.
pub fn render_text_report(export: &ContentExport) -> String {
    let mut out = String::new();
    // fmt::Write for String never fails
    write_report(&mut out, export).map(|_| out).unwrap_or_default()
}

fn write_report(out: &mut String, export: &ContentExport) -> fmt::Result {
    let meta = &export.metadata;

    writeln!(out, "SOCIAL MEDIA CONTENT REPORT")?;
    writeln!(out, "{}\n", "=".repeat(60))?;
    writeln!(out, "SUMMARY")?;
    writeln!(out, "{}", "-".repeat(30))?;
    writeln!(out, "Generated: {}", meta.generated_at.to_rfc3339())?;
    writeln!(out, "Run: {}", meta.run_id)?;
    writeln!(out, "Total Content Pieces: {}", meta.total_items)?;
    writeln!(out, "Failed Pairs: {}", meta.failed_items)?;
    writeln!(out, "Unique Events: {}", meta.unique_events)?;
    let angles: Vec<&str> = meta.by_angle.keys().map(ContentAngle::as_str).collect();
    writeln!(out, "Content Angles: {}", angles.join(", "))?;
    writeln!(out, "Average Priority: {:.2}", meta.average_priority)?;
    writeln!(out, "Average Data Quality: {:.0}%\n", meta.average_data_quality * 100.0)?;

    writeln!(out, "CONTENT BY ARTIST")?;
    writeln!(out, "{}\n", "=".repeat(60))?;

    let mut artists: Vec<&str> = Vec::new();
    for item in &export.content {
        if !artists.contains(&item.artist_name.as_str()) {
            artists.push(&item.artist_name);
        }
    }

    for artist in artists {
        writeln!(out, "{}", artist.to_uppercase())?;
        writeln!(out, "{}", "-".repeat(40))?;

        let items = export.content.iter().filter(|c| c.artist_name == artist);
        for (i, item) in items.enumerate() {
            let Some((visual, caption)) = item.post() else {
                continue;
            };
            writeln!(out, "\n[{}] Content Angle: {}", i + 1, item.angle.label())?;
            writeln!(out, "Event: {}", item.event_name)?;
            writeln!(out, "Location: {}", item.venue_location)?;
            writeln!(out, "Platform: {}", item.platform.display_name())?;
            writeln!(out, "Priority: {}/10", item.priority)?;
            writeln!(out, "Visual Text:")?;
            for line in visual.lines() {
                writeln!(out, "  {}", line)?;
            }
            writeln!(out, "\nCaption:")?;
            for line in caption.lines() {
                writeln!(out, "  {}", line)?;
            }
            writeln!(out, "\nEvent Metrics:")?;
            if item.metrics.rank > 0 {
                writeln!(out, "  - Rank: #{}", item.metrics.rank)?;
            }
            writeln!(out, "  - Genre: {}", item.genre)?;
            if item.metrics.career_multiple > 0.0 {
                writeln!(out, "  - vs Career Avg: {:.1}x", item.metrics.career_multiple)?;
            }
            writeln!(out, "\n{}", "~".repeat(50))?;
        }
        out.push_str("\n\n");
    }

    Ok(())
}

/// Column headers of the CSV export.
pub const CSV_HEADERS: [&str; 14] = [
    "Index",
    "Artist_Name",
    "Event_Name",
    "Content_Angle",
    "Platform",
    "Visual_Text",
    "Caption",
    "Priority_Score",
    "Quality_Score",
    "Generated_At",
    "Event_ID",
    "Event_Location",
    "Event_Genre",
    "Event_Rank",
];

/// One row per exported post, every field quoted. Line breaks inside post
/// text become ` | ` so each post stays on one line.
pub fn render_csv(export: &ContentExport) -> String {
    let mut out = String::new();
    write_csv(&mut out, export).map(|_| out).unwrap_or_default()
}

fn write_csv(out: &mut String, export: &ContentExport) -> fmt::Result {
    writeln!(out, "{}", CSV_HEADERS.join(","))?;

    for (i, item) in export.content.iter().enumerate() {
        let Some((visual, caption)) = item.post() else {
            continue;
        };
        let rank = match item.metrics.rank {
            0 => String::new(),
            rank => rank.to_string(),
        };
        let fields = [
            (i + 1).to_string(),
            item.artist_name.clone(),
            item.event_name.clone(),
            item.angle.label().to_string(),
            item.platform.display_name().to_string(),
            visual.lines().collect::<Vec<_>>().join(" | "),
            caption.lines().collect::<Vec<_>>().join(" | "),
            item.priority.to_string(),
            format!("{:.1}%", item.data_quality_score * 100.0),
            item.generated_at.to_rfc3339(),
            item.event_id.clone(),
            item.venue_location.clone(),
            item.genre.clone(),
            rank,
        ];
        let quoted: Vec<String> = fields
            .iter()
            .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
            .collect();
        writeln!(out, "{}", quoted.join(","))?;
    }

    Ok(())
}

/// Write `social_content_<timestamp>.json`, `.txt` and `.csv` into `dir`.
pub fn write_exports(dir: &Path, export: &ContentExport) -> Result<ExportPaths, ExportError> {
    fs::create_dir_all(dir)?;

    let stem = format!(
        "social_content_{}",
        export.metadata.generated_at.format("%Y%m%d_%H%M%S")
    );
    let json = dir.join(format!("{}.json", stem));
    let text = dir.join(format!("{}.txt", stem));
    let csv = dir.join(format!("{}.csv", stem));

    fs::write(&json, serde_json::to_string_pretty(export)?)?;
    fs::write(&text, render_text_report(export))?;
    fs::write(&csv, render_csv(export))?;

    tracing::info!(
        json = %json.display(),
        text = %text.display(),
        csv = %csv.display(),
        items = export.metadata.total_items,
        "Wrote content export"
    );

    Ok(ExportPaths { json, text, csv })
}

// ============================================================================
// Filtering and scheduling
// ============================================================================

/// Successful items at or above `min_priority`, optionally restricted to
/// `preferred_angles` (empty = any) and capped at `max_items`.
pub fn filter_by_priority(
    items: &[GenerationResult],
    min_priority: u8,
    max_items: Option<usize>,
    preferred_angles: &[ContentAngle],
) -> Vec<GenerationResult> {
    let mut filtered = by_priority(items.iter().filter(|item| {
        item.is_success()
            && item.priority >= min_priority
            && (preferred_angles.is_empty() || preferred_angles.contains(&item.angle))
    }));

    if let Some(max) = max_items {
        filtered.truncate(max);
    }
    filtered
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub post_time: String,
    pub content_id: String,
    pub artist: String,
    pub event: String,
    pub platform: Platform,
    pub angle: ContentAngle,
    pub priority: u8,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingSchedule {
    /// Posts per calendar day (`YYYY-MM-DD`).
    pub days: BTreeMap<String, Vec<ScheduledPost>>,
    pub total_days: usize,
    pub total_posts: usize,
    pub posts_per_day: usize,
    pub start_date: String,
}

/// Spread successful items over days in priority order, `HOURS_BETWEEN_POSTS`
/// apart within a day. `posts_per_day` below 1 is treated as 1.
pub fn posting_schedule(
    items: &[GenerationResult],
    posts_per_day: usize,
    start: DateTime<Utc>,
) -> PostingSchedule {
    let posts_per_day = posts_per_day.max(1);
    let ordered = by_priority(items.iter().filter(|i| i.is_success()));

    let mut days: BTreeMap<String, Vec<ScheduledPost>> = BTreeMap::new();
    for (i, item) in ordered.iter().enumerate() {
        let day_start = start + ChronoDuration::days((i / posts_per_day) as i64);
        let slot = (i % posts_per_day) as i64;
        let post_at = day_start + ChronoDuration::hours(slot * HOURS_BETWEEN_POSTS);

        days.entry(day_start.format("%Y-%m-%d").to_string())
            .or_default()
            .push(ScheduledPost {
                post_time: post_at.format("%H:%M").to_string(),
                content_id: item.content_id(),
                artist: item.artist_name.clone(),
                event: item.event_name.clone(),
                platform: item.platform,
                angle: item.angle,
                priority: item.priority,
                preview: preview(item),
            });
    }

    PostingSchedule {
        total_days: days.len(),
        total_posts: ordered.len(),
        days,
        posts_per_day,
        start_date: start.format("%Y-%m-%d").to_string(),
    }
}

// ============================================================================
// Webhook
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMetrics {
    pub rank: u32,
    pub international_pct: f64,
    pub career_multiple: f64,
    pub performance_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPost {
    pub id: String,
    pub artist_name: String,
    pub event_name: String,
    pub venue_location: String,
    pub visual_text: String,
    pub caption: String,
    pub content_angle: ContentAngle,
    pub priority_score: u8,
    pub platform: Platform,
    pub hashtags: Vec<String>,
    pub metrics: WebhookMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub timestamp: DateTime<Utc>,
    pub content_count: usize,
    pub posts: Vec<WebhookPost>,
}

/// Top `max_items` successful posts, ready for an automation webhook.
pub fn webhook_payload(items: &[GenerationResult], max_items: usize) -> WebhookPayload {
    let posts: Vec<WebhookPost> = by_priority(items.iter().filter(|i| i.is_success()))
        .into_iter()
        .take(max_items)
        .filter_map(|item| {
            let (visual, caption) = item.post()?;
            Some(WebhookPost {
                id: item.content_id(),
                artist_name: item.artist_name.clone(),
                event_name: item.event_name.clone(),
                venue_location: item.venue_location.clone(),
                visual_text: visual.to_string(),
                caption: caption.to_string(),
                content_angle: item.angle,
                priority_score: item.priority,
                platform: item.platform,
                hashtags: hashtags(&item),
                metrics: WebhookMetrics {
                    rank: item.metrics.rank,
                    international_pct: item.metrics.international_pct,
                    career_multiple: item.metrics.career_multiple,
                    performance_category: item.metrics.performance_category.clone(),
                },
            })
        })
        .collect();

    WebhookPayload {
        timestamp: Utc::now(),
        content_count: posts.len(),
        posts,
    }
}

/// `#livemusic #concerts #<genre>`, angle tags, then the artist tag when
/// short enough. At most `MAX_HASHTAGS`.
pub fn hashtags(item: &GenerationResult) -> Vec<String> {
    let mut tags = vec!["#livemusic".to_string(), "#concerts".to_string()];

    let genre = clean_tag(&item.genre).to_lowercase();
    if !genre.is_empty() {
        tags.push(format!("#{}", genre));
    }

    let angle_tags: &[&str] = match item.angle {
        ContentAngle::MajorSpike => &["#trending", "#breakingnews"],
        ContentAngle::InternationalPhenomenon => &["#global", "#international"],
        ContentAngle::GenreLeader => &["#leader", "#dominating"],
        ContentAngle::PricingSurge => &["#demand", "#hottickets"],
        ContentAngle::TourStandout => &["#tour", "#standout"],
        _ => &[],
    };
    tags.extend(angle_tags.iter().map(|t| t.to_string()));

    let artist = clean_tag(&item.artist_name.replace('&', "and"));
    if !artist.is_empty() && artist.chars().count() <= MAX_ARTIST_TAG_CHARS {
        tags.push(format!("#{}", artist));
    }

    tags.truncate(MAX_HASHTAGS);
    tags
}

fn clean_tag(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn preview(item: &GenerationResult) -> String {
    let text = match item.post() {
        Some((visual, _)) if !visual.is_empty() => visual,
        Some((_, caption)) => caption,
        None => "",
    };
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn by_priority<'a>(items: impl Iterator<Item = &'a GenerationResult>) -> Vec<GenerationResult> {
    let mut sorted: Vec<GenerationResult> = items.cloned().collect();
    sorted.sort_by_key(|item| Reverse(item.priority));
    sorted
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================
