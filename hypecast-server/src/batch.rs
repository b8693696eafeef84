//! One-shot batch mode: load events, generate for the top N, export, exit.

use std::path::Path;

use anyhow::Context;
use hypecast_core::export::{build_export, write_exports, ExportPaths};
use hypecast_core::{BatchReport, EventSelection, Platform};

use crate::state::AppState;

/// Requested platforms in first-seen order without repeats, or `default`
/// when none were asked for.
pub fn resolve_platforms(requested: &[Platform], default: Platform) -> Vec<Platform> {
    let mut platforms = Vec::with_capacity(requested.len().max(1));
    for &platform in requested {
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        platforms.push(default);
    }
    platforms
}

/// Generate posts for the `max_events` best-ranked events on each platform and
/// write the export files. Per-pair failures are in the report, not an error.
pub async fn run_once(
    state: &AppState,
    max_events: usize,
    platforms: &[Platform],
    output_dir: &Path,
) -> anyhow::Result<(BatchReport, ExportPaths)> {
    let loaded = state
        .loader
        .load_events()
        .await
        .context("Failed to load events from the warehouse")?;

    for warning in &loaded.warnings {
        tracing::warn!(warning = %warning, "Partial warehouse data");
    }

    let selections: Vec<EventSelection> = loaded
        .events
        .into_iter()
        .take(max_events)
        .map(EventSelection::from)
        .collect();

    let platforms = resolve_platforms(platforms, state.config.service.default_platform);

    tracing::info!(
        events = selections.len(),
        platforms = ?platforms,
        "Running one-shot batch"
    );

    let prompts = state.session.read().await.prompts.clone();
    let report = state.pipeline.run(&selections, &platforms, &prompts).await;

    let export = build_export(&report);
    let paths = write_exports(output_dir, &export)
        .with_context(|| format!("Failed to write exports to {}", output_dir.display()))?;

    tracing::info!(
        json = %paths.json.display(),
        text = %paths.text.display(),
        csv = %paths.csv.display(),
        succeeded = report.succeeded,
        failed = report.failed,
        "Batch exported"
    );

    state.session.write().await.report = Some(report.clone());
    Ok((report, paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_platforms_drops_repeats_and_keeps_order() {
        let platforms = resolve_platforms(
            &[Platform::Twitter, Platform::TikTok, Platform::Twitter],
            Platform::Instagram,
        );
        assert_eq!(platforms, vec![Platform::Twitter, Platform::TikTok]);
    }

    #[test]
    fn test_resolve_platforms_falls_back_to_default() {
        assert_eq!(resolve_platforms(&[], Platform::Instagram), vec![Platform::Instagram]);
    }
}
