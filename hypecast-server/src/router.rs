use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use hypecast_core::angles::{content_priority, identify_angles, primary_angle};
use hypecast_core::export::{
    build_export, filter_by_priority, posting_schedule, webhook_payload, write_exports,
};
use hypecast_core::ipc::{HypecastRequest, HypecastResponse, RegenerateTarget};
use hypecast_core::{ContentAngle, Event, EventSelection, Platform};
use thiserror::Error;

use crate::batch::resolve_platforms;
use crate::state::AppState;

const DEFAULT_WEBHOOK_ITEMS: usize = 20;

/// Request failures, each mapped to the HTTP status it is reported with.
#[derive(Error, Debug)]
enum RouteError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Warehouse unavailable: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RouteError {
    fn code(&self) -> u16 {
        match self {
            RouteError::BadRequest(_) => 400,
            RouteError::NotFound(_) => 404,
            RouteError::Conflict(_) => 409,
            RouteError::Upstream(_) => 502,
            RouteError::Internal(_) => 500,
        }
    }
}

type RouteResult = Result<serde_json::Value, RouteError>;

pub async fn handle_request(request: HypecastRequest, state: &AppState) -> HypecastResponse {
    let result = match request {
        HypecastRequest::Ping => return HypecastResponse::pong(),
        HypecastRequest::Health => handle_health(state).await,
        HypecastRequest::ListEvents { refresh, limit } => {
            handle_list_events(state, refresh, limit).await
        }
        HypecastRequest::ClearCache => {
            state.loader.clear_cache().await;
            state.pipeline.clear_result_cache().await;
            Ok(serde_json::json!({ "cleared": true }))
        }
        HypecastRequest::Generate {
            event_ids,
            platforms,
            angles,
            templates,
        } => handle_generate(state, event_ids, platforms, angles, templates).await,
        HypecastRequest::Regenerate { targets } => handle_regenerate(state, targets).await,
        HypecastRequest::Results => {
            let session = state.session.read().await;
            serde_json::to_value(&session.report)
                .map(|report| serde_json::json!({ "report": report }))
                .map_err(|e| RouteError::Internal(e.into()))
        }
        HypecastRequest::Reset => {
            {
                let mut session = state.session.write().await;
                session.report = None;
                session.prompts = Default::default();
            }
            state.pipeline.clear_result_cache().await;
            tracing::info!("Session reset");
            Ok(serde_json::json!({ "reset": true }))
        }
        HypecastRequest::Export { output_dir } => handle_export(state, output_dir).await,
        HypecastRequest::Schedule {
            posts_per_day,
            min_priority,
        } => handle_schedule(state, posts_per_day, min_priority).await,
        HypecastRequest::Webhook { max_items } => handle_webhook(state, max_items).await,
    };

    match result {
        Ok(data) => HypecastResponse::ok(data),
        Err(e) => {
            if e.code() >= 500 {
                tracing::error!(error = %e, "Request failed");
            } else {
                tracing::debug!(error = %e, "Request rejected");
            }
            HypecastResponse::err_code(e.code(), e.to_string())
        }
    }
}

async fn handle_health(state: &AppState) -> RouteResult {
    let version = state
        .loader
        .health_check()
        .await
        .map_err(|e| RouteError::Upstream(e.to_string()))?;

    // the generator being down degrades the service but does not fail the check
    let (status, generator_status) = match state.pipeline.check_backend().await {
        Ok(()) => ("healthy", "ok".to_string()),
        Err(e) => ("degraded", e.user_message()),
    };

    Ok(serde_json::json!({
        "status": status,
        "warehouse": version,
        "source": state.loader.source_name(),
        "generator": state.pipeline.backend_name(),
        "generator_status": generator_status,
        "model": state.pipeline.model(),
    }))
}

/// Load (or refresh) events and describe them with angles.
async fn handle_list_events(state: &AppState, refresh: bool, limit: Option<usize>) -> RouteResult {
    if refresh {
        state.loader.clear_cache().await;
    }

    let loaded = state
        .loader
        .load_events()
        .await
        .map_err(|e| RouteError::Upstream(e.to_string()))?;

    let max_angles = state.config.generation.max_angles_per_event;
    let shown = limit.unwrap_or(loaded.events.len());
    let events: Vec<serde_json::Value> = loaded
        .events
        .iter()
        .take(shown)
        .map(|event| {
            let primary = primary_angle(event);
            serde_json::json!({
                "event": event,
                "angles": identify_angles(event, max_angles),
                "primary_angle": primary,
                "priority": content_priority(event, primary),
            })
        })
        .collect();

    let body = serde_json::json!({
        "count": events.len(),
        "total": loaded.events.len(),
        "events": events,
        "warnings": loaded.warnings,
        "row_counts": loaded.row_counts,
        "data_quality": loaded.data_quality,
        "loaded_at": loaded.loaded_at,
    });

    Ok(body)
}

/// Current events, through the loader's view cache.
async fn current_events(state: &AppState) -> Result<Vec<Event>, RouteError> {
    let loaded = state
        .loader
        .load_events()
        .await
        .map_err(|e| RouteError::Upstream(e.to_string()))?;
    Ok(loaded.events)
}

async fn handle_generate(
    state: &AppState,
    event_ids: Vec<String>,
    platforms: Vec<Platform>,
    angles: HashMap<String, ContentAngle>,
    templates: HashMap<ContentAngle, String>,
) -> RouteResult {
    let events = current_events(state).await?;

    let mut seen = HashSet::new();
    let mut selections = Vec::with_capacity(event_ids.len());
    for id in &event_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let event = events
            .iter()
            .find(|e| &e.event_id == id)
            .ok_or_else(|| RouteError::NotFound(format!("Unknown event id: {}", id)))?;
        selections.push(EventSelection {
            event: event.clone(),
            angle: angles.get(id).copied(),
        });
    }

    let platforms = resolve_platforms(&platforms, state.config.service.default_platform);

    // templates apply all-or-nothing
    let prompts = {
        let mut session = state.session.write().await;
        let mut prompts = session.prompts.clone();
        for (angle, template) in templates {
            prompts
                .set_template(angle, template)
                .map_err(|e| RouteError::BadRequest(format!("Template for {}: {}", angle, e)))?;
        }
        session.prompts = prompts.clone();
        prompts
    };

    let report = state.pipeline.run(&selections, &platforms, &prompts).await;
    let body = serde_json::to_value(&report).map_err(|e| RouteError::Internal(e.into()))?;

    state.session.write().await.report = Some(report);
    Ok(body)
}

async fn handle_regenerate(state: &AppState, targets: Vec<RegenerateTarget>) -> RouteResult {
    let (mut report, prompts) = {
        let session = state.session.read().await;
        let report = session
            .report
            .clone()
            .ok_or_else(|| RouteError::Conflict("No generation results to regenerate".to_string()))?;
        (report, session.prompts.clone())
    };
    let events = current_events(state).await?;

    let rerun = state
        .pipeline
        .regenerate(&mut report, &targets, &events, &prompts)
        .await;

    let body = serde_json::json!({
        "regenerated": rerun,
        "report": serde_json::to_value(&report).map_err(|e| RouteError::Internal(e.into()))?,
    });

    state.session.write().await.report = Some(report);
    Ok(body)
}

async fn handle_export(state: &AppState, output_dir: Option<String>) -> RouteResult {
    let export = {
        let session = state.session.read().await;
        let report = session
            .report
            .as_ref()
            .ok_or_else(|| RouteError::Conflict("Nothing to export yet".to_string()))?;
        build_export(report)
    };

    let dir = PathBuf::from(output_dir.unwrap_or_else(|| state.config.export.output_dir.clone()));
    let paths = write_exports(&dir, &export).map_err(|e| RouteError::Internal(e.into()))?;

    Ok(serde_json::json!({
        "json_file": paths.json,
        "text_file": paths.text,
        "csv_file": paths.csv,
        "items": export.metadata.total_items,
    }))
}

async fn handle_schedule(
    state: &AppState,
    posts_per_day: usize,
    min_priority: Option<u8>,
) -> RouteResult {
    if posts_per_day == 0 {
        return Err(RouteError::BadRequest("posts_per_day must be at least 1".to_string()));
    }

    let session = state.session.read().await;
    let report = session
        .report
        .as_ref()
        .ok_or_else(|| RouteError::Conflict("Nothing to schedule yet".to_string()))?;

    let items = filter_by_priority(&report.results, min_priority.unwrap_or(1), None, &[]);
    let schedule = posting_schedule(&items, posts_per_day, Utc::now());
    serde_json::to_value(schedule).map_err(|e| RouteError::Internal(e.into()))
}

async fn handle_webhook(state: &AppState, max_items: Option<usize>) -> RouteResult {
    let session = state.session.read().await;
    let report = session
        .report
        .as_ref()
        .ok_or_else(|| RouteError::Conflict("Nothing to send yet".to_string()))?;

    let payload = webhook_payload(&report.results, max_items.unwrap_or(DEFAULT_WEBHOOK_ITEMS));
    Ok(serde_json::json!({ "webhook_data": payload }))
}
