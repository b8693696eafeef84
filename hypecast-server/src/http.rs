//! Hypecast HTTP API
//!
//! Axum-based JSON API standing in for the interactive front end: browse
//! events, generate and regenerate posts, export the results.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions go through
//! the request router and are testable without axum dispatch.
//!
//! Endpoints:
//! - GET  /health      — warehouse + generator status
//! - GET  /version     — server version info
//! - GET  /events      — structured events with angles (`?refresh=true&limit=n`)
//! - POST /cache/clear — drop cached view rows and generated posts
//! - POST /generate    — run a batch for selected events and platforms
//! - POST /regenerate  — rerun failed pairs, or named pairs from a new angle
//! - GET  /results     — current batch report
//! - POST /reset       — discard results and custom templates
//! - POST /export      — write JSON, text and CSV export files
//! - POST /schedule    — posting schedule for the current results
//! - POST /webhook     — automation webhook payload

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hypecast_core::ipc::{HypecastRequest, HypecastResponse, RegenerateTarget};
use hypecast_core::{ContentAngle, Platform};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::state::AppState;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/events", get(events_handler))
        .route("/cache/clear", post(clear_cache_handler))
        .route("/generate", post(generate_handler))
        .route("/regenerate", post(regenerate_handler))
        .route("/results", get(results_handler))
        .route("/reset", post(reset_handler))
        .route("/export", post(export_handler))
        .route("/schedule", post(schedule_handler))
        .route("/webhook", post(webhook_handler))
        .with_state(state)
}

/// Serve on the configured address until the shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Hypecast HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    #[serde(default)]
    pub refresh: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateRequest {
    #[serde(default)]
    pub event_ids: Vec<String>,
    /// Platform names; case-insensitive, `x` is accepted for Twitter.
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub angles: HashMap<String, ContentAngle>,
    #[serde(default)]
    pub templates: HashMap<ContentAngle, String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub targets: Vec<RegenerateTarget>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExportRequest {
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: usize,
    pub min_priority: Option<u8>,
}

fn default_posts_per_day() -> usize {
    3
}

#[derive(Debug, Deserialize, Default)]
pub struct WebhookRequest {
    pub max_items: Option<usize>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(HypecastRequest::Health, state).await;

    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
            }
            (StatusCode::OK, data)
        }
        Err((_, e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Pure, no IO.
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "hypecast/1",
    })
}

pub async fn events_inner(state: &AppState, query: EventsQuery) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        HypecastRequest::ListEvents {
            refresh: query.refresh,
            limit: query.limit,
        },
    )
    .await
}

/// Validates platform names before handing the batch to the router.
pub async fn generate_inner(state: &AppState, req: GenerateRequest) -> (StatusCode, serde_json::Value) {
    let mut platforms = Vec::with_capacity(req.platforms.len());
    for name in &req.platforms {
        match Platform::from_str(name) {
            Ok(p) if !platforms.contains(&p) => platforms.push(p),
            Ok(_) => {}
            Err(e) => return error_body(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    dispatch(
        state,
        HypecastRequest::Generate {
            event_ids: req.event_ids,
            platforms,
            angles: req.angles,
            templates: req.templates,
        },
    )
    .await
}

pub async fn regenerate_inner(state: &AppState, req: RegenerateRequest) -> (StatusCode, serde_json::Value) {
    dispatch(state, HypecastRequest::Regenerate { targets: req.targets }).await
}

pub async fn export_inner(state: &AppState, req: ExportRequest) -> (StatusCode, serde_json::Value) {
    dispatch(state, HypecastRequest::Export { output_dir: req.output_dir }).await
}

pub async fn schedule_inner(state: &AppState, req: ScheduleRequest) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        HypecastRequest::Schedule {
            posts_per_day: req.posts_per_day,
            min_priority: req.min_priority,
        },
    )
    .await
}

pub async fn webhook_inner(state: &AppState, req: WebhookRequest) -> (StatusCode, serde_json::Value) {
    dispatch(state, HypecastRequest::Webhook { max_items: req.max_items }).await
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let (status, body) = events_inner(&state, query).await;
    (status, Json(body))
}

pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, HypecastRequest::ClearCache).await;
    (status, Json(body))
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (status, body) = generate_inner(&state, req).await;
    (status, Json(body))
}

pub async fn regenerate_handler(
    State(state): State<Arc<AppState>>,
    req: Option<Json<RegenerateRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = regenerate_inner(&state, req).await;
    (status, Json(body))
}

pub async fn results_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, HypecastRequest::Results).await;
    (status, Json(body))
}

pub async fn reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = dispatch(&state, HypecastRequest::Reset).await;
    (status, Json(body))
}

pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    req: Option<Json<ExportRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = export_inner(&state, req).await;
    (status, Json(body))
}

pub async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> impl IntoResponse {
    let (status, body) = schedule_inner(&state, req).await;
    (status, Json(body))
}

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    req: Option<Json<WebhookRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = webhook_inner(&state, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

async fn dispatch(state: &AppState, request: HypecastRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, state).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err((status, e)) => error_body(status, e),
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (
        status,
        serde_json::json!({
            "error": message.into(),
            "status": "error",
        }),
    )
}

/// Convert a router response into an HTTP body, or the error status and message.
pub fn response_to_http(
    response: HypecastResponse,
) -> std::result::Result<serde_json::Value, (StatusCode, String)> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        let status = response
            .code
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Err((
            status,
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
