//! Cached access to the four top-events views.
//!
//! The base view is required; the three supplementary views only enrich
//! events, so a failure there degrades to an empty table plus a warning.
//! Successful fetches are memoized per view for the configured TTL.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::ViewsConfig;
use crate::models::Event;
use crate::structure::structure_events;
use crate::warehouse::{LoaderError, Row, ViewKind, WarehouseSource};

/// Rows of every view as of one `load()` call.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    tables: BTreeMap<ViewKind, Arc<Vec<Row>>>,
    pub warnings: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl ViewSnapshot {
    pub fn insert(&mut self, kind: ViewKind, rows: Arc<Vec<Row>>) {
        self.tables.insert(kind, rows);
    }

    /// Rows for `kind`; empty when the view was not loaded.
    pub fn rows(&self, kind: ViewKind) -> &[Row] {
        self.tables
            .get(&kind)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn row_counts(&self) -> BTreeMap<ViewKind, usize> {
        ViewKind::ALL
            .iter()
            .map(|kind| (*kind, self.rows(*kind).len()))
            .collect()
    }
}

/// Completeness summary over one set of structured events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQuality {
    pub total_events: usize,
    /// Events matched in all three supplementary views.
    pub complete_data_events: usize,
    pub average_completeness: f64,
    pub events_missing_required_fields: usize,
    /// 70% average completeness, 30% share of events with every required field.
    pub data_quality_score: f64,
}

impl DataQuality {
    pub fn from_events(events: &[Event]) -> Self {
        if events.is_empty() {
            return Self::default();
        }

        let total = events.len() as f64;
        let complete_data_events = events
            .iter()
            .filter(|e| e.completeness.score >= 1.0)
            .count();
        let average_completeness =
            events.iter().map(|e| e.completeness.score).sum::<f64>() / total;
        let events_missing_required_fields = events
            .iter()
            .filter(|e| e.missing_required_fields())
            .count();
        let with_required = (events.len() - events_missing_required_fields) as f64;

        Self {
            total_events: events.len(),
            complete_data_events,
            average_completeness,
            events_missing_required_fields,
            data_quality_score: average_completeness * 0.7 + with_required / total * 0.3,
        }
    }
}

/// Structured events plus what the loader had to say about them.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedEvents {
    pub events: Vec<Event>,
    pub warnings: Vec<String>,
    pub row_counts: BTreeMap<ViewKind, usize>,
    pub data_quality: DataQuality,
    pub loaded_at: DateTime<Utc>,
}

pub struct EventLoader {
    source: Arc<dyn WarehouseSource>,
    views: ViewsConfig,
    cache: Cache<ViewKind, Arc<Vec<Row>>>,
}

impl EventLoader {
    pub fn new(source: Arc<dyn WarehouseSource>, views: ViewsConfig, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();

        Self {
            source,
            views,
            cache,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch all four views, serving fresh cached tables where possible.
    pub async fn load(&self) -> Result<ViewSnapshot, LoaderError> {
        let mut snapshot = ViewSnapshot {
            loaded_at: Utc::now(),
            ..Default::default()
        };

        for kind in ViewKind::ALL {
            match self.load_view(kind).await {
                Ok(rows) => snapshot.insert(kind, rows),
                Err(e) if kind == ViewKind::BaseEvents => {
                    tracing::error!(view = %kind, error = %e, "Base view failed to load");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(view = %kind, error = %e, "Supplementary view unavailable");
                    snapshot.warnings.push(format!("{} unavailable: {}", kind, e));
                    snapshot.insert(kind, Arc::new(Vec::new()));
                }
            }
        }

        Ok(snapshot)
    }

    /// Rows for one view. Only successful fetches are cached.
    pub async fn load_view(&self, kind: ViewKind) -> Result<Arc<Vec<Row>>, LoaderError> {
        if let Some(rows) = self.cache.get(&kind).await {
            tracing::debug!(view = %kind, rows = rows.len(), "View served from cache");
            return Ok(rows);
        }

        let view = self.views.name_for(kind);
        let rows = Arc::new(self.source.fetch_view(view).await?);
        tracing::info!(
            view = %kind,
            source = self.source.name(),
            rows = rows.len(),
            "Loaded view from warehouse"
        );

        self.cache.insert(kind, Arc::clone(&rows)).await;
        Ok(rows)
    }

    /// Load and structure events in base-view order.
    pub async fn load_events(&self) -> Result<LoadedEvents, LoaderError> {
        let snapshot = self.load().await?;
        let events = structure_events(&snapshot);
        let data_quality = DataQuality::from_events(&events);

        tracing::debug!(
            events = events.len(),
            quality = data_quality.data_quality_score,
            "Structured events"
        );

        Ok(LoadedEvents {
            events,
            data_quality,
            row_counts: snapshot.row_counts(),
            warnings: snapshot.warnings,
            loaded_at: snapshot.loaded_at,
        })
    }

    pub async fn clear_cache(&self) {
        let dropped = self.cache.entry_count();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        tracing::info!(dropped, "Cleared view cache");
    }

    /// Which configured views can be queried right now. Bypasses the cache.
    pub async fn validate_views(&self) -> BTreeMap<ViewKind, bool> {
        let mut status = BTreeMap::new();
        for kind in ViewKind::ALL {
            let view = self.views.name_for(kind);
            let ok = match self.source.fetch_view(view).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(view = view, error = %e, "View validation failed");
                    false
                }
            };
            status.insert(kind, ok);
        }
        status
    }

    pub async fn health_check(&self) -> Result<String, LoaderError> {
        self.source.server_version().await
    }
}
