//! Warehouse sources for the four top-events views.
//!
//! Provides a `WarehouseSource` trait with implementations for:
//! - **Postgres** — any Postgres-compatible warehouse reachable through `sqlx`
//! - **In-memory** — fixed rows per view, for tests and offline runs
//!
//! Rows come back as JSON objects with lower-cased column names so the
//! structurer does not depend on the warehouse's identifier casing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// One view row keyed by lower-case column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    BaseEvents,
    HistoricalContext,
    TrendAnalysis,
    MarketRankings,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::BaseEvents,
        ViewKind::HistoricalContext,
        ViewKind::TrendAnalysis,
        ViewKind::MarketRankings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::BaseEvents => "base_events",
            ViewKind::HistoricalContext => "historical_context",
            ViewKind::TrendAnalysis => "trend_analysis",
            ViewKind::MarketRankings => "market_rankings",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-fetch errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid view name '{0}': expected a dotted SQL identifier")]
    InvalidViewName(String),

    #[error("Failed to load view {view}: {message}")]
    View { view: String, message: String },
}

// ============================================================================
// WarehouseSource trait
// ============================================================================

/// Abstraction over where view rows come from.
#[async_trait]
pub trait WarehouseSource: Send + Sync {
    /// Fetch every row of `view`, ordered by `recent_gms_rank`.
    async fn fetch_view(&self, view: &str) -> Result<Vec<Row>, LoaderError>;

    /// Version string of the backing warehouse, for health checks.
    async fn server_version(&self) -> Result<String, LoaderError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Accept `schema.view` style names made of `[A-Za-z_][A-Za-z0-9_]*` segments.
///
/// View names come from configuration and are interpolated into SQL, so
/// anything else is rejected.
pub fn validate_view_name(view: &str) -> Result<(), LoaderError> {
    let valid = !view.is_empty()
        && view.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                _ => false,
            }
        });

    if valid {
        Ok(())
    } else {
        Err(LoaderError::InvalidViewName(view.to_string()))
    }
}

/// Lower-case every key of a JSON object row. Non-objects yield `None`.
pub fn normalize_row(value: Value) -> Option<Row> {
    match value {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        ),
        _ => None,
    }
}

// ============================================================================
// PgWarehouse
// ============================================================================

/// Postgres-compatible warehouse reached through a `sqlx` pool.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WarehouseSource for PgWarehouse {
    async fn fetch_view(&self, view: &str) -> Result<Vec<Row>, LoaderError> {
        validate_view_name(view)?;

        let sql = format!(
            "SELECT row_to_json(v)::jsonb FROM {} v ORDER BY v.recent_gms_rank",
            view
        );

        let rows: Vec<(Value,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let rows: Vec<Row> = rows
            .into_iter()
            .filter_map(|(value,)| normalize_row(value))
            .collect();

        tracing::debug!(view = view, rows = rows.len(), "Fetched warehouse view");
        Ok(rows)
    }

    async fn server_version(&self) -> Result<String, LoaderError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// InMemoryWarehouse
// ============================================================================

/// Fixed rows per view name. Views marked failing return `LoaderError::View`.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    views: HashMap<String, Vec<Row>>,
    failing: HashSet<String>,
    fetches: AtomicUsize,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rows for a view. Each value must be a JSON object.
    pub fn with_view(mut self, view: impl Into<String>, rows: Vec<Value>) -> Self {
        let rows = rows.into_iter().filter_map(normalize_row).collect();
        self.views.insert(view.into(), rows);
        self
    }

    pub fn failing_view(mut self, view: impl Into<String>) -> Self {
        self.failing.insert(view.into());
        self
    }

    /// Total `fetch_view` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseSource for InMemoryWarehouse {
    async fn fetch_view(&self, view: &str) -> Result<Vec<Row>, LoaderError> {
        validate_view_name(view)?;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(view) {
            return Err(LoaderError::View {
                view: view.to_string(),
                message: "view is unavailable".to_string(),
            });
        }

        let mut rows = self.views.get(view).cloned().unwrap_or_default();
        rows.sort_by_key(|row| {
            row.get("recent_gms_rank")
                .and_then(Value::as_i64)
                .unwrap_or(i64::MAX)
        });
        Ok(rows)
    }

    async fn server_version(&self) -> Result<String, LoaderError> {
        Ok("in-memory".to_string())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
