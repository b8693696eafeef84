//! Shared server state: loader, pipeline and the per-process session.

use std::sync::Arc;
use std::time::Duration;

use hypecast_core::config::HypecastConfig;
use hypecast_core::{
    BatchPipeline, BatchReport, ContentBackend, EventLoader, HypecastError,
    OpenAiContentClient, PgWarehouse, PipelineOptions, PromptBuilder, WarehouseSource,
};
use tokio::sync::RwLock;

/// What the interactive front end accumulates between requests.
/// Lives only in memory; `reset` or a restart discards it.
/// Events are not kept here; every request reads them through the loader
/// so the view cache TTL applies.
#[derive(Debug, Default)]
pub struct Session {
    pub report: Option<BatchReport>,
    pub prompts: PromptBuilder,
}

pub struct AppState {
    pub config: HypecastConfig,
    pub loader: EventLoader,
    pub pipeline: BatchPipeline,
    pub session: RwLock<Session>,
}

impl AppState {
    pub fn new(
        config: HypecastConfig,
        source: Arc<dyn WarehouseSource>,
        backend: Arc<dyn ContentBackend>,
    ) -> Self {
        let loader = build_loader(&config, source);
        let pipeline = BatchPipeline::new(backend, PipelineOptions::from_config(&config.generation));

        Self {
            config,
            loader,
            pipeline,
            session: RwLock::new(Session::default()),
        }
    }

    /// Postgres warehouse plus the OpenAI client. Fails on a missing API key.
    pub fn from_config(config: HypecastConfig) -> Result<Self, HypecastError> {
        let source = warehouse_from_config(&config)?;
        let backend: Arc<dyn ContentBackend> =
            Arc::new(OpenAiContentClient::from_config(&config.generation)?);
        Ok(Self::new(config, source, backend))
    }
}

pub fn warehouse_from_config(
    config: &HypecastConfig,
) -> Result<Arc<dyn WarehouseSource>, HypecastError> {
    let pool = hypecast_core::db::create_pool(&config.warehouse)?;
    Ok(Arc::new(PgWarehouse::new(pool)))
}

pub fn build_loader(config: &HypecastConfig, source: Arc<dyn WarehouseSource>) -> EventLoader {
    EventLoader::new(
        source,
        config.warehouse.views.clone(),
        Duration::from_secs(config.warehouse.cache_ttl_seconds),
    )
}
