pub mod angles;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod generation;
pub mod ipc;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod structure;
pub mod warehouse;

pub use config::HypecastConfig;
pub use error::HypecastError;
pub use generation::{
    ClientConfig, ContentBackend, GenerationError, OpenAiContentClient, DEFAULT_API_BASE_URL,
};
pub use loader::{DataQuality, EventLoader, LoadedEvents, ViewSnapshot};
pub use models::{
    ContentAngle, Event, GeneratedPost, GenerationOutcome, GenerationRequest, GenerationResult,
    Platform,
};
pub use pipeline::{BatchPipeline, BatchReport, EventSelection, PipelineOptions, RegenerateTarget};
pub use prompt::{PromptBuilder, PromptError};
pub use warehouse::{InMemoryWarehouse, LoaderError, PgWarehouse, ViewKind, WarehouseSource};
