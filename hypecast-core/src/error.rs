use thiserror::Error;

use crate::generation::GenerationError;

/// Startup failures while wiring the warehouse and model client.
#[derive(Error, Debug)]
pub enum HypecastError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}
