use crate::config::WarehouseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Build the warehouse pool without opening a connection.
///
/// Connections are established on first query so an unreachable warehouse
/// surfaces as a data-fetch error instead of blocking startup.
pub fn create_pool(config: &WarehouseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_seconds))
        .connect_lazy(&config.url)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
