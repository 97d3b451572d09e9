//! Postgres connection pool wiring.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::LedgerConfig;
use crate::stock_store::postgres::map_sqlx_error;
use crate::stock_store::StoreError;

/// Open a pool using `config.database_url` and `config.pool`.
pub async fn connect(config: &LedgerConfig) -> Result<PgPool, StoreError> {
    let url = config
        .require_database_url()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.pool.max_connections)
        .min_connections(config.pool.min_connections)
        .acquire_timeout(config.pool.acquire_timeout)
        .idle_timeout(config.pool.idle_timeout)
        .connect(url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    tracing::info!(
        max_connections = config.pool.max_connections,
        "connected to postgres"
    );
    Ok(pool)
}
