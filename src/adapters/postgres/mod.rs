//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresAccountStore` - account subscription fields
//! - `connect` / `run_migrations` - pool setup for the binary

mod account_store;

pub use account_store::PostgresAccountStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a connection pool sized from configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect: {}", e)))?;

    tracing::info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Schema migration failed: {}", e)))?;
    tracing::info!("Database schema up to date");
    Ok(())
}
