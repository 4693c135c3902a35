//! # Database Connection Pool Management
//!
//! Creates `sqlx` pools for the supported backends and wraps them in the
//! matching [`TableStore`].

use crate::config::DatabaseConfig;
use crate::errors::{HarnessError, Result};
use crate::storage::{PostgresTableStore, SqliteTableStore, TableStore};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to the configured database and return its table store
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn TableStore>> {
    config.validate_custom()?;

    if config.is_sqlite() {
        let pool = create_sqlite_pool(config).await?;
        Ok(Arc::new(SqliteTableStore::new(pool)))
    } else {
        let pool = create_postgres_pool(config).await?;
        Ok(Arc::new(PostgresTableStore::new(pool)))
    }
}

/// Create a SQLite pool. In-memory databases get a single pinned connection.
pub async fn create_sqlite_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    config.validate_custom()?;

    let connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            HarnessError::database(
                e,
                format!("Invalid SQLite connection string: {}", sanitize_url(&config.url)),
            )
        })?
        .create_if_missing(true)
        .busy_timeout(SQLITE_BUSY_TIMEOUT);

    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .idle_timeout(config.idle_timeout())
    };

    let pool = pool_options
        .acquire_timeout(config.connect_timeout())
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                url = %sanitize_url(&config.url),
                "Failed to create SQLite database pool"
            );
            HarnessError::database(
                e,
                format!("Failed to connect to database: {}", sanitize_url(&config.url)),
            )
        })?;

    tracing::debug!(
        database_type = "sqlite",
        in_memory = config.is_in_memory(),
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Create a PostgreSQL pool
pub async fn create_postgres_pool(config: &DatabaseConfig) -> Result<PgPool> {
    config.validate_custom()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(config.idle_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                url = %sanitize_url(&config.url),
                "Failed to create PostgreSQL database pool"
            );
            HarnessError::database(
                e,
                format!("Failed to connect to database: {}", sanitize_url(&config.url)),
            )
        })?;

    tracing::debug!(
        database_type = "postgresql",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Sanitize database URL for logging (remove credentials)
pub fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            format!(
                "{}://***:***@{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}
