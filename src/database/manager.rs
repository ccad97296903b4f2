use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Schema does not exist: {0}")]
    UnknownSchema(String),

    #[error("Relation does not exist: {0}")]
    UnknownTable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for a pooled connection")]
    PoolTimedOut,

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolTimedOut,
            sqlx::Error::PoolClosed => DatabaseError::PoolClosed,
            other => DatabaseError::Sqlx(other),
        }
    }
}

/// Owner of the single shared connection pool every tenant scope draws from.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Connect using `DATABASE_URL` and the given pool settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
        Self::connect_with_url(&url, config).await
    }

    pub async fn connect_with_url(url: &str, config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            // Connections returned outside RequestScope::release still lose
            // their tenant binding before anyone else can check them out.
            .after_release(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("RESET search_path").execute(&mut *conn).await?;
                    Ok(true)
                })
            })
            .connect(url)
            .await?;

        info!(
            database = %Self::redacted(url)?,
            max_connections = config.max_connections,
            "Created shared database pool"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connections currently checked out of the pool
    pub fn checked_out(&self) -> usize {
        (self.pool.size() as usize).saturating_sub(self.pool.num_idle())
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DatabaseError> {
        Ok(self.pool.acquire().await?)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed shared database pool");
    }

    /// Database URL with the password stripped, for logs
    fn redacted(url: &str) -> Result<String, DatabaseError> {
        let mut parsed = url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
            warn!("Could not redact database password for logging");
            return Ok(String::from("<redacted>"));
        }
        Ok(parsed.into())
    }
}
