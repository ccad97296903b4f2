//! Seams between the scope lifecycle and the physical pool.
//!
//! `ScopePool` hands out connections; `SchemaConnection` is what a bound scope
//! and its repositories can do with one. The PostgreSQL implementation wraps
//! sqlx's pool, where dropping a `PoolConnection` returns it to the pool.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

use crate::database::identifier::{Identifier, SearchPath};
use crate::database::manager::{DatabaseError, DatabaseManager};

#[async_trait]
pub trait SchemaConnection: Send + 'static {
    /// Point unqualified names at the given schemas. Fails with
    /// `UnknownSchema` when any of them does not exist.
    async fn set_search_path(&mut self, path: &SearchPath) -> Result<(), DatabaseError>;

    /// Return the connection to the server default search path
    async fn reset_search_path(&mut self) -> Result<(), DatabaseError>;

    /// Rows of `table` as JSON objects, optionally restricted to the given ids
    async fn select_rows(
        &mut self,
        table: &Identifier,
        ids: Option<&[String]>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, DatabaseError>;

    async fn count_rows(&mut self, table: &Identifier) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait ScopePool: Send + Sync + 'static {
    type Conn: SchemaConnection;

    /// Check out one connection. May wait while the pool is saturated.
    async fn acquire(&self) -> Result<Self::Conn, DatabaseError>;

    /// Take a connection out of circulation instead of returning it. Used when
    /// its session state cannot be trusted.
    fn retire(&self, conn: Self::Conn);

    fn checked_out(&self) -> usize;
}

/// `ScopePool` over the shared sqlx pool
#[derive(Clone)]
pub struct PgScopePool {
    manager: DatabaseManager,
}

impl PgScopePool {
    pub fn new(manager: DatabaseManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &DatabaseManager {
        &self.manager
    }
}

#[async_trait]
impl ScopePool for PgScopePool {
    type Conn = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Conn, DatabaseError> {
        self.manager.acquire().await
    }

    fn retire(&self, conn: Self::Conn) {
        // Detached connections are dropped without going back to the pool;
        // the pool opens a replacement on demand.
        drop(conn.detach());
    }

    fn checked_out(&self) -> usize {
        self.manager.checked_out()
    }
}

#[async_trait]
impl SchemaConnection for PoolConnection<Postgres> {
    async fn set_search_path(&mut self, path: &SearchPath) -> Result<(), DatabaseError> {
        // SET search_path accepts missing schemas silently, so check first
        for schema in path.schemas() {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)",
            )
            .bind(schema.as_str())
            .fetch_one(&mut **self)
            .await?;
            if !exists {
                return Err(DatabaseError::UnknownSchema(schema.to_string()));
            }
        }

        sqlx::query(&path.to_set_statement())
            .execute(&mut **self)
            .await?;
        Ok(())
    }

    async fn reset_search_path(&mut self) -> Result<(), DatabaseError> {
        sqlx::query("RESET search_path").execute(&mut **self).await?;
        Ok(())
    }

    async fn select_rows(
        &mut self,
        table: &Identifier,
        ids: Option<&[String]>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, DatabaseError> {
        let query = format!(
            "SELECT to_jsonb(t) FROM {} t WHERE ($1::text[] IS NULL OR t.id::text = ANY($1)) LIMIT $2",
            table.quoted()
        );
        let rows: Vec<Value> = sqlx::query_scalar(&query)
            .bind(ids.map(|ids| ids.to_vec()))
            .bind(limit)
            .fetch_all(&mut **self)
            .await
            .map_err(|e| relation_error(table, e))?;
        Ok(rows)
    }

    async fn count_rows(&mut self, table: &Identifier) -> Result<i64, DatabaseError> {
        let query = format!("SELECT COUNT(*) FROM {}", table.quoted());
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&mut **self)
            .await
            .map_err(|e| relation_error(table, e))?;
        Ok(count)
    }
}

/// SQLSTATE 42P01 (undefined_table) means the entity has no table in the
/// bound schemas
fn relation_error(table: &Identifier, err: sqlx::Error) -> DatabaseError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("42P01") {
            return DatabaseError::UnknownTable(table.to_string());
        }
    }
    err.into()
}
