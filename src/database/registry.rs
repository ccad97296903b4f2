//! Tenant registry backed by a single table in the shared schema.
//!
//! Expected table shape:
//!
//! ```sql
//! CREATE TABLE public.tenants (
//!     id          uuid PRIMARY KEY,
//!     slug        text NOT NULL UNIQUE,
//!     schema_name text NOT NULL UNIQUE,
//!     name        text NOT NULL,
//!     created_at  timestamptz NOT NULL DEFAULT now(),
//!     settings    jsonb
//! );
//! ```

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::identifier::Identifier;
use crate::database::manager::DatabaseError;
use crate::database::models::tenant::{TenantRecord, TenantSummary};
use crate::error::TenancyError;

/// Read access to tenant records. Implementations must tolerate any number of
/// concurrent callers.
#[async_trait]
pub trait TenantStore: Send + Sync + 'static {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, DatabaseError>;

    /// Active tenants ordered by display name
    async fn list_active(&self) -> Result<Vec<TenantSummary>, DatabaseError>;

    async fn count(&self) -> Result<i64, DatabaseError>;
}

/// Startup check: the registry must hold at least one tenant and the default one.
pub async fn verify_bootstrap<S: TenantStore + ?Sized>(
    store: &S,
    default_slug: &str,
) -> Result<(), TenancyError> {
    if store.count().await? == 0 {
        return Err(TenancyError::RegistryEmpty);
    }
    if store.find_by_slug(default_slug).await?.is_none() {
        return Err(TenancyError::DefaultTenantMissing {
            slug: default_slug.to_string(),
        });
    }
    Ok(())
}

pub struct PgTenantRegistry {
    pool: PgPool,
    table: String,
}

impl PgTenantRegistry {
    /// `shared_schema` and `table` are validated once here; every query
    /// qualifies the table so the registry never depends on a search path.
    pub fn new(pool: PgPool, shared_schema: &str, table: &str) -> Result<Self, DatabaseError> {
        let schema = Identifier::parse(shared_schema)?;
        let table = Identifier::parse(table)?;
        Ok(Self {
            pool,
            table: format!("{}.{}", schema.quoted(), table.quoted()),
        })
    }
}

#[async_trait]
impl TenantStore for PgTenantRegistry {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, DatabaseError> {
        let query = format!(
            "SELECT id, slug, schema_name, name, created_at, settings FROM {} WHERE slug = $1",
            self.table
        );
        let record = sqlx::query_as::<_, TenantRecord>(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list_active(&self) -> Result<Vec<TenantSummary>, DatabaseError> {
        let query = format!("SELECT slug, name FROM {} ORDER BY name ASC, slug ASC", self.table);
        let tenants = sqlx::query_as::<_, TenantSummary>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(tenants)
    }

    async fn count(&self) -> Result<i64, DatabaseError> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }
}
