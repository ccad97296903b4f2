use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::ScopeState;
use crate::database::connection::{SchemaConnection, ScopePool};
use crate::database::identifier::{Identifier, SearchPath};
use crate::database::manager::DatabaseError;
use crate::database::models::tenant::TenantInfo;
use crate::database::repository::{Repository, RepositoryFactory};
use crate::error::TenancyError;

/// Opens request scopes against the shared pool. Cheap to clone.
pub struct ScopeManager<P: ScopePool> {
    pool: Arc<P>,
    factory: Arc<RepositoryFactory>,
    shared_schema: Identifier,
    acquire_timeout: Duration,
}

impl<P: ScopePool> Clone for ScopeManager<P> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            factory: Arc::clone(&self.factory),
            shared_schema: self.shared_schema.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<P: ScopePool> ScopeManager<P> {
    pub fn new(
        pool: Arc<P>,
        factory: Arc<RepositoryFactory>,
        shared_schema: Identifier,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            factory,
            shared_schema,
            acquire_timeout,
        }
    }

    /// New scope in the `Unbound` state; nothing is acquired yet
    pub fn begin(&self, tenant: Arc<TenantInfo>) -> RequestScope<P> {
        RequestScope {
            id: Uuid::new_v4(),
            tenant,
            state: ScopeState::Unbound,
            conn: None,
            pool: Arc::clone(&self.pool),
            factory: Arc::clone(&self.factory),
            shared_schema: self.shared_schema.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }

    /// Acquire and bind in one step
    pub async fn open(&self, tenant: Arc<TenantInfo>) -> Result<RequestScope<P>, TenancyError> {
        let mut scope = self.begin(tenant);
        scope.bind().await?;
        Ok(scope)
    }

    /// Run `f` inside a bound scope. The scope is released whether `f`
    /// succeeds or fails; if the returned future is dropped, the scope's
    /// `Drop` retires the connection instead.
    pub async fn run<T, E, F>(&self, tenant: Arc<TenantInfo>, f: F) -> Result<T, E>
    where
        E: From<TenancyError>,
        F: for<'s> FnOnce(&'s mut RequestScope<P>) -> BoxFuture<'s, Result<T, E>>,
    {
        let mut scope = self.open(tenant).await?;
        let result = f(&mut scope).await;
        scope.release().await;
        result
    }

    pub fn checked_out(&self) -> usize {
        self.pool.checked_out()
    }

    pub fn factory(&self) -> &Arc<RepositoryFactory> {
        &self.factory
    }
}

/// Per-request ownership of one pooled connection bound to one tenant.
///
/// Not `Clone`; repositories borrow it mutably, so none can outlive it or
/// run concurrently on its connection.
pub struct RequestScope<P: ScopePool> {
    id: Uuid,
    tenant: Arc<TenantInfo>,
    state: ScopeState,
    conn: Option<P::Conn>,
    pool: Arc<P>,
    factory: Arc<RepositoryFactory>,
    shared_schema: Identifier,
    acquire_timeout: Duration,
}

impl<P: ScopePool> RequestScope<P> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant(&self) -> &Arc<TenantInfo> {
        &self.tenant
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// `Unbound → Acquiring → Bound`. Any failure leaves the scope
    /// `Released` with no connection held.
    pub async fn bind(&mut self) -> Result<(), TenancyError> {
        match self.state {
            ScopeState::Unbound => {}
            ScopeState::Bound => return Ok(()),
            ScopeState::Released => return Err(self.closed()),
            // An earlier bind was interrupted mid-way
            ScopeState::Acquiring => return Err(self.not_ready()),
        }

        let slug = self.tenant.slug.clone();
        let schema_name = self.tenant.schema_name.clone();

        let schema = match Identifier::parse(&schema_name) {
            Ok(schema) => schema,
            Err(source) => {
                self.state = ScopeState::Released;
                error!(scope_id = %self.id, slug = %slug, schema = %schema_name, "Registry schema name is not a valid identifier");
                return Err(TenancyError::TenantMisconfigured { slug, schema: schema_name, source });
            }
        };

        self.state = ScopeState::Acquiring;
        let acquired = tokio::time::timeout(self.acquire_timeout, self.pool.acquire()).await;
        let conn = match acquired {
            Ok(Ok(conn)) => conn,
            Ok(Err(DatabaseError::PoolTimedOut)) | Ok(Err(DatabaseError::PoolClosed)) | Err(_) => {
                self.state = ScopeState::Released;
                let timeout_ms = self.acquire_timeout.as_millis() as u64;
                warn!(scope_id = %self.id, slug = %slug, timeout_ms, "Connection pool exhausted");
                return Err(TenancyError::ResourceUnavailable { slug, timeout_ms });
            }
            Ok(Err(other)) => {
                self.state = ScopeState::Released;
                return Err(other.into());
            }
        };

        // Held on self before the schema switch so an interrupted bind is
        // still cleaned up by release() or Drop.
        let conn = self.conn.insert(conn);
        let path = SearchPath::new(schema, self.shared_schema.clone());
        if let Err(source) = conn.set_search_path(&path).await {
            if let Some(conn) = self.conn.take() {
                self.pool.retire(conn);
            }
            self.state = ScopeState::Released;
            error!(
                scope_id = %self.id,
                slug = %slug,
                schema = %schema_name,
                error = %source,
                "Failed to bind tenant schema"
            );
            return Err(TenancyError::TenantMisconfigured { slug, schema: schema_name, source });
        }

        self.state = ScopeState::Bound;
        debug!(scope_id = %self.id, slug = %slug, "Scope bound");
        Ok(())
    }

    /// Return the connection to the pool. Idempotent; after the first call
    /// the scope is `Released` for good.
    ///
    /// A bound connection has its search path reset first. If that fails, or
    /// the scope never finished binding, the connection is retired instead.
    pub async fn release(&mut self) {
        let previous = std::mem::replace(&mut self.state, ScopeState::Released);

        let clean = match self.conn.as_mut() {
            None => return,
            Some(conn) if previous == ScopeState::Bound => match conn.reset_search_path().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(scope_id = %self.id, slug = %self.tenant.slug, error = %e, "Search path reset failed, retiring connection");
                    false
                }
            },
            Some(_) => false,
        };

        if let Some(conn) = self.conn.take() {
            if clean {
                drop(conn);
            } else {
                self.pool.retire(conn);
            }
        }
        debug!(scope_id = %self.id, slug = %self.tenant.slug, "Scope released");
    }

    /// Repository for a registered entity kind over this scope's connection
    pub fn repository(&mut self, entity: &str) -> Result<Repository<'_, P::Conn>, TenancyError> {
        let factory = Arc::clone(&self.factory);
        factory.repository(self, entity)
    }

    /// The bound connection, or the contract violation explaining why not
    pub fn connection(&mut self) -> Result<&mut P::Conn, TenancyError> {
        match self.state {
            ScopeState::Bound => {}
            ScopeState::Released => return Err(self.closed()),
            _ => return Err(self.not_ready()),
        }
        let slug = &self.tenant.slug;
        self.conn
            .as_mut()
            .ok_or_else(|| TenancyError::ScopeClosed { slug: slug.clone() })
    }

    fn closed(&self) -> TenancyError {
        TenancyError::ScopeClosed {
            slug: self.tenant.slug.clone(),
        }
    }

    fn not_ready(&self) -> TenancyError {
        TenancyError::ScopeNotReady {
            slug: self.tenant.slug.clone(),
            state: self.state,
        }
    }
}

impl<P: ScopePool> Drop for RequestScope<P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Cancelled or abandoned mid-request: the session may still carry
            // the tenant search path, so it never goes back to the pool.
            warn!(
                scope_id = %self.id,
                slug = %self.tenant.slug,
                state = ?self.state,
                "Scope dropped while holding a connection, retiring it"
            );
            self.pool.retire(conn);
        }
        self.state = ScopeState::Released;
    }
}
