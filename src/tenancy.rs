use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::AppConfig;
use crate::database::connection::ScopePool;
use crate::database::identifier::Identifier;
use crate::database::models::tenant::TenantInfo;
use crate::database::registry::{self, TenantStore};
use crate::database::repository::RepositoryFactory;
use crate::error::TenancyError;
use crate::scope::{RequestScope, ScopeManager};
use crate::services::tenant_directory::TenantDirectory;
use crate::services::tenant_resolver::{Resolution, ResolutionSource, TenantResolver};

/// Request-facing entry point: resolve, look up, open a scope.
pub struct Tenancy<P: ScopePool> {
    resolver: TenantResolver,
    directory: Arc<TenantDirectory>,
    scopes: ScopeManager<P>,
    allow_default_fallback: bool,
}

impl<P: ScopePool> Tenancy<P> {
    pub fn new(
        resolver: TenantResolver,
        directory: Arc<TenantDirectory>,
        scopes: ScopeManager<P>,
        allow_default_fallback: bool,
    ) -> Self {
        Self {
            resolver,
            directory,
            scopes,
            allow_default_fallback,
        }
    }

    /// Assemble from configuration and verify the registry bootstrap, so a
    /// missing default tenant fails at startup rather than on first request.
    pub async fn initialize(
        config: &AppConfig,
        store: Arc<dyn TenantStore>,
        pool: Arc<P>,
    ) -> Result<Self, TenancyError> {
        let tenancy = &config.tenancy;
        registry::verify_bootstrap(store.as_ref(), &tenancy.default_slug).await?;

        let factory = RepositoryFactory::new(&tenancy.entities)?;
        let shared_schema = Identifier::parse(&tenancy.shared_schema)?;
        let scopes = ScopeManager::new(
            pool,
            Arc::new(factory),
            shared_schema,
            config.database.acquire_timeout(),
        );
        let directory = TenantDirectory::new(store, config.directory.cache_ttl());

        Ok(Self::new(
            TenantResolver::new(tenancy.default_slug.clone()),
            Arc::new(directory),
            scopes,
            tenancy.allow_default_fallback,
        ))
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Resolution {
        self.resolver.resolve_from_headers(headers)
    }

    /// Look up the resolved tenant. Only the absence of any signal may land
    /// on the default tenant, and only when the fallback policy allows it.
    pub async fn tenant_for(&self, resolution: &Resolution) -> Result<Arc<TenantInfo>, TenancyError> {
        if resolution.source == ResolutionSource::Default && !self.allow_default_fallback {
            return Err(TenancyError::TenantRequired);
        }
        let tenant = self.directory.find_by_slug(&resolution.slug).await?;
        debug!(slug = %tenant.slug, source = ?resolution.source, "Resolved tenant");
        Ok(tenant)
    }

    /// Resolve, look up and bind in one call
    pub async fn open_scope(&self, headers: &HeaderMap) -> Result<RequestScope<P>, TenancyError> {
        let resolution = self.resolve(headers);
        let tenant = self.tenant_for(&resolution).await?;
        self.scopes.open(tenant).await
    }

    pub fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    pub fn scopes(&self) -> &ScopeManager<P> {
        &self.scopes
    }
}
