use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::database::connection::ScopePool;
use crate::database::models::tenant::TenantInfo;
use crate::error::ApiError;
use crate::services::tenant_resolver::ResolutionSource;

/// Tenant resolved for the current request, injected by middleware
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub tenant: Arc<TenantInfo>,
    pub source: ResolutionSource,
}

/// Resolves the tenant from request headers and checks it against the
/// registry. No connection is taken here; unknown tenants are rejected
/// before the pool is touched.
pub async fn resolve_tenant_middleware<P: ScopePool>(
    State(state): State<AppState<P>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let resolution = state.tenancy.resolve(request.headers());
    let tenant = state.tenancy.tenant_for(&resolution).await.map_err(|e| {
        tracing::warn!(slug = %resolution.slug, source = ?resolution.source, "Tenant rejected: {}", e);
        ApiError::from(e)
    })?;

    tracing::debug!("Tenant resolved: {} via {:?}", tenant.slug, resolution.source);

    request.extensions_mut().insert(TenantContext {
        tenant,
        source: resolution.source,
    });

    Ok(next.run(request).await)
}
