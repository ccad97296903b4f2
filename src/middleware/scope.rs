use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use super::tenant::TenantContext;
use crate::app::AppState;
use crate::database::connection::ScopePool;
use crate::error::ApiError;
use crate::scope::RequestScope;

/// Bound request scope for the tenant chosen by `resolve_tenant_middleware`.
///
/// Handlers should call `release()` before responding; a scope dropped while
/// still bound retires its connection instead of returning it.
pub struct TenantScope<P: ScopePool>(pub RequestScope<P>);

#[async_trait]
impl<P: ScopePool> FromRequestParts<AppState<P>> for TenantScope<P> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState<P>) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| ApiError::internal_server_error("Tenant resolution must run before opening a scope"))?;

        let scope = state.tenancy.scopes().open(context.tenant).await?;
        Ok(TenantScope(scope))
    }
}
