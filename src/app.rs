use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::database::connection::ScopePool;
use crate::handlers;
use crate::middleware::resolve_tenant_middleware;
use crate::tenancy::Tenancy;

/// Shared state handed to every handler
pub struct AppState<P: ScopePool> {
    pub tenancy: Arc<Tenancy<P>>,
}

impl<P: ScopePool> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            tenancy: Arc::clone(&self.tenancy),
        }
    }
}

impl<P: ScopePool> AppState<P> {
    pub fn new(tenancy: Tenancy<P>) -> Self {
        Self {
            tenancy: Arc::new(tenancy),
        }
    }
}

pub fn app<P: ScopePool>(state: AppState<P>) -> Router {
    Router::new()
        // Public
        .route("/health", get(handlers::public::health::<P>))
        .route("/api/tenants", get(handlers::public::tenants_list::<P>))
        // Tenant-scoped
        .merge(tenant_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn tenant_routes<P: ScopePool>(state: AppState<P>) -> Router<AppState<P>> {
    use handlers::{data, tenant};

    Router::new()
        .route("/api/tenant", get(tenant::tenant_show))
        .route("/api/tenant/summary", get(tenant::tenant_summary::<P>))
        .route("/api/data/:entity", get(data::entity_list::<P>))
        .route("/api/data/:entity/:id", get(data::record_get::<P>))
        .route_layer(middleware::from_fn_with_state(state, resolve_tenant_middleware::<P>))
}
