use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::app::AppState;
use crate::database::connection::ScopePool;
use crate::database::models::tenant::TenantSummary;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /health - Registry reachability and pool usage
pub async fn health<P: ScopePool>(State(state): State<AppState<P>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let checked_out = state.tenancy.scopes().checked_out();

    match state.tenancy.directory().store().count().await {
        Ok(tenants) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "tenants": tenants,
                    "connections_in_use": checked_out
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string(),
                    "connections_in_use": checked_out
                }
            })),
        ),
    }
}

/// GET /api/tenants - Tenants for a selection list, by name
pub async fn tenants_list<P: ScopePool>(State(state): State<AppState<P>>) -> ApiResult<Vec<TenantSummary>> {
    let tenants = state.tenancy.directory().list_active().await?;
    Ok(ApiResponse::success(tenants))
}
