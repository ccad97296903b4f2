use axum::extract::{Path, Query};
use serde::Deserialize;
use serde_json::Value;

use crate::database::connection::ScopePool;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, TenantScope};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// GET /api/data/:entity - Records of one entity kind in the tenant's schema
pub async fn entity_list<P: ScopePool>(
    Path(entity): Path<String>,
    Query(query): Query<ListQuery>,
    TenantScope(mut scope): TenantScope<P>,
) -> ApiResult<Vec<Value>> {
    if matches!(query.limit, Some(limit) if limit < 0) {
        scope.release().await;
        return Err(ApiError::bad_request("limit must not be negative"));
    }
    let records = async { scope.repository(&entity)?.select_all(query.limit).await }.await;
    scope.release().await;
    Ok(ApiResponse::success(records?))
}

/// GET /api/data/:entity/:id - One record, 404 when absent
pub async fn record_get<P: ScopePool>(
    Path((entity, id)): Path<(String, String)>,
    TenantScope(mut scope): TenantScope<P>,
) -> ApiResult<Value> {
    let record = async { scope.repository(&entity)?.select_404(&id).await }.await;
    scope.release().await;
    Ok(ApiResponse::success(record?))
}
