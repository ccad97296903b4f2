use axum::extract::{Extension, State};
use serde_json::{json, Map, Value};

use crate::app::AppState;
use crate::database::connection::ScopePool;
use crate::database::manager::DatabaseError;
use crate::error::TenancyError;
use crate::middleware::{ApiResponse, ApiResult, TenantContext, TenantScope};

/// GET /api/tenant - The tenant this request resolved to
pub async fn tenant_show(Extension(context): Extension<TenantContext>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "tenant": context.tenant.as_ref(),
        "resolved_by": context.source,
    })))
}

/// GET /api/tenant/summary - Row counts per registered entity kind.
/// Tables the tenant has not provisioned report `null`.
pub async fn tenant_summary<P: ScopePool>(
    State(state): State<AppState<P>>,
    TenantScope(mut scope): TenantScope<P>,
) -> ApiResult<Value> {
    let entities: Vec<String> = state.tenancy.scopes().factory().entities().map(String::from).collect();

    let counts = async {
        let mut counts = Map::new();
        for entity in &entities {
            let count = match scope.repository(entity)?.count().await {
                Ok(count) => json!(count),
                Err(TenancyError::Database(DatabaseError::UnknownTable(_))) => Value::Null,
                Err(e) => return Err(e),
            };
            counts.insert(entity.clone(), count);
        }
        Ok::<_, TenancyError>(counts)
    }
    .await;

    let slug = scope.tenant().slug.clone();
    scope.release().await;

    Ok(ApiResponse::success(json!({
        "tenant": slug,
        "entities": counts?,
    })))
}
