use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::scope::ScopeState;

/// Failures surfaced by tenant resolution, lookup and scope lifecycle
#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Tenant not found: {slug}")]
    TenantNotFound { slug: String },

    #[error("Tenant '{slug}' is misconfigured: schema '{schema}' cannot be activated: {source}")]
    TenantMisconfigured {
        slug: String,
        schema: String,
        #[source]
        source: DatabaseError,
    },

    #[error("No connection available for tenant '{slug}' within {timeout_ms}ms")]
    ResourceUnavailable { slug: String, timeout_ms: u64 },

    #[error("Scope for tenant '{slug}' is not bound (state: {state:?})")]
    ScopeNotReady { slug: String, state: ScopeState },

    #[error("Scope for tenant '{slug}' has already been released")]
    ScopeClosed { slug: String },

    #[error("Entity kind is not registered: {entity}")]
    UnknownEntity { entity: String },

    #[error("Tenant registry is empty")]
    RegistryEmpty,

    #[error("Default tenant '{slug}' is missing from the registry")]
    DefaultTenantMissing { slug: String },

    #[error("Request carries no tenant identification")]
    TenantRequired,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl TenancyError {
    /// Transient conditions a caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, TenancyError::ResourceUnavailable { .. })
    }

    /// Defects in integration code rather than runtime conditions
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            TenancyError::ScopeNotReady { .. }
                | TenancyError::ScopeClosed { .. }
                | TenancyError::UnknownEntity { .. }
        )
    }
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::TenantNotFound { slug } => {
                ApiError::not_found(format!("Tenant '{}' does not exist", slug))
            }
            TenancyError::TenantRequired => {
                ApiError::bad_request("Tenant identification is required")
            }
            TenancyError::ResourceUnavailable { .. } => {
                tracing::warn!("{}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            TenancyError::UnknownEntity { entity } => {
                ApiError::not_found(format!("Entity '{}' is not available", entity))
            }
            TenancyError::Database(DatabaseError::NotFound(message)) => ApiError::not_found(message),
            TenancyError::TenantMisconfigured { .. } => {
                // Already logged at the scope boundary with full context
                ApiError::internal_server_error("Tenant is not available")
            }
            other => {
                // Don't expose internal details to clients
                tracing::error!("Tenancy error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        TenancyError::from(err).into()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
