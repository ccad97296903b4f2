use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Row of the shared tenant registry table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantRecord {
    pub id: Uuid,
    pub slug: String,
    pub schema_name: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub settings: Option<Value>,
}

/// Resolved, read-only view of a tenant handed to consumers.
///
/// `schema_name` stays inside the core: it is skipped on serialization so it
/// never leaks through an API response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantInfo {
    pub id: Uuid,
    pub slug: String,
    #[serde(skip_serializing)]
    pub schema_name: String,
    pub name: String,
    pub settings: Value,
}

impl From<TenantRecord> for TenantInfo {
    fn from(record: TenantRecord) -> Self {
        Self {
            id: record.id,
            slug: record.slug,
            schema_name: record.schema_name,
            name: record.name,
            settings: record.settings.unwrap_or(Value::Null),
        }
    }
}

/// Entry of the tenant selection list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TenantSummary {
    pub slug: String,
    pub name: String,
}
