use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::database::models::tenant::{TenantInfo, TenantSummary};
use crate::database::registry::TenantStore;
use crate::error::TenancyError;

const MAX_SLUG_LEN: usize = 63;

#[derive(Clone)]
struct CacheEntry {
    info: Arc<TenantInfo>,
    fetched_at: Instant,
}

/// Caching front for the tenant registry.
///
/// Entries are immutable `Arc<TenantInfo>` values; a refresh swaps the whole
/// entry. A zero TTL turns caching off.
pub struct TenantDirectory {
    store: Arc<dyn TenantStore>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TenantDirectory {
    pub fn new(store: Arc<dyn TenantStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Arc<TenantInfo>, TenancyError> {
        if !Self::is_valid_slug(slug) {
            return Err(TenancyError::TenantNotFound { slug: slug.to_string() });
        }

        if !self.ttl.is_zero() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(slug) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.info));
                }
            }
        }

        self.refresh(slug).await
    }

    /// Bypass the cache and re-read the registry. A tenant that has
    /// disappeared is evicted and reported as not found.
    pub async fn refresh(&self, slug: &str) -> Result<Arc<TenantInfo>, TenancyError> {
        let Some(record) = self.store.find_by_slug(slug).await? else {
            if self.entries.write().await.remove(slug).is_some() {
                debug!(slug = %slug, "Evicted tenant missing from registry");
            }
            return Err(TenancyError::TenantNotFound { slug: slug.to_string() });
        };

        let info = Arc::new(TenantInfo::from(record));
        if !self.ttl.is_zero() {
            let mut entries = self.entries.write().await;
            if let Some(previous) = entries.get(slug) {
                if previous.info.schema_name != info.schema_name {
                    error!(
                        slug = %slug,
                        cached_schema = %previous.info.schema_name,
                        registry_schema = %info.schema_name,
                        "Tenant schema name changed in registry"
                    );
                }
            }
            entries.insert(
                slug.to_string(),
                CacheEntry {
                    info: Arc::clone(&info),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(info)
    }

    /// Tenants for selection lists, ascending by name. Never cached.
    pub async fn list_active(&self) -> Result<Vec<TenantSummary>, TenancyError> {
        Ok(self.store.list_active().await?)
    }

    pub async fn invalidate(&self, slug: &str) {
        self.entries.write().await.remove(slug);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn is_valid_slug(slug: &str) -> bool {
        !slug.is_empty()
            && slug.len() <= MAX_SLUG_LEN
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }
}
