//! In-memory stand-ins for the registry and the connection pool.
//!
//! `MemoryPool` models what matters to scope tests: a bounded number of
//! sessions, each carrying its own search path that survives being returned
//! to the pool, and table lookup that follows that search path.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::database::connection::{SchemaConnection, ScopePool};
use crate::database::identifier::{Identifier, SearchPath};
use crate::database::manager::DatabaseError;
use crate::database::models::tenant::{TenantInfo, TenantRecord, TenantSummary};
use crate::database::registry::TenantStore;

type Tables = HashMap<String, Vec<Value>>;

/// Server-side session state of one pooled connection
#[derive(Debug, Clone)]
pub struct Session {
    pub id: usize,
    pub search_path: Vec<String>,
}

struct PoolInner {
    schemas: Mutex<HashMap<String, Tables>>,
    idle: Mutex<Vec<Session>>,
    permits: Arc<Semaphore>,
    checked_out: AtomicUsize,
    retired: AtomicUsize,
    opened: AtomicUsize,
    fail_resets: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                schemas: Mutex::new(HashMap::new()),
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(max_connections)),
                checked_out: AtomicUsize::new(0),
                retired: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                fail_resets: AtomicBool::new(false),
            }),
        }
    }

    /// Create the schema if needed and replace the table's rows
    pub fn add_table(&self, schema: &str, table: &str, rows: Vec<Value>) {
        let mut schemas = self.inner.schemas.lock().unwrap();
        schemas
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), rows);
    }

    pub fn fail_resets(&self, fail: bool) {
        self.inner.fail_resets.store(fail, Ordering::SeqCst);
    }

    pub fn retired(&self) -> usize {
        self.inner.retired.load(Ordering::SeqCst)
    }

    /// Sessions ever created
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn idle_sessions(&self) -> Vec<Session> {
        self.inner.idle.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScopePool for MemoryPool {
    type Conn = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection, DatabaseError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| DatabaseError::PoolClosed)?;

        // Most recently returned session first, like a LIFO idle queue
        let session = self.inner.idle.lock().unwrap().pop().unwrap_or_else(|| Session {
            id: self.inner.opened.fetch_add(1, Ordering::SeqCst),
            search_path: Vec::new(),
        });
        self.inner.checked_out.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryConnection {
            session: Some(session),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    fn retire(&self, mut conn: MemoryConnection) {
        if conn.session.take().is_some() {
            self.inner.retired.fetch_add(1, Ordering::SeqCst);
            self.inner.checked_out.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn checked_out(&self) -> usize {
        self.inner.checked_out.load(Ordering::SeqCst)
    }
}

/// Checked-out session. Dropping it returns the session to the idle list
/// unchanged, search path included, just like a plain pool would.
pub struct MemoryConnection {
    session: Option<Session>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    pub fn session_id(&self) -> usize {
        self.session.as_ref().map(|s| s.id).unwrap_or_default()
    }

    pub fn search_path(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.search_path.clone())
            .unwrap_or_default()
    }

    fn with_table<T>(
        &self,
        table: &Identifier,
        f: impl FnOnce(&[Value]) -> T,
    ) -> Result<T, DatabaseError> {
        let schemas = self.inner.schemas.lock().unwrap();
        self.search_path()
            .iter()
            .find_map(|schema| schemas.get(schema).and_then(|tables| tables.get(table.as_str())))
            .map(|rows| f(rows))
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.inner.idle.lock().unwrap().push(session);
            self.inner.checked_out.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SchemaConnection for MemoryConnection {
    async fn set_search_path(&mut self, path: &SearchPath) -> Result<(), DatabaseError> {
        let names: Vec<String> = {
            let schemas = self.inner.schemas.lock().unwrap();
            if let Some(missing) = path.schemas().into_iter().find(|s| !schemas.contains_key(s.as_str())) {
                return Err(DatabaseError::UnknownSchema(missing.to_string()));
            }
            path.schemas().iter().map(|s| s.to_string()).collect()
        };
        if let Some(session) = self.session.as_mut() {
            session.search_path = names;
        }
        Ok(())
    }

    async fn reset_search_path(&mut self) -> Result<(), DatabaseError> {
        if self.inner.fail_resets.load(Ordering::SeqCst) {
            return Err(DatabaseError::Sqlx(sqlx::Error::Protocol(
                "connection reset by peer".to_string(),
            )));
        }
        if let Some(session) = self.session.as_mut() {
            session.search_path.clear();
        }
        Ok(())
    }

    async fn select_rows(
        &mut self,
        table: &Identifier,
        ids: Option<&[String]>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, DatabaseError> {
        self.with_table(table, |rows| {
            rows.iter()
                .filter(|row| match ids {
                    None => true,
                    Some(ids) => row
                        .get("id")
                        .and_then(Value::as_str)
                        .map(|id| ids.iter().any(|wanted| wanted == id))
                        .unwrap_or(false),
                })
                .take(limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX))
                .cloned()
                .collect()
        })
    }

    async fn count_rows(&mut self, table: &Identifier) -> Result<i64, DatabaseError> {
        self.with_table(table, |rows| rows.len() as i64)
    }
}

/// Registry held in memory, counting lookups so cache behaviour is visible
#[derive(Default)]
pub struct MemoryTenantStore {
    records: RwLock<HashMap<String, TenantRecord>>,
    lookups: AtomicUsize,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, slug: &str, schema_name: &str, name: &str) -> TenantRecord {
        let record = TenantRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            schema_name: schema_name.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            settings: None,
        };
        self.records
            .write()
            .unwrap()
            .insert(slug.to_string(), record.clone());
        record
    }

    pub fn remove(&self, slug: &str) {
        self.records.write().unwrap().remove(slug);
    }

    pub fn update_settings(&self, slug: &str, settings: Value) {
        if let Some(record) = self.records.write().unwrap().get_mut(slug) {
            record.settings = Some(settings);
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, DatabaseError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.read().unwrap().get(slug).cloned())
    }

    async fn list_active(&self) -> Result<Vec<TenantSummary>, DatabaseError> {
        let mut tenants: Vec<TenantSummary> = self
            .records
            .read()
            .unwrap()
            .values()
            .map(|r| TenantSummary {
                slug: r.slug.clone(),
                name: r.name.clone(),
            })
            .collect();
        tenants.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.slug.cmp(&b.slug)));
        Ok(tenants)
    }

    async fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self.records.read().unwrap().len() as i64)
    }
}

pub fn tenant_info(slug: &str, schema_name: &str) -> Arc<TenantInfo> {
    Arc::new(TenantInfo {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        schema_name: schema_name.to_string(),
        name: slug.to_uppercase(),
        settings: Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returned_sessions_keep_their_state() {
        let pool = MemoryPool::new(1);
        pool.add_table("tenant_a", "accounts", vec![]);
        pool.add_table("public", "tenants", vec![]);

        let mut conn = pool.acquire().await.unwrap();
        let path = SearchPath::new(
            Identifier::parse("tenant_a").unwrap(),
            Identifier::parse("public").unwrap(),
        );
        conn.set_search_path(&path).await.unwrap();
        drop(conn);

        // Without a reset the next borrower inherits the previous binding
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.search_path(), vec!["tenant_a", "public"]);
        assert_eq!(pool.checked_out(), 1);
    }

    #[tokio::test]
    async fn unknown_schema_is_rejected() {
        let pool = MemoryPool::new(1);
        pool.add_table("public", "tenants", vec![]);
        let mut conn = pool.acquire().await.unwrap();
        let path = SearchPath::new(
            Identifier::parse("tenant_missing").unwrap(),
            Identifier::parse("public").unwrap(),
        );
        assert!(matches!(
            conn.set_search_path(&path).await,
            Err(DatabaseError::UnknownSchema(s)) if s == "tenant_missing"
        ));
        assert!(conn.search_path().is_empty());
    }
}
