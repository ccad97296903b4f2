use serde_json::Value;
use std::collections::BTreeMap;

use crate::database::connection::{SchemaConnection, ScopePool};
use crate::database::identifier::Identifier;
use crate::database::manager::DatabaseError;
use crate::error::TenancyError;
use crate::scope::RequestScope;

/// Fixed set of tenant-scoped entity kinds, registered once at startup.
/// Hands out repositories over a bound scope's connection.
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    entities: BTreeMap<String, Identifier>,
}

impl RepositoryFactory {
    /// Every entity name doubles as its table name and must be a valid
    /// identifier.
    pub fn new<I, S>(entities: I) -> Result<Self, DatabaseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entities = entities
            .into_iter()
            .map(|name| {
                let table = Identifier::parse(name.as_ref())?;
                Ok((name.as_ref().to_string(), table))
            })
            .collect::<Result<BTreeMap<_, _>, DatabaseError>>()?;
        Ok(Self { entities })
    }

    /// Registered entity kinds, sorted
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn is_registered(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn repository<'s, P: ScopePool>(
        &self,
        scope: &'s mut RequestScope<P>,
        entity: &str,
    ) -> Result<Repository<'s, P::Conn>, TenancyError> {
        // Lifecycle violations take precedence over an unknown kind
        let conn = scope.connection()?;
        let table = self
            .entities
            .get(entity)
            .cloned()
            .ok_or_else(|| TenancyError::UnknownEntity {
                entity: entity.to_string(),
            })?;
        Ok(Repository { table, conn })
    }
}

/// Handle over one entity table, resolved through the scope's search path.
/// Borrows the scope's connection for as long as it lives.
pub struct Repository<'s, C: SchemaConnection> {
    table: Identifier,
    conn: &'s mut C,
}

impl<'s, C: SchemaConnection> Repository<'s, C> {
    pub fn table(&self) -> &str {
        self.table.as_str()
    }

    /// Negative limits are treated as zero
    pub async fn select_all(&mut self, limit: Option<i64>) -> Result<Vec<Value>, TenancyError> {
        let limit = limit.map(|l| l.max(0));
        Ok(self.conn.select_rows(&self.table, None, limit).await?)
    }

    pub async fn select_one(&mut self, id: &str) -> Result<Option<Value>, TenancyError> {
        let ids = [id.to_string()];
        let mut rows = self.conn.select_rows(&self.table, Some(&ids[..]), Some(1)).await?;
        Ok(rows.pop())
    }

    pub async fn select_404(&mut self, id: &str) -> Result<Value, TenancyError> {
        self.select_one(id).await?.ok_or_else(|| {
            DatabaseError::NotFound(format!("{} record '{}' not found", self.table, id)).into()
        })
    }

    pub async fn select_ids(&mut self, ids: &[String]) -> Result<Vec<Value>, TenancyError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.conn.select_rows(&self.table, Some(ids), None).await?)
    }

    pub async fn count(&mut self) -> Result<i64, TenancyError> {
        Ok(self.conn.count_rows(&self.table).await?)
    }

    /// The bound connection, for typed queries owned by the caller
    pub fn connection(&mut self) -> &mut C {
        &mut *self.conn
    }
}
