use std::fmt;

use crate::database::manager::DatabaseError;

/// PostgreSQL's NAMEDATALEN - 1
const MAX_IDENTIFIER_LEN: usize = 63;

/// A schema or table name that is safe to interpolate into SQL.
///
/// Only lowercase ASCII letters, digits and underscores are accepted, starting
/// with a letter or underscore, and never the reserved `pg_` prefix. Values
/// come from the tenant registry or startup configuration, never from request
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(name: &str) -> Result<Self, DatabaseError> {
        if Self::is_valid(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(DatabaseError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for SQL text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }

    fn is_valid(name: &str) -> bool {
        if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN || name.starts_with("pg_") {
            return false;
        }
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_lowercase() || c == '_')
            .unwrap_or(false);
        first_ok && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered schema list applied to a bound connection: the tenant schema first,
/// then the shared namespace holding cross-tenant tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    tenant: Identifier,
    shared: Identifier,
}

impl SearchPath {
    pub fn new(tenant: Identifier, shared: Identifier) -> Self {
        Self { tenant, shared }
    }

    /// Schemas in lookup order, without duplicates
    pub fn schemas(&self) -> Vec<&Identifier> {
        if self.tenant == self.shared {
            vec![&self.tenant]
        } else {
            vec![&self.tenant, &self.shared]
        }
    }

    /// `SET search_path` statement for this path
    pub fn to_set_statement(&self) -> String {
        let list = self
            .schemas()
            .iter()
            .map(|s| s.quoted())
            .collect::<Vec<_>>()
            .join(", ");
        format!("SET search_path TO {}", list)
    }
}
