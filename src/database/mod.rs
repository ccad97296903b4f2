pub mod connection;
pub mod identifier;
pub mod manager;
pub mod models;
pub mod registry;
pub mod repository;

pub use connection::{PgScopePool, SchemaConnection, ScopePool};
pub use identifier::{Identifier, SearchPath};
pub use manager::{DatabaseError, DatabaseManager};
pub use registry::{PgTenantRegistry, TenantStore};
pub use repository::{Repository, RepositoryFactory};
