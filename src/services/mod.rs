pub mod tenant_directory;
pub mod tenant_resolver;

pub use tenant_directory::TenantDirectory;
pub use tenant_resolver::{Resolution, ResolutionSource, TenantResolver};
