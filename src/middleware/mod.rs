pub mod response;
pub mod scope;
pub mod tenant;

pub use response::{ApiResponse, ApiResult};
pub use scope::TenantScope;
pub use tenant::{resolve_tenant_middleware, TenantContext};
