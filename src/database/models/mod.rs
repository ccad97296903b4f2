pub mod tenant;

pub use tenant::{TenantInfo, TenantRecord, TenantSummary};
