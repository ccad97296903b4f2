//! Request scope lifecycle: one pooled connection per request, bound to the
//! tenant's schema, released exactly once.

pub mod manager;

pub use manager::{RequestScope, ScopeManager};

use serde::Serialize;

/// Lifecycle of a `RequestScope`. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeState {
    Unbound,
    Acquiring,
    Bound,
    Released,
}
