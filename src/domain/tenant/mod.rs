// ============================================================================
// Tenant Domain - lifecycle of a tenant and its dedicated queue
// ============================================================================
//
// - Errors (TenantError, ErrorKind)
// - Lifecycle (TenantLifecycle: create / delete / process payload / get)
//
// Persistence and broker access stay behind the repository and queue client
// traits; this module only sequences them.
//
// ============================================================================

pub mod errors;
pub mod lifecycle;

pub use errors::*;
pub use lifecycle::*;
