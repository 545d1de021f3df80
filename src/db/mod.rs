// ============================================================================
// Tenant Repository
// ============================================================================
//
// Persistence boundary for tenant records. Soft-deleted rows are invisible
// to every lookup; nothing here ever removes a row physically.
//
// ============================================================================

mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::models::{NewTenant, Tenant};

pub use postgres::PgTenantRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("tenant not found or already deleted")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Insert a tenant and return the stored row with its assigned id.
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, RepositoryError>;

    /// Mark the tenant deleted. Fails `NotFound` when no live row matches.
    async fn soft_delete_tenant(&self, client_id: &str) -> Result<(), RepositoryError>;

    /// Fetch a live tenant. Fails `NotFound` when absent or soft-deleted.
    async fn get_tenant_by_client_id(&self, client_id: &str) -> Result<Tenant, RepositoryError>;

    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
