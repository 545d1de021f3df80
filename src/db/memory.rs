use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::{NewTenant, Tenant};

use super::{RepositoryError, TenantRepository};

/// In-memory repository with the same visibility rules as postgres.
#[derive(Default)]
pub struct InMemoryTenantRepository {
    rows: Mutex<HashMap<String, Tenant>>,
    next_id: Mutex<i64>,
    fail_soft_delete: AtomicBool,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent soft delete fail with a database error.
    pub fn fail_soft_deletes(&self) {
        self.fail_soft_delete.store(true, Ordering::SeqCst);
    }

    /// The stored row regardless of its deletion state.
    pub fn raw(&self, client_id: &str) -> Option<Tenant> {
        self.rows.lock().unwrap().get(client_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, RepositoryError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;

        let now = Utc::now();
        let stored = Tenant {
            id: *next_id,
            client_id: tenant.client_id.clone(),
            name: tenant.name.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.rows
            .lock()
            .unwrap()
            .insert(stored.client_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn soft_delete_tenant(&self, client_id: &str) -> Result<(), RepositoryError> {
        if self.fail_soft_delete.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(client_id) {
            Some(row) if row.deleted_at.is_none() => {
                let now = Utc::now();
                row.deleted_at = Some(now);
                row.updated_at = now;
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn get_tenant_by_client_id(&self, client_id: &str) -> Result<Tenant, RepositoryError> {
        self.rows
            .lock()
            .unwrap()
            .get(client_id)
            .filter(|row| row.deleted_at.is_none())
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
