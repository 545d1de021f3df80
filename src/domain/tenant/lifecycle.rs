use std::sync::Arc;
use std::time::Instant;

use crate::db::TenantRepository;
use crate::messaging::{MessageHandler, QueueClient};
use crate::metrics::Metrics;
use crate::models::{queue_name, NewTenant, Tenant};

use super::errors::TenantError;

// ============================================================================
// Tenant Lifecycle
// ============================================================================
//
// Orchestrates: repository write → queue side-effect → compensation on failure
//
// A tenant goes absent → active → deleted. Creation inserts the row first and
// undoes it (soft delete, then queue delete) if the broker side fails.
// Compensation is best-effort and never retried; if a compensating step fails,
// its error replaces the one that triggered it.
//
// ============================================================================

pub struct TenantLifecycle {
    repo: Arc<dyn TenantRepository>,
    queues: Arc<dyn QueueClient>,
    metrics: Arc<Metrics>,
}

impl TenantLifecycle {
    pub fn new(repo: Arc<dyn TenantRepository>, queues: Arc<dyn QueueClient>, metrics: Arc<Metrics>) -> Self {
        Self { repo, queues, metrics }
    }

    /// Create a tenant together with its queue and consumer.
    pub async fn create_tenant(&self, name: &str) -> Result<Tenant, TenantError> {
        let started = Instant::now();
        let result = self.provision(name).await;
        self.metrics
            .observe_operation("create_tenant", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    /// Soft-delete the tenant, then remove its queue.
    ///
    /// A queue deletion failure is returned even though the row is already
    /// marked deleted; the two are left inconsistent.
    pub async fn delete_tenant(&self, client_id: &str) -> Result<(), TenantError> {
        let started = Instant::now();
        let result = self.teardown(client_id).await;
        self.metrics
            .observe_operation("delete_tenant", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    /// Publish `payload` verbatim to the queue of a live tenant.
    pub async fn process_payload(&self, client_id: &str, payload: &serde_json::Value) -> Result<(), TenantError> {
        let started = Instant::now();
        let result = self.route(client_id, payload).await;
        self.metrics
            .observe_operation("process_payload", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    pub async fn get_tenant(&self, client_id: &str) -> Result<Tenant, TenantError> {
        let context = format!("get_tenant({:?})", client_id);
        self.repo
            .get_tenant_by_client_id(client_id)
            .await
            .map_err(|e| TenantError::repository(&context, client_id, e))
    }

    async fn provision(&self, name: &str) -> Result<Tenant, TenantError> {
        let context = format!("create_tenant({:?})", name);
        if name.trim().is_empty() {
            return Err(TenantError::InvalidArgument("name is required".to_string()));
        }

        let new_tenant = NewTenant::generate(name);
        let tenant = self
            .repo
            .create_tenant(&new_tenant)
            .await
            .map_err(|e| TenantError::repository(&context, &new_tenant.client_id, e))?;

        let queue = queue_name(&tenant.client_id);

        if let Err(e) = self.queues.create_queue(&queue).await {
            tracing::warn!(
                client_id = %tenant.client_id,
                queue = %queue,
                error = %e,
                "Queue declaration failed, rolling back tenant"
            );
            self.rollback_record(&context, &tenant.client_id).await?;
            return Err(TenantError::broker(&context, e));
        }

        let handler = tenant_message_handler(tenant.client_id.clone());
        if let Err(e) = self.queues.start_queue(&queue, handler).await {
            tracing::warn!(
                client_id = %tenant.client_id,
                queue = %queue,
                error = %e,
                "Consumer start failed, rolling back tenant and queue"
            );
            self.rollback_record(&context, &tenant.client_id).await?;
            self.rollback_queue(&context, &queue).await?;
            return Err(TenantError::broker(&context, e));
        }

        tracing::info!(
            id = tenant.id,
            client_id = %tenant.client_id,
            name = %tenant.name,
            queue = %queue,
            "Tenant created"
        );
        Ok(tenant)
    }

    async fn teardown(&self, client_id: &str) -> Result<(), TenantError> {
        let context = format!("delete_tenant({:?})", client_id);
        if client_id.is_empty() {
            return Err(TenantError::InvalidArgument("client_id is required".to_string()));
        }

        self.repo
            .soft_delete_tenant(client_id)
            .await
            .map_err(|e| TenantError::repository(&context, client_id, e))?;

        let queue = queue_name(client_id);
        self.queues
            .delete_queue(&queue)
            .await
            .map_err(|e| TenantError::broker(&context, e))?;

        tracing::info!(client_id = %client_id, queue = %queue, "Tenant deleted");
        Ok(())
    }

    async fn route(&self, client_id: &str, payload: &serde_json::Value) -> Result<(), TenantError> {
        let context = format!("process_payload({:?})", client_id);
        if client_id.is_empty() {
            return Err(TenantError::InvalidArgument("client_id is required".to_string()));
        }

        let tenant = self
            .repo
            .get_tenant_by_client_id(client_id)
            .await
            .map_err(|e| TenantError::repository(&context, client_id, e))?;

        let queue = queue_name(client_id);
        self.queues
            .publish(&queue, payload)
            .await
            .map_err(|source| TenantError::Publish {
                context: context.clone(),
                queue: queue.clone(),
                tenant: tenant.name.clone(),
                source,
            })?;

        tracing::info!(
            client_id = %client_id,
            queue = %queue,
            tenant = %tenant.name,
            "Payload published"
        );
        Ok(())
    }

    async fn rollback_record(&self, context: &str, client_id: &str) -> Result<(), TenantError> {
        let result = self.repo.soft_delete_tenant(client_id).await;
        self.metrics.record_compensation("soft_delete_tenant", result.is_ok());

        result.map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Rollback of tenant record failed");
            TenantError::repository(&format!("{}: rollback", context), client_id, e)
        })
    }

    async fn rollback_queue(&self, context: &str, queue: &str) -> Result<(), TenantError> {
        let result = self.queues.delete_queue(queue).await;
        self.metrics.record_compensation("delete_queue", result.is_ok());

        result.map_err(|e| {
            tracing::error!(queue = %queue, error = %e, "Rollback of tenant queue failed");
            TenantError::broker(&format!("{}: rollback", context), e)
        })
    }
}

/// Consumer callback for a tenant queue. Messages are already acknowledged
/// when this runs.
fn tenant_message_handler(client_id: String) -> MessageHandler {
    Arc::new(move |message: String| {
        tracing::info!(client_id = %client_id, message = %message, "Processing message for tenant");
    })
}
