use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::models::{NewTenant, Tenant};

use super::{RepositoryError, TenantRepository};

/// Postgres-backed tenant repository.
///
/// Concurrent callers are serialized by the database; the unique index on
/// `client_id` is the only uniqueness guarantee.
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_url())
            .await?;

        tracing::info!(host = %config.host, dbname = %config.dbname, "Connected to postgres");
        Ok(Self { pool })
    }

    /// Create the tenants table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id          BIGSERIAL PRIMARY KEY,
                client_id   TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL,
                deleted_at  TIMESTAMPTZ NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, sqlx::Error> {
    Ok(Tenant {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, RepositoryError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO tenants (client_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, client_id, name, created_at, updated_at, deleted_at
            "#,
        )
        .bind(&tenant.client_id)
        .bind(&tenant.name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant_from_row(&row)?)
    }

    async fn soft_delete_tenant(&self, client_id: &str) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET deleted_at = $1, updated_at = $2
            WHERE client_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_tenant_by_client_id(&self, client_id: &str) -> Result<Tenant, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, client_id, name, created_at, updated_at, deleted_at
            FROM tenants
            WHERE client_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(tenant_from_row(&row)?)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
