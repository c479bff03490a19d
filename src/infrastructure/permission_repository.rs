use crate::domain::permission::{Permission, PermissionCategory};
use crate::infrastructure::{PermissionRepository, RepoResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, instrument};

const PERMISSION_COLUMNS: &str =
    "id, name, description, category, is_active, created_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct PermissionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = sqlx::Error;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse::<PermissionCategory>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        Ok(Permission {
            id: row.id,
            name: row.name,
            description: row.description,
            category,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PostgresPermissionRepository {
    pub pool: PgPool,
}

impl PostgresPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for PostgresPermissionRepository {
    #[instrument(skip(self, permission), fields(permission = %permission.name))]
    async fn create_permission(&self, permission: &Permission) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO permissions (id, name, description, category, is_active, created_by, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&permission.id)
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.category.as_str())
        .bind(permission.is_active)
        .bind(&permission.created_by)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create permission");
            e
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_permission(&self, permission_id: &str) -> RepoResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Permission::try_from)
        .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(Permission::try_from)
        .transpose()
    }

    #[instrument(skip(self))]
    async fn list_permissions(&self) -> RepoResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list permissions");
            e
        })?;
        rows.into_iter().map(Permission::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn delete_permission(&self, permission_id: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete permission");
                e
            })?;
        tx.commit().await
    }
}
