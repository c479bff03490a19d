use crate::domain::role::Role;
use crate::infrastructure::RepoResult;
use crate::infrastructure::RoleRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::{error, instrument};

const ROLE_COLUMNS: &str =
    "id, name, description, parent_role_id, level, created_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RoleRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_role_id: Option<String>,
    pub level: i32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    pub role_id: String,
    pub permission_id: String,
}

impl RoleRow {
    fn into_role(self, permissions: HashSet<String>) -> RepoResult<Role> {
        let level = u32::try_from(self.level).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Role {
            id: self.id,
            name: self.name,
            description: self.description,
            permissions,
            parent_role_id: self.parent_role_id,
            level,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn level_column(role: &Role) -> RepoResult<i32> {
    i32::try_from(role.level).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

#[derive(Debug, Clone)]
pub struct PostgresRoleRepository {
    pub pool: PgPool,
}

impl PostgresRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches `role_permissions` rows to the given role rows.
    async fn hydrate(&self, rows: Vec<RoleRow>) -> RepoResult<Vec<Role>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let links = sqlx::query_as::<_, RolePermissionRow>(
            "SELECT role_id, permission_id FROM role_permissions WHERE role_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_role: HashMap<String, HashSet<String>> = HashMap::new();
        for link in links {
            by_role
                .entry(link.role_id)
                .or_default()
                .insert(link.permission_id);
        }
        rows.into_iter()
            .map(|row| {
                let permissions = by_role.remove(&row.id).unwrap_or_default();
                row.into_role(permissions)
            })
            .collect()
    }

    async fn replace_permissions(
        tx: &mut Transaction<'_, Postgres>,
        role: &Role,
    ) -> RepoResult<()> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(&role.id)
            .execute(&mut **tx)
            .await?;
        for permission_id in &role.permissions {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(&role.id)
            .bind(permission_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    #[instrument(skip(self, role), fields(role_id = %role.id))]
    async fn create_role(&self, role: &Role) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO roles (id, name, description, parent_role_id, level, created_by, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.parent_role_id)
        .bind(level_column(role)?)
        .bind(&role.created_by)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create role");
            e
        })?;
        Self::replace_permissions(&mut tx, role).await?;
        tx.commit().await
    }

    #[instrument(skip(self))]
    async fn get_role(&self, role_id: &str) -> RepoResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_children(&self, parent_id: &str) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE parent_role_id = $1"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn list_roles(&self) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY level, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list roles");
            e
        })?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn count_roles(&self) -> RepoResult<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    #[instrument(skip(self, role), fields(role_id = %role.id))]
    async fn save_role(&self, role: &Role) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, parent_role_id = $4, level = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.parent_role_id)
        .bind(level_column(role)?)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to save role");
            e
        })?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Self::replace_permissions(&mut tx, role).await?;
        tx.commit().await
    }

    #[instrument(skip(self))]
    async fn delete_role(&self, role_id: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to delete role");
                e
            })?;
        tx.commit().await
    }

    #[instrument(skip(self))]
    async fn assign_role(&self, user_id: &str, role_id: &str) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_role(&self, user_id: &str, role_id: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_roles_for_user(&self, user_id: &str) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT r.id, r.name, r.description, r.parent_role_id, r.level,
                   r.created_by, r.created_at, r.updated_at
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn count_users_with_role(&self, role_id: &str) -> RepoResult<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
                .bind(role_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn remove_permission_from_all_roles(&self, permission_id: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(permission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryRoleRepository;

    fn role(name: &str) -> Role {
        Role::new(name.to_string(), format!("{name} role"), None)
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_create_role() {
        let repo = InMemoryRoleRepository::new();

        let admin = role("admin");
        repo.create_role(&admin).await.unwrap();

        let stored = repo.get_role(&admin.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "admin");
        assert!(stored.permissions.is_empty());
        assert!(stored.parent_role_id.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_rejects_duplicate_name() {
        let repo = InMemoryRoleRepository::new();

        repo.create_role(&role("admin")).await.unwrap();
        assert!(repo.create_role(&role("admin")).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_list_roles() {
        let repo = InMemoryRoleRepository::new();

        assert!(repo.list_roles().await.unwrap().is_empty());

        repo.create_role(&role("admin")).await.unwrap();
        repo.create_role(&role("user")).await.unwrap();

        let roles = repo.list_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(repo.count_roles().await.unwrap(), 2);
        assert!(roles.iter().any(|r| r.name == "admin"));
        assert!(roles.iter().any(|r| r.name == "user"));
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_find_children() {
        let repo = InMemoryRoleRepository::new();

        let parent = role("parent");
        let mut child = role("child");
        child.parent_role_id = Some(parent.id.clone());
        child.level = 1;
        repo.create_role(&parent).await.unwrap();
        repo.create_role(&child).await.unwrap();
        repo.create_role(&role("other")).await.unwrap();

        let children = repo.find_children(&parent.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
        assert!(repo.find_children(&child.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_save_role() {
        let repo = InMemoryRoleRepository::new();

        let mut admin = role("admin");
        repo.create_role(&admin).await.unwrap();

        admin.description = "Updated".to_string();
        admin.add_permission("perm1".to_string());
        repo.save_role(&admin).await.unwrap();

        let stored = repo.get_role(&admin.id).await.unwrap().unwrap();
        assert_eq!(stored.description, "Updated");
        assert!(stored.permissions.contains("perm1"));
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_save_missing_role() {
        let repo = InMemoryRoleRepository::new();

        let result = repo.save_role(&role("ghost")).await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_assign_and_remove_role() {
        let repo = InMemoryRoleRepository::new();

        let admin = role("admin");
        repo.create_role(&admin).await.unwrap();

        repo.assign_role("user1", &admin.id).await.unwrap();
        repo.assign_role("user1", &admin.id).await.unwrap();

        let user_roles = repo.get_roles_for_user("user1").await.unwrap();
        assert_eq!(user_roles.len(), 1);
        assert_eq!(repo.count_users_with_role(&admin.id).await.unwrap(), 1);

        repo.remove_role("user1", &admin.id).await.unwrap();
        assert!(repo.get_roles_for_user("user1").await.unwrap().is_empty());
        assert_eq!(repo.count_users_with_role(&admin.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_get_roles_for_nonexistent_user() {
        let repo = InMemoryRoleRepository::new();

        let user_roles = repo.get_roles_for_user("nonexistent").await.unwrap();
        assert!(user_roles.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_delete_role_cleans_up_assignments() {
        let repo = InMemoryRoleRepository::new();

        let admin = role("admin");
        repo.create_role(&admin).await.unwrap();
        repo.assign_role("user1", &admin.id).await.unwrap();

        repo.delete_role(&admin.id).await.unwrap();

        assert!(repo.get_role(&admin.id).await.unwrap().is_none());
        assert!(repo.get_roles_for_user("user1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_default_implementation() {
        let repo = InMemoryRoleRepository::default();

        assert!(repo.list_roles().await.unwrap().is_empty());
        assert!(repo.find_by_name("test").await.unwrap().is_none());
    }
}
