use crate::domain::permission::Permission;
use crate::domain::role::Role;
use async_trait::async_trait;
use sqlx::Error;
use tokio::sync::RwLock;
pub type RepoResult<T> = Result<T, Error>;

// Infrastructure layer: database, external services, adapters
pub mod permission_repository;
pub mod role_repository;
pub use permission_repository::PostgresPermissionRepository;
pub use role_repository::PostgresRoleRepository;

/// Role storage consumed by the hierarchy resolver and the role CRUD handlers.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts a new role record, permissions included.
    async fn create_role(&self, role: &Role) -> RepoResult<()>;
    async fn get_role(&self, role_id: &str) -> RepoResult<Option<Role>>;
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Role>>;
    /// Roles whose `parent_role_id` equals `parent_id`.
    async fn find_children(&self, parent_id: &str) -> RepoResult<Vec<Role>>;
    async fn list_roles(&self) -> RepoResult<Vec<Role>>;
    async fn count_roles(&self) -> RepoResult<usize>;
    /// Persists every mutable field of an existing role. `RowNotFound` if it is gone.
    async fn save_role(&self, role: &Role) -> RepoResult<()>;
    async fn delete_role(&self, role_id: &str) -> RepoResult<()>;
    async fn assign_role(&self, user_id: &str, role_id: &str) -> RepoResult<()>;
    async fn remove_role(&self, user_id: &str, role_id: &str) -> RepoResult<()>;
    async fn get_roles_for_user(&self, user_id: &str) -> RepoResult<Vec<Role>>;
    async fn count_users_with_role(&self, role_id: &str) -> RepoResult<u64>;
    /// Removes a permission id from every role that references it.
    async fn remove_permission_from_all_roles(&self, permission_id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn create_permission(&self, permission: &Permission) -> RepoResult<()>;
    async fn get_permission(&self, permission_id: &str) -> RepoResult<Option<Permission>>;
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Permission>>;
    async fn list_permissions(&self) -> RepoResult<Vec<Permission>>;
    async fn delete_permission(&self, permission_id: &str) -> RepoResult<()>;
}

pub struct InMemoryRoleRepository {
    pub roles: RwLock<Vec<Role>>,
    pub user_roles: RwLock<Vec<(String, String)>>, // (user_id, role_id)
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(vec![]),
            user_roles: RwLock::new(vec![]),
        }
    }

    pub fn with_roles(roles: Vec<Role>) -> Self {
        Self {
            roles: RwLock::new(roles),
            user_roles: RwLock::new(vec![]),
        }
    }
}

impl Default for InMemoryRoleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn create_role(&self, role: &Role) -> RepoResult<()> {
        let mut roles = self.roles.write().await;
        if roles.iter().any(|r| r.id == role.id || r.name == role.name) {
            return Err(Error::Protocol(format!(
                "duplicate role: {} ({})",
                role.name, role.id
            )));
        }
        roles.push(role.clone());
        Ok(())
    }
    async fn get_role(&self, role_id: &str) -> RepoResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .find(|r| r.id == role_id)
            .cloned())
    }
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }
    async fn find_children(&self, parent_id: &str) -> RepoResult<Vec<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .iter()
            .filter(|r| r.parent_role_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }
    async fn list_roles(&self) -> RepoResult<Vec<Role>> {
        Ok(self.roles.read().await.clone())
    }
    async fn count_roles(&self) -> RepoResult<usize> {
        Ok(self.roles.read().await.len())
    }
    async fn save_role(&self, role: &Role) -> RepoResult<()> {
        let mut roles = self.roles.write().await;
        match roles.iter_mut().find(|r| r.id == role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(Error::RowNotFound),
        }
    }
    async fn delete_role(&self, role_id: &str) -> RepoResult<()> {
        self.roles.write().await.retain(|r| r.id != role_id);
        self.user_roles
            .write()
            .await
            .retain(|(_, rid)| rid != role_id);
        Ok(())
    }
    async fn assign_role(&self, user_id: &str, role_id: &str) -> RepoResult<()> {
        let mut user_roles = self.user_roles.write().await;
        if !user_roles
            .iter()
            .any(|(uid, rid)| uid == user_id && rid == role_id)
        {
            user_roles.push((user_id.to_string(), role_id.to_string()));
        }
        Ok(())
    }
    async fn remove_role(&self, user_id: &str, role_id: &str) -> RepoResult<()> {
        self.user_roles
            .write()
            .await
            .retain(|(uid, rid)| !(uid == user_id && rid == role_id));
        Ok(())
    }
    async fn get_roles_for_user(&self, user_id: &str) -> RepoResult<Vec<Role>> {
        let user_roles = self.user_roles.read().await;
        let roles = self.roles.read().await;
        let mut result = vec![];
        for (uid, rid) in user_roles.iter() {
            if uid == user_id {
                if let Some(role) = roles.iter().find(|r| &r.id == rid) {
                    result.push(role.clone());
                }
            }
        }
        Ok(result)
    }
    async fn count_users_with_role(&self, role_id: &str) -> RepoResult<u64> {
        Ok(self
            .user_roles
            .read()
            .await
            .iter()
            .filter(|(_, rid)| rid == role_id)
            .count() as u64)
    }
    async fn remove_permission_from_all_roles(&self, permission_id: &str) -> RepoResult<()> {
        for role in self.roles.write().await.iter_mut() {
            role.remove_permission(permission_id);
        }
        Ok(())
    }
}

pub struct InMemoryPermissionRepository {
    pub permissions: RwLock<Vec<Permission>>,
}

impl InMemoryPermissionRepository {
    pub fn new() -> Self {
        Self {
            permissions: RwLock::new(vec![]),
        }
    }

    pub fn with_permissions(permissions: Vec<Permission>) -> Self {
        Self {
            permissions: RwLock::new(permissions),
        }
    }
}

impl Default for InMemoryPermissionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissionRepository {
    async fn create_permission(&self, permission: &Permission) -> RepoResult<()> {
        let mut permissions = self.permissions.write().await;
        if permissions.iter().any(|p| p.name == permission.name) {
            return Err(Error::Protocol(format!(
                "duplicate permission: {}",
                permission.name
            )));
        }
        permissions.push(permission.clone());
        Ok(())
    }
    async fn get_permission(&self, permission_id: &str) -> RepoResult<Option<Permission>> {
        Ok(self
            .permissions
            .read()
            .await
            .iter()
            .find(|p| p.id == permission_id)
            .cloned())
    }
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<Permission>> {
        Ok(self
            .permissions
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }
    async fn list_permissions(&self) -> RepoResult<Vec<Permission>> {
        let mut permissions = self.permissions.read().await.clone();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }
    async fn delete_permission(&self, permission_id: &str) -> RepoResult<()> {
        self.permissions
            .write()
            .await
            .retain(|p| p.id != permission_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::PermissionCategory;

    fn role(name: &str) -> Role {
        Role::new(name.to_string(), format!("{name} role"), None)
    }

    #[tokio::test]
    async fn test_in_memory_permission_repository_crud() {
        let repo = InMemoryPermissionRepository::new();
        let perm = Permission::new(
            "role.read".to_string(),
            "Read roles".to_string(),
            PermissionCategory::RoleManagement,
            None,
        );
        repo.create_permission(&perm).await.unwrap();
        assert!(repo.create_permission(&perm).await.is_err());

        assert_eq!(repo.get_permission(&perm.id).await.unwrap(), Some(perm.clone()));
        assert_eq!(
            repo.find_by_name("role.read").await.unwrap().map(|p| p.id),
            Some(perm.id.clone())
        );

        repo.delete_permission(&perm.id).await.unwrap();
        assert!(repo.list_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_role_repository_remove_permission_from_all_roles() {
        let repo = InMemoryRoleRepository::new();
        let a = role("a").with_permissions(["p1".to_string(), "p2".to_string()]);
        let b = role("b").with_permissions(["p1".to_string()]);
        repo.create_role(&a).await.unwrap();
        repo.create_role(&b).await.unwrap();

        repo.remove_permission_from_all_roles("p1").await.unwrap();

        let roles = repo.list_roles().await.unwrap();
        assert!(roles.iter().all(|r| !r.permissions.contains("p1")));
        assert!(roles.iter().any(|r| r.permissions.contains("p2")));
    }
}
