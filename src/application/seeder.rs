//! Base permission catalog and role chain.
//!
//! Roles are seeded as the chain `guest <- user <- manager <- admin`, each storing only
//! what it adds over its parent, so the effective set of every base role is its full
//! permission list. Seeding is idempotent: existing permissions and roles are kept.

use crate::application::services::{RoleError, RoleHierarchyService};
use crate::domain::permission::{Permission, PermissionCategory};
use crate::domain::role::Role;
use crate::infrastructure::{PermissionRepository, RoleRepository};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};

use PermissionCategory::{PermissionManagement, RoleManagement, System, UserManagement};

pub const BASE_PERMISSIONS: &[(&str, &str, PermissionCategory)] = &[
    ("user.create", "Create new users", UserManagement),
    ("user.read", "View user information", UserManagement),
    ("user.update", "Update user information", UserManagement),
    ("user.delete", "Delete users", UserManagement),
    ("role.create", "Create new roles", RoleManagement),
    ("role.read", "View role information", RoleManagement),
    ("role.update", "Update role information", RoleManagement),
    ("role.delete", "Delete roles", RoleManagement),
    ("permission.create", "Create new permissions", PermissionManagement),
    ("permission.read", "View permission information", PermissionManagement),
    ("permission.update", "Update permission information", PermissionManagement),
    ("permission.delete", "Delete permissions", PermissionManagement),
    ("session.read", "View session information", System),
    ("session.delete", "Terminate sessions", System),
    ("activity.read", "View activity logs", System),
    ("activity.delete", "Delete activity logs", System),
    ("system.settings", "Manage system settings", System),
    ("system.backup", "Manage system backups", System),
    ("system.metrics", "View system metrics", System),
];

pub struct BaseRole {
    pub name: &'static str,
    pub description: &'static str,
    /// Full effective permission list, by name.
    pub permissions: &'static [&'static str],
}

/// Ordered root first; each role is the parent of the next.
pub const BASE_ROLES: &[BaseRole] = &[
    BaseRole {
        name: "guest",
        description: "Guest user with minimal access",
        permissions: &["user.read", "role.read"],
    },
    BaseRole {
        name: "user",
        description: "Regular user with basic access",
        permissions: &["user.read", "role.read", "session.read", "activity.read"],
    },
    BaseRole {
        name: "manager",
        description: "Manager with user and role management capabilities",
        permissions: &[
            "user.create",
            "user.read",
            "user.update",
            "role.read",
            "permission.read",
            "session.read",
            "activity.read",
            "system.metrics",
        ],
    },
    BaseRole {
        name: "admin",
        description: "Super administrator with full system access",
        permissions: &[
            "user.create",
            "user.read",
            "user.update",
            "user.delete",
            "role.create",
            "role.read",
            "role.update",
            "role.delete",
            "permission.create",
            "permission.read",
            "permission.update",
            "permission.delete",
            "session.read",
            "session.delete",
            "activity.read",
            "activity.delete",
            "system.settings",
            "system.backup",
            "system.metrics",
        ],
    },
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub admin_assigned_to: Option<String>,
}

pub struct Seeder {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl Seeder {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            permission_repo,
            hierarchy,
        }
    }

    /// Seeds the catalog and the base roles. When `admin_user_id` is set, that user is
    /// given the `admin` role.
    #[instrument(skip(self))]
    pub async fn run(&self, admin_user_id: Option<&str>) -> Result<SeedReport, RoleError> {
        let mut report = SeedReport::default();
        let ids = self.seed_permissions(&mut report).await?;

        let _guard = self.hierarchy.lock_structure().await;
        let mut parent: Option<Role> = None;
        let mut inherited: HashSet<&str> = HashSet::new();

        for base in BASE_ROLES {
            let role = match self.role_repo.find_by_name(base.name).await? {
                Some(existing) => existing,
                None => {
                    let own = base
                        .permissions
                        .iter()
                        .filter(|name| !inherited.contains(*name))
                        .map(|name| {
                            ids.get(*name)
                                .cloned()
                                .ok_or_else(|| RoleError::PermissionNotFound((*name).to_string()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    let mut role = Role::new(base.name.to_string(), base.description.to_string(), None)
                        .with_permissions(own);
                    role.parent_role_id = parent.as_ref().map(|p| p.id.clone());
                    role.level = Role::level_under(parent.as_ref());
                    self.role_repo.create_role(&role).await?;
                    report.roles_created += 1;
                    role
                }
            };
            inherited.extend(base.permissions.iter().copied());
            parent = Some(role);
        }

        if let (Some(user_id), Some(admin)) = (admin_user_id, parent) {
            self.role_repo.assign_role(user_id, &admin.id).await?;
            report.admin_assigned_to = Some(user_id.to_string());
        }

        info!(
            permissions_created = report.permissions_created,
            roles_created = report.roles_created,
            "Database seeding completed"
        );
        Ok(report)
    }

    async fn seed_permissions(
        &self,
        report: &mut SeedReport,
    ) -> Result<HashMap<&'static str, String>, RoleError> {
        let mut ids = HashMap::new();
        for (name, description, category) in BASE_PERMISSIONS {
            let permission = match self.permission_repo.find_by_name(name).await? {
                Some(existing) => existing,
                None => {
                    let permission = Permission::new(
                        name.to_string(),
                        description.to_string(),
                        *category,
                        None,
                    );
                    self.permission_repo.create_permission(&permission).await?;
                    report.permissions_created += 1;
                    permission
                }
            };
            ids.insert(*name, permission.id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InMemoryPermissionRepository, InMemoryRoleRepository};

    fn seeder() -> (Seeder, Arc<InMemoryRoleRepository>, Arc<RoleHierarchyService>) {
        let roles = Arc::new(InMemoryRoleRepository::new());
        let permissions = Arc::new(InMemoryPermissionRepository::new());
        let hierarchy = Arc::new(RoleHierarchyService::new(roles.clone()));
        (
            Seeder::new(roles.clone(), permissions, hierarchy.clone()),
            roles,
            hierarchy,
        )
    }

    #[tokio::test]
    async fn test_seeded_effective_sets_match_base_roles() {
        let (seeder, roles, hierarchy) = seeder();
        let report = seeder.run(None).await.unwrap();
        assert_eq!(report.permissions_created, BASE_PERMISSIONS.len());
        assert_eq!(report.roles_created, BASE_ROLES.len());

        for (depth, base) in BASE_ROLES.iter().enumerate() {
            let role = roles.find_by_name(base.name).await.unwrap().unwrap();
            assert_eq!(role.level as usize, depth);
            let effective = hierarchy.compute_effective_permissions(&role.id).await.unwrap();
            assert_eq!(effective.len(), base.permissions.len(), "role {}", base.name);
        }
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let (seeder, roles, _) = seeder();
        seeder.run(None).await.unwrap();
        let again = seeder.run(Some("root-user")).await.unwrap();

        assert_eq!(again.permissions_created, 0);
        assert_eq!(again.roles_created, 0);
        assert_eq!(again.admin_assigned_to.as_deref(), Some("root-user"));
        assert_eq!(roles.count_roles().await.unwrap(), BASE_ROLES.len());

        let assigned = roles.get_roles_for_user("root-user").await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].name, "admin");
    }
}
