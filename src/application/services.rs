use crate::application::validators::ValidationError;
use crate::domain::role::Role;
use crate::infrastructure::{PermissionRepository, RoleRepository};
use futures::future::try_join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("Role not found: {0}")]
    RoleNotFound(String),
    #[error("Permission not found: {0}")]
    PermissionNotFound(String),
    #[error("Parent role not found: {0}")]
    ParentNotFound(String),
    #[error("Role {role_id} references missing parent role {parent_id}")]
    DanglingReference { role_id: String, parent_id: String },
    #[error("Circular dependency detected: {parent_id} cannot become the parent of {role_id}")]
    CircularReference { role_id: String, parent_id: String },
    #[error("Role hierarchy integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Level propagation from {root_id} failed at role {role_id}: {source}")]
    PropagationFailed {
        root_id: String,
        role_id: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Role name already exists: {0}")]
    NameTaken(String),
    #[error("Permission name already exists: {0}")]
    PermissionNameTaken(String),
    #[error("Cannot delete role that has child roles: {0}")]
    HasChildren(String),
    #[error("Cannot delete role {role_id}: assigned to {count} user(s)")]
    AssignedToUsers { role_id: String, count: u64 },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Resolves the role hierarchy: ancestry walks, effective permissions, cycle checks
/// and level propagation, all over an injected role store.
///
/// Every walk is bounded by the number of stored roles. Running past that bound means
/// the stored parent links contain a cycle, which is reported as
/// [`RoleError::IntegrityViolation`] instead of looping or truncating.
///
/// Every writer of role records must hold [`RoleHierarchyService::lock_structure`] for
/// its whole read-check-write sequence. `save_role` rewrites the parent and level along
/// with the permissions, so an unlocked writer can undo a concurrent propagation.
pub struct RoleHierarchyService {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    structure_lock: Mutex<()>,
}

impl RoleHierarchyService {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self {
            role_repo,
            structure_lock: Mutex::new(()),
        }
    }

    /// Serializes structural writes to the hierarchy.
    pub async fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure_lock.lock().await
    }

    pub async fn require_role(&self, role_id: &str) -> Result<Role, RoleError> {
        self.role_repo
            .get_role(role_id)
            .await?
            .ok_or_else(|| RoleError::RoleNotFound(role_id.to_string()))
    }

    /// Ancestors of a role, nearest parent first. Stops at a root or at a parent id
    /// that no longer resolves.
    #[instrument(skip(self))]
    pub async fn ancestors(&self, role_id: &str) -> Result<Vec<Role>, RoleError> {
        let role = self.require_role(role_id).await?;
        self.ancestors_of(&role).await
    }

    async fn ancestors_of(&self, role: &Role) -> Result<Vec<Role>, RoleError> {
        let bound = self.role_repo.count_roles().await?;
        let mut chain = Vec::new();
        let mut next = role.parent_role_id.clone();

        while let Some(parent_id) = next {
            if chain.len() >= bound {
                error!(role_id = %role.id, bound, "Parent chain exceeds role count");
                return Err(RoleError::IntegrityViolation(format!(
                    "parent chain of role {} does not terminate within {bound} steps",
                    role.id
                )));
            }
            match self.role_repo.get_role(&parent_id).await? {
                Some(parent) => {
                    next = parent.parent_role_id.clone();
                    chain.push(parent);
                }
                None => {
                    debug!(role_id = %role.id, %parent_id, "Parent chain ends at a missing role");
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// Union of the role's own permissions and those of every ancestor.
    #[instrument(skip(self))]
    pub async fn compute_effective_permissions(
        &self,
        role_id: &str,
    ) -> Result<HashSet<String>, RoleError> {
        let role = self.require_role(role_id).await?;
        let ancestors = self.ancestors_of(&role).await?;

        let mut permissions = role.permissions;
        for ancestor in ancestors {
            permissions.extend(ancestor.permissions);
        }
        Ok(permissions)
    }

    pub async fn has_permission(
        &self,
        role_id: &str,
        permission_id: &str,
    ) -> Result<bool, RoleError> {
        Ok(self
            .compute_effective_permissions(role_id)
            .await?
            .contains(permission_id))
    }

    /// Whether making `proposed_parent_id` the parent of `role_id` would put `role_id`
    /// among its own ancestors. A self-parent is always a cycle.
    #[instrument(skip(self))]
    pub async fn would_create_cycle(
        &self,
        role_id: &str,
        proposed_parent_id: &str,
    ) -> Result<bool, RoleError> {
        if role_id == proposed_parent_id {
            return Ok(true);
        }

        let bound = self.role_repo.count_roles().await?;
        let mut current = self
            .role_repo
            .get_role(proposed_parent_id)
            .await?
            .ok_or_else(|| RoleError::ParentNotFound(proposed_parent_id.to_string()))?;
        let mut steps = 0usize;

        loop {
            if current.id == role_id {
                return Ok(true);
            }
            let Some(parent_id) = current.parent_role_id.clone() else {
                return Ok(false);
            };
            steps += 1;
            if steps > bound {
                error!(role_id, proposed_parent_id, bound, "Cycle check exceeded role count");
                return Err(RoleError::IntegrityViolation(format!(
                    "ancestry of role {proposed_parent_id} does not terminate within {bound} steps"
                )));
            }
            current = self.role_repo.get_role(&parent_id).await?.ok_or_else(|| {
                RoleError::DanglingReference {
                    role_id: current.id.clone(),
                    parent_id: parent_id.clone(),
                }
            })?;
        }
    }

    /// Checks a proposed parent assignment and returns the parent role.
    pub async fn validate_parent(
        &self,
        role_id: &str,
        parent_id: &str,
    ) -> Result<Role, RoleError> {
        if self.would_create_cycle(role_id, parent_id).await? {
            warn!(role_id, parent_id, "Rejected circular parent assignment");
            return Err(RoleError::CircularReference {
                role_id: role_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        self.require_parent(parent_id).await
    }

    async fn require_parent(&self, parent_id: &str) -> Result<Role, RoleError> {
        self.role_repo
            .get_role(parent_id)
            .await?
            .ok_or_else(|| RoleError::ParentNotFound(parent_id.to_string()))
    }

    /// Level a role takes under `parent_id`.
    pub async fn level_for_parent(&self, parent_id: Option<&str>) -> Result<u32, RoleError> {
        match parent_id {
            Some(id) => Ok(Role::level_under(Some(&self.require_parent(id).await?))),
            None => Ok(0),
        }
    }

    /// Recomputes the level of `role_id` from its parent and cascades to every
    /// descendant breadth-first. Returns how many roles were rewritten.
    ///
    /// Writes are not transactional: on failure, roles already saved keep their new
    /// level and the error names the role whose read or write failed.
    #[instrument(skip(self))]
    pub async fn propagate_levels(&self, role_id: &str) -> Result<usize, RoleError> {
        let mut root = self.require_role(role_id).await?;
        let level = self
            .level_for_parent(root.parent_role_id.as_deref())
            .await?;

        let mut updated = 0usize;
        if root.set_level(level) {
            self.save_during_propagation(role_id, &root).await?;
            updated += 1;
        }

        let mut visited = HashSet::from([root.id.clone()]);
        let mut queue = VecDeque::from([(root.id, root.level)]);

        while let Some((parent_id, parent_level)) = queue.pop_front() {
            let children = self.role_repo.find_children(&parent_id).await.map_err(|e| {
                RoleError::PropagationFailed {
                    root_id: role_id.to_string(),
                    role_id: parent_id.clone(),
                    source: e,
                }
            })?;
            for mut child in children {
                if !visited.insert(child.id.clone()) {
                    error!(root_id = role_id, child_id = %child.id, "Role revisited during level propagation");
                    return Err(RoleError::IntegrityViolation(format!(
                        "role {} reached twice while propagating levels from {role_id}",
                        child.id
                    )));
                }
                if child.set_level(parent_level + 1) {
                    self.save_during_propagation(role_id, &child).await?;
                    updated += 1;
                }
                queue.push_back((child.id, child.level));
            }
        }

        info!(root_id = role_id, updated, "Role levels propagated");
        Ok(updated)
    }

    async fn save_during_propagation(&self, root_id: &str, role: &Role) -> Result<(), RoleError> {
        self.role_repo.save_role(role).await.map_err(|e| {
            error!(root_id, role_id = %role.id, error = %e, "Failed to persist propagated level");
            RoleError::PropagationFailed {
                root_id: root_id.to_string(),
                role_id: role.id.clone(),
                source: e,
            }
        })
    }
}

/// Answers "may this user do X" through the effective permissions of the user's roles.
pub struct AuthorizationService {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl AuthorizationService {
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

    #[instrument(skip(self))]
    pub async fn user_has_permission(
        &self,
        user_id: &str,
        permission_name: &str,
    ) -> Result<bool, RoleError> {
        let Some(permission) = self.permission_repo.find_by_name(permission_name).await? else {
            debug!(permission_name, "Permission is not in the catalog");
            return Ok(false);
        };
        if !permission.is_active {
            return Ok(false);
        }

        let roles = self.role_repo.get_roles_for_user(user_id).await?;
        let effective = try_join_all(
            roles
                .iter()
                .map(|role| self.hierarchy.compute_effective_permissions(&role.id)),
        )
        .await?;

        Ok(effective
            .iter()
            .any(|permissions| permissions.contains(&permission.id)))
    }
}
