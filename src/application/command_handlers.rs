use super::command_bus::CommandHandler;
use super::commands::{
    AssignPermissionsToRoleCommand, AssignRoleToUserCommand, CloneRoleCommand,
    CreatePermissionCommand, CreateRoleCommand, DeletePermissionCommand, DeleteRoleCommand,
    RemovePermissionsFromRoleCommand, RemoveRoleFromUserCommand, SetParentRoleCommand,
    UpdateRoleCommand,
};
use super::events::{EventFactory, publish};
use super::services::{RoleError, RoleHierarchyService};
use super::validators::{
    CloneRoleCommandValidator, CommandValidator, CreatePermissionCommandValidator,
    CreateRoleCommandValidator, RoleCommandValidator, UpdateRoleCommandValidator,
};
use crate::domain::permission::{Permission, PermissionCategory};
use crate::domain::role::Role;
use crate::infrastructure::{PermissionRepository, RoleRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ============================================================================
// SHARED RULES
// ============================================================================

async fn ensure_permissions_exist(
    permission_repo: &Arc<dyn PermissionRepository + Send + Sync>,
    permission_ids: &[String],
) -> Result<(), RoleError> {
    for permission_id in permission_ids {
        if permission_repo.get_permission(permission_id).await?.is_none() {
            warn!(%permission_id, "Unknown permission referenced");
            return Err(RoleError::PermissionNotFound(permission_id.clone()));
        }
    }
    Ok(())
}

async fn ensure_name_available(
    role_repo: &Arc<dyn RoleRepository + Send + Sync>,
    name: &str,
    own_id: Option<&str>,
) -> Result<(), RoleError> {
    match role_repo.find_by_name(name).await? {
        Some(existing) if Some(existing.id.as_str()) != own_id => {
            Err(RoleError::NameTaken(name.to_string()))
        }
        _ => Ok(()),
    }
}

/// Points `role` at `new_parent` after the cycle check and sets its level. Nothing is
/// written. Returns false when the parent is unchanged.
async fn apply_parent_change(
    hierarchy: &RoleHierarchyService,
    role: &mut Role,
    new_parent: Option<String>,
) -> Result<bool, RoleError> {
    if role.parent_role_id == new_parent {
        return Ok(false);
    }
    let level = match &new_parent {
        Some(parent_id) => Role::level_under(Some(&hierarchy.validate_parent(&role.id, parent_id).await?)),
        None => 0,
    };
    role.set_parent_role(new_parent);
    role.set_level(level);
    Ok(true)
}

/// Saves a role whose parent moved and cascades the level change to its subtree.
async fn persist_parent_change(
    role_repo: &Arc<dyn RoleRepository + Send + Sync>,
    hierarchy: &RoleHierarchyService,
    role: &Role,
    old_parent: Option<String>,
) -> Result<(), RoleError> {
    role_repo.save_role(role).await?;
    publish(&EventFactory::role_parent_changed(
        role.id.clone(),
        old_parent,
        role.parent_role_id.clone(),
    ));

    let updated = hierarchy.propagate_levels(&role.id).await?;
    publish(&EventFactory::role_levels_propagated(role.id.clone(), updated));
    Ok(())
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

/// Create role command handler
pub struct CreateRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
    validator: CreateRoleCommandValidator,
}

impl CreateRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            permission_repo,
            hierarchy,
            validator: CreateRoleCommandValidator,
        }
    }
}

#[async_trait]
impl CommandHandler<CreateRoleCommand> for CreateRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(name = "create_role_command_handler", skip(self, command), fields(name = %command.name))]
    async fn handle(&self, command: CreateRoleCommand) -> Result<Self::Result, Self::Error> {
        self.validator.validate(&command).await?;
        let name = command.name.trim().to_string();

        ensure_permissions_exist(&self.permission_repo, &command.permission_ids).await?;

        let _guard = self.hierarchy.lock_structure().await;
        ensure_name_available(&self.role_repo, &name, None).await?;
        let level = self
            .hierarchy
            .level_for_parent(command.parent_role_id.as_deref())
            .await?;

        let mut role = Role::new(name, command.description.trim().to_string(), command.actor_id)
            .with_permissions(command.permission_ids);
        role.parent_role_id = command.parent_role_id;
        role.level = level;

        self.role_repo.create_role(&role).await?;

        publish(&EventFactory::role_created(
            role.id.clone(),
            role.name.clone(),
            role.parent_role_id.clone(),
            role.level,
        ));
        Ok(role)
    }
}

/// Update role command handler. A parent change is checked for cycles before anything
/// is written, then cascades new levels to the subtree.
pub struct UpdateRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
    validator: UpdateRoleCommandValidator,
}

impl UpdateRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            permission_repo,
            hierarchy,
            validator: UpdateRoleCommandValidator,
        }
    }
}

#[async_trait]
impl CommandHandler<UpdateRoleCommand> for UpdateRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(name = "update_role_command_handler", skip(self, command), fields(role_id = %command.role_id))]
    async fn handle(&self, command: UpdateRoleCommand) -> Result<Self::Result, Self::Error> {
        self.validator.validate(&command).await?;

        let _guard = self.hierarchy.lock_structure().await;
        let mut role = self.hierarchy.require_role(&command.role_id).await?;
        let old_parent = role.parent_role_id.clone();

        if let Some(name) = command.name {
            let name = name.trim().to_string();
            ensure_name_available(&self.role_repo, &name, Some(&role.id)).await?;
            role.name = name;
        }
        if let Some(description) = command.description {
            role.description = description.trim().to_string();
        }
        if let Some(permission_ids) = command.permission_ids {
            ensure_permissions_exist(&self.permission_repo, &permission_ids).await?;
            role.permissions = permission_ids.into_iter().collect();
        }

        let parent_changed = match command.parent_role_id {
            Some(new_parent) => apply_parent_change(&self.hierarchy, &mut role, new_parent).await?,
            None => false,
        };
        role.touch();

        if parent_changed {
            persist_parent_change(&self.role_repo, &self.hierarchy, &role, old_parent).await?;
        } else {
            self.role_repo.save_role(&role).await?;
        }

        publish(&EventFactory::role_updated(role.id.clone(), role.name.clone()));
        Ok(role)
    }
}

/// Set parent role command handler
pub struct SetParentRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl SetParentRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            hierarchy,
        }
    }
}

#[async_trait]
impl CommandHandler<SetParentRoleCommand> for SetParentRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(name = "set_parent_role_command_handler", skip(self, command), fields(role_id = %command.role_id))]
    async fn handle(&self, command: SetParentRoleCommand) -> Result<Self::Result, Self::Error> {
        RoleCommandValidator::validate_id("role_id", &command.role_id)?;

        let _guard = self.hierarchy.lock_structure().await;
        let mut role = self.hierarchy.require_role(&command.role_id).await?;
        let old_parent = role.parent_role_id.clone();

        if apply_parent_change(&self.hierarchy, &mut role, command.parent_role_id).await? {
            persist_parent_change(&self.role_repo, &self.hierarchy, &role, old_parent).await?;
        } else {
            info!(role_id = %role.id, "Parent unchanged");
        }
        Ok(role)
    }
}

/// Delete role command handler. Roles that still have children or users are kept.
pub struct DeleteRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl DeleteRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            hierarchy,
        }
    }
}

#[async_trait]
impl CommandHandler<DeleteRoleCommand> for DeleteRoleCommandHandler {
    type Result = ();
    type Error = RoleError;

    #[instrument(name = "delete_role_command_handler", skip(self, command), fields(role_id = %command.role_id))]
    async fn handle(&self, command: DeleteRoleCommand) -> Result<Self::Result, Self::Error> {
        let _guard = self.hierarchy.lock_structure().await;
        let role = self.hierarchy.require_role(&command.role_id).await?;

        let assigned = self.role_repo.count_users_with_role(&role.id).await?;
        if assigned > 0 {
            return Err(RoleError::AssignedToUsers {
                role_id: role.id,
                count: assigned,
            });
        }
        if !self.role_repo.find_children(&role.id).await?.is_empty() {
            return Err(RoleError::HasChildren(role.id));
        }

        self.role_repo.delete_role(&role.id).await?;
        publish(&EventFactory::role_deleted(role.id));
        Ok(())
    }
}

/// Clone role command handler
pub struct CloneRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
    validator: CloneRoleCommandValidator,
}

impl CloneRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            hierarchy,
            validator: CloneRoleCommandValidator,
        }
    }
}

#[async_trait]
impl CommandHandler<CloneRoleCommand> for CloneRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(name = "clone_role_command_handler", skip(self, command), fields(source = %command.source_role_id))]
    async fn handle(&self, command: CloneRoleCommand) -> Result<Self::Result, Self::Error> {
        self.validator.validate(&command).await?;
        let name = command.name.trim().to_string();

        let _guard = self.hierarchy.lock_structure().await;
        let source = self.hierarchy.require_role(&command.source_role_id).await?;
        ensure_name_available(&self.role_repo, &name, None).await?;

        let level = self
            .hierarchy
            .level_for_parent(source.parent_role_id.as_deref())
            .await?;
        let mut role = Role::new(name, command.description.trim().to_string(), command.actor_id)
            .with_permissions(source.permissions.iter().cloned());
        role.parent_role_id = source.parent_role_id.clone();
        role.level = level;

        self.role_repo.create_role(&role).await?;
        publish(&EventFactory::role_cloned(
            source.id,
            role.id.clone(),
            role.name.clone(),
        ));
        Ok(role)
    }
}

/// Assign permissions to role command handler. Holds the structure lock: `save_role`
/// also writes the parent and level.
pub struct AssignPermissionsToRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl AssignPermissionsToRoleCommandHandler {
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
}

#[async_trait]
impl CommandHandler<AssignPermissionsToRoleCommand> for AssignPermissionsToRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(
        name = "assign_permissions_to_role_command_handler",
        skip(self, command),
        fields(role_id = %command.role_id)
    )]
    async fn handle(
        &self,
        command: AssignPermissionsToRoleCommand,
    ) -> Result<Self::Result, Self::Error> {
        RoleCommandValidator::validate_permission_ids(&command.permission_ids)?;
        ensure_permissions_exist(&self.permission_repo, &command.permission_ids).await?;

        let _guard = self.hierarchy.lock_structure().await;
        let mut role = self.hierarchy.require_role(&command.role_id).await?;

        let added: Vec<String> = command
            .permission_ids
            .into_iter()
            .filter(|id| role.add_permission(id.clone()))
            .collect();
        if !added.is_empty() {
            self.role_repo.save_role(&role).await?;
            publish(&EventFactory::permissions_assigned_to_role(role.id.clone(), added));
        }
        Ok(role)
    }
}

/// Remove permissions from role command handler
pub struct RemovePermissionsFromRoleCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl RemovePermissionsFromRoleCommandHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        hierarchy: Arc<RoleHierarchyService>,
    ) -> Self {
        Self {
            role_repo,
            hierarchy,
        }
    }
}

#[async_trait]
impl CommandHandler<RemovePermissionsFromRoleCommand> for RemovePermissionsFromRoleCommandHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(
        name = "remove_permissions_from_role_command_handler",
        skip(self, command),
        fields(role_id = %command.role_id)
    )]
    async fn handle(
        &self,
        command: RemovePermissionsFromRoleCommand,
    ) -> Result<Self::Result, Self::Error> {
        let _guard = self.hierarchy.lock_structure().await;
        let mut role = self.hierarchy.require_role(&command.role_id).await?;

        let removed: Vec<String> = command
            .permission_ids
            .into_iter()
            .filter(|id| role.remove_permission(id))
            .collect();
        if !removed.is_empty() {
            self.role_repo.save_role(&role).await?;
            publish(&EventFactory::permissions_removed_from_role(role.id.clone(), removed));
        }
        Ok(role)
    }
}

/// Assign role to user command handler
pub struct AssignRoleToUserCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
}

impl AssignRoleToUserCommandHandler {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self { role_repo }
    }
}

#[async_trait]
impl CommandHandler<AssignRoleToUserCommand> for AssignRoleToUserCommandHandler {
    type Result = ();
    type Error = RoleError;

    #[instrument(name = "assign_role_to_user_command_handler", skip(self, command))]
    async fn handle(&self, command: AssignRoleToUserCommand) -> Result<Self::Result, Self::Error> {
        RoleCommandValidator::validate_id("user_id", &command.user_id)?;
        if self.role_repo.get_role(&command.role_id).await?.is_none() {
            return Err(RoleError::RoleNotFound(command.role_id));
        }
        self.role_repo
            .assign_role(&command.user_id, &command.role_id)
            .await?;
        publish(&EventFactory::role_assigned_to_user(command.user_id, command.role_id));
        Ok(())
    }
}

/// Remove role from user command handler
pub struct RemoveRoleFromUserCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
}

impl RemoveRoleFromUserCommandHandler {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self { role_repo }
    }
}

#[async_trait]
impl CommandHandler<RemoveRoleFromUserCommand> for RemoveRoleFromUserCommandHandler {
    type Result = ();
    type Error = RoleError;

    #[instrument(name = "remove_role_from_user_command_handler", skip(self, command))]
    async fn handle(
        &self,
        command: RemoveRoleFromUserCommand,
    ) -> Result<Self::Result, Self::Error> {
        self.role_repo
            .remove_role(&command.user_id, &command.role_id)
            .await?;
        publish(&EventFactory::role_removed_from_user(command.user_id, command.role_id));
        Ok(())
    }
}

/// Create permission command handler
pub struct CreatePermissionCommandHandler {
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    validator: CreatePermissionCommandValidator,
}

impl CreatePermissionCommandHandler {
    pub fn new(permission_repo: Arc<dyn PermissionRepository + Send + Sync>) -> Self {
        Self {
            permission_repo,
            validator: CreatePermissionCommandValidator,
        }
    }
}

#[async_trait]
impl CommandHandler<CreatePermissionCommand> for CreatePermissionCommandHandler {
    type Result = Permission;
    type Error = RoleError;

    #[instrument(name = "create_permission_command_handler", skip(self, command), fields(name = %command.name))]
    async fn handle(&self, command: CreatePermissionCommand) -> Result<Self::Result, Self::Error> {
        self.validator.validate(&command).await?;
        if self
            .permission_repo
            .find_by_name(&command.name)
            .await?
            .is_some()
        {
            return Err(RoleError::PermissionNameTaken(command.name));
        }

        let category = command
            .category
            .unwrap_or_else(|| PermissionCategory::from_permission_name(&command.name));
        let permission = Permission::new(
            command.name,
            command.description.trim().to_string(),
            category,
            command.actor_id,
        );
        self.permission_repo.create_permission(&permission).await?;

        publish(&EventFactory::permission_created(
            permission.id.clone(),
            permission.name.clone(),
        ));
        Ok(permission)
    }
}

/// Delete permission command handler. The permission is stripped from every role first.
pub struct DeletePermissionCommandHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    hierarchy: Arc<RoleHierarchyService>,
}

impl DeletePermissionCommandHandler {
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
}

#[async_trait]
impl CommandHandler<DeletePermissionCommand> for DeletePermissionCommandHandler {
    type Result = ();
    type Error = RoleError;

    #[instrument(name = "delete_permission_command_handler", skip(self, command), fields(permission_id = %command.permission_id))]
    async fn handle(&self, command: DeletePermissionCommand) -> Result<Self::Result, Self::Error> {
        if self
            .permission_repo
            .get_permission(&command.permission_id)
            .await?
            .is_none()
        {
            return Err(RoleError::PermissionNotFound(command.permission_id));
        }

        let _guard = self.hierarchy.lock_structure().await;
        self.role_repo
            .remove_permission_from_all_roles(&command.permission_id)
            .await?;
        self.permission_repo
            .delete_permission(&command.permission_id)
            .await?;

        publish(&EventFactory::permission_deleted(command.permission_id));
        Ok(())
    }
}
