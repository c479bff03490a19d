use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base trait for all commands
pub trait Command: Send + Sync {
    fn command_id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
    fn actor_id(&self) -> Option<&str>;
}

/// Command to create a role, optionally under a parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub permission_ids: Vec<String>,
    pub parent_role_id: Option<String>,
    pub actor_id: Option<String>,
}

/// Command to update a role. `None` leaves a field untouched; for `parent_role_id`,
/// `Some(None)` re-roots the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<String>>,
    pub parent_role_id: Option<Option<String>>,
    pub actor_id: Option<String>,
}

/// Command to move a role under another parent, or to the root with `None`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetParentRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub parent_role_id: Option<String>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub actor_id: Option<String>,
}

/// Command to copy a role's permissions and parent under a new name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_role_id: String,
    pub name: String,
    pub description: String,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPermissionsToRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub permission_ids: Vec<String>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovePermissionsFromRoleCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub permission_ids: Vec<String>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRoleToUserCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub role_id: String,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRoleFromUserCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub role_id: String,
    pub actor_id: Option<String>,
}

/// Command to add a permission to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermissionCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub description: String,
    /// Derived from the name when absent.
    pub category: Option<crate::domain::permission::PermissionCategory>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePermissionCommand {
    pub command_id: String,
    pub timestamp: DateTime<Utc>,
    pub permission_id: String,
    pub actor_id: Option<String>,
}

macro_rules! impl_command {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Command for $ty {
                fn command_id(&self) -> &str {
                    &self.command_id
                }
                fn timestamp(&self) -> DateTime<Utc> {
                    self.timestamp
                }
                fn actor_id(&self) -> Option<&str> {
                    self.actor_id.as_deref()
                }
            }
        )*
    };
}

impl_command!(
    CreateRoleCommand,
    UpdateRoleCommand,
    SetParentRoleCommand,
    DeleteRoleCommand,
    CloneRoleCommand,
    AssignPermissionsToRoleCommand,
    RemovePermissionsFromRoleCommand,
    AssignRoleToUserCommand,
    RemoveRoleFromUserCommand,
    CreatePermissionCommand,
    DeletePermissionCommand,
);

/// Command factory functions
pub struct CommandFactory;

impl CommandFactory {
    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn create_role(
        name: String,
        description: String,
        permission_ids: Vec<String>,
        parent_role_id: Option<String>,
        actor_id: Option<String>,
    ) -> CreateRoleCommand {
        CreateRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            name,
            description,
            permission_ids,
            parent_role_id,
            actor_id,
        }
    }

    /// An update that changes nothing until fields are filled in.
    pub fn update_role(role_id: String) -> UpdateRoleCommand {
        UpdateRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            role_id,
            name: None,
            description: None,
            permission_ids: None,
            parent_role_id: None,
            actor_id: None,
        }
    }

    pub fn set_parent_role(
        role_id: String,
        parent_role_id: Option<String>,
        actor_id: Option<String>,
    ) -> SetParentRoleCommand {
        SetParentRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            role_id,
            parent_role_id,
            actor_id,
        }
    }

    pub fn delete_role(role_id: String, actor_id: Option<String>) -> DeleteRoleCommand {
        DeleteRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            role_id,
            actor_id,
        }
    }

    pub fn clone_role(
        source_role_id: String,
        name: String,
        description: String,
        actor_id: Option<String>,
    ) -> CloneRoleCommand {
        CloneRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            source_role_id,
            name,
            description,
            actor_id,
        }
    }

    pub fn assign_permissions_to_role(
        role_id: String,
        permission_ids: Vec<String>,
        actor_id: Option<String>,
    ) -> AssignPermissionsToRoleCommand {
        AssignPermissionsToRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            role_id,
            permission_ids,
            actor_id,
        }
    }

    pub fn remove_permissions_from_role(
        role_id: String,
        permission_ids: Vec<String>,
        actor_id: Option<String>,
    ) -> RemovePermissionsFromRoleCommand {
        RemovePermissionsFromRoleCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            role_id,
            permission_ids,
            actor_id,
        }
    }

    pub fn assign_role_to_user(
        user_id: String,
        role_id: String,
        actor_id: Option<String>,
    ) -> AssignRoleToUserCommand {
        AssignRoleToUserCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            user_id,
            role_id,
            actor_id,
        }
    }

    pub fn remove_role_from_user(
        user_id: String,
        role_id: String,
        actor_id: Option<String>,
    ) -> RemoveRoleFromUserCommand {
        RemoveRoleFromUserCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            user_id,
            role_id,
            actor_id,
        }
    }

    pub fn create_permission(
        name: String,
        description: String,
        category: Option<crate::domain::permission::PermissionCategory>,
        actor_id: Option<String>,
    ) -> CreatePermissionCommand {
        CreatePermissionCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            name,
            description,
            category,
            actor_id,
        }
    }

    pub fn delete_permission(
        permission_id: String,
        actor_id: Option<String>,
    ) -> DeletePermissionCommand {
        DeletePermissionCommand {
            command_id: Self::new_id(),
            timestamp: Utc::now(),
            permission_id,
            actor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_factory_assigns_ids() {
        let a = CommandFactory::delete_role("r1".to_string(), Some("admin".to_string()));
        let b = CommandFactory::delete_role("r1".to_string(), None);
        assert_ne!(a.command_id(), b.command_id());
        assert_eq!(a.actor_id(), Some("admin"));
        assert_eq!(b.actor_id(), None);
    }

    #[test]
    fn test_update_role_defaults_to_no_changes() {
        let cmd = CommandFactory::update_role("r1".to_string());
        assert!(cmd.name.is_none());
        assert!(cmd.parent_role_id.is_none());
        assert!(cmd.permission_ids.is_none());
    }
}
