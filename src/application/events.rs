use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base trait for all domain events
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> &str;
    fn aggregate_id(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn event_type(&self) -> &str;
}

/// Publishes an event to the log stream.
pub fn publish<E: DomainEvent>(event: &E) {
    tracing::info!(
        event_id = %event.event_id(),
        event_type = event.event_type(),
        aggregate_id = %event.aggregate_id(),
        "Domain event published"
    );
}

/// Role-related domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCreatedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub role_name: String,
    pub parent_role_id: Option<String>,
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdatedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDeletedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleClonedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub source_role_id: String,
    pub role_id: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleParentChangedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub old_parent_role_id: Option<String>,
    pub new_parent_role_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleLevelsPropagatedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub roles_updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsAssignedToRoleEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsRemovedFromRoleEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub role_id: String,
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignedToUserEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub user_id: String,
    pub role_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRemovedFromUserEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub user_id: String,
    pub role_id: String,
}

/// Permission catalog events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionCreatedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub permission_id: String,
    pub permission_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDeletedEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub permission_id: String,
}

/// Event factory functions
pub struct EventFactory;

impl EventFactory {
    pub fn role_created(
        role_id: String,
        role_name: String,
        parent_role_id: Option<String>,
        level: u32,
    ) -> RoleCreatedEvent {
        RoleCreatedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            role_name,
            parent_role_id,
            level,
        }
    }

    pub fn role_updated(role_id: String, role_name: String) -> RoleUpdatedEvent {
        RoleUpdatedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            role_name,
        }
    }

    pub fn role_deleted(role_id: String) -> RoleDeletedEvent {
        RoleDeletedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
        }
    }

    pub fn role_cloned(source_role_id: String, role_id: String, role_name: String) -> RoleClonedEvent {
        RoleClonedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            source_role_id,
            role_id,
            role_name,
        }
    }

    pub fn role_parent_changed(
        role_id: String,
        old_parent_role_id: Option<String>,
        new_parent_role_id: Option<String>,
    ) -> RoleParentChangedEvent {
        RoleParentChangedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            old_parent_role_id,
            new_parent_role_id,
        }
    }

    pub fn role_levels_propagated(role_id: String, roles_updated: usize) -> RoleLevelsPropagatedEvent {
        RoleLevelsPropagatedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            roles_updated,
        }
    }

    pub fn permissions_assigned_to_role(
        role_id: String,
        permission_ids: Vec<String>,
    ) -> PermissionsAssignedToRoleEvent {
        PermissionsAssignedToRoleEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            permission_ids,
        }
    }

    pub fn permissions_removed_from_role(
        role_id: String,
        permission_ids: Vec<String>,
    ) -> PermissionsRemovedFromRoleEvent {
        PermissionsRemovedFromRoleEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: role_id.clone(),
            occurred_at: Utc::now(),
            role_id,
            permission_ids,
        }
    }

    pub fn role_assigned_to_user(user_id: String, role_id: String) -> RoleAssignedToUserEvent {
        RoleAssignedToUserEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: user_id.clone(),
            occurred_at: Utc::now(),
            user_id,
            role_id,
        }
    }

    pub fn role_removed_from_user(user_id: String, role_id: String) -> RoleRemovedFromUserEvent {
        RoleRemovedFromUserEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: user_id.clone(),
            occurred_at: Utc::now(),
            user_id,
            role_id,
        }
    }

    pub fn permission_created(
        permission_id: String,
        permission_name: String,
    ) -> PermissionCreatedEvent {
        PermissionCreatedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: permission_id.clone(),
            occurred_at: Utc::now(),
            permission_id,
            permission_name,
        }
    }

    pub fn permission_deleted(permission_id: String) -> PermissionDeletedEvent {
        PermissionDeletedEvent {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: permission_id.clone(),
            occurred_at: Utc::now(),
            permission_id,
        }
    }
}

macro_rules! impl_domain_event {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl DomainEvent for $ty {
                fn event_id(&self) -> &str {
                    &self.event_id
                }
                fn aggregate_id(&self) -> &str {
                    &self.aggregate_id
                }
                fn occurred_at(&self) -> DateTime<Utc> {
                    self.occurred_at
                }
                fn event_type(&self) -> &str {
                    $name
                }
            }
        )*
    };
}

impl_domain_event!(
    RoleCreatedEvent => "RoleCreated",
    RoleUpdatedEvent => "RoleUpdated",
    RoleDeletedEvent => "RoleDeleted",
    RoleClonedEvent => "RoleCloned",
    RoleParentChangedEvent => "RoleParentChanged",
    RoleLevelsPropagatedEvent => "RoleLevelsPropagated",
    PermissionsAssignedToRoleEvent => "PermissionsAssignedToRole",
    PermissionsRemovedFromRoleEvent => "PermissionsRemovedFromRole",
    RoleAssignedToUserEvent => "RoleAssignedToUser",
    RoleRemovedFromUserEvent => "RoleRemovedFromUser",
    PermissionCreatedEvent => "PermissionCreated",
    PermissionDeletedEvent => "PermissionDeleted",
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_created_event() {
        let event = EventFactory::role_created(
            "r1".to_string(),
            "manager".to_string(),
            Some("admin".to_string()),
            1,
        );

        assert_eq!(event.event_type(), "RoleCreated");
        assert_eq!(event.aggregate_id(), "r1");
        assert_eq!(event.level, 1);
        assert!(!event.event_id.is_empty());
    }

    #[test]
    fn test_role_parent_changed_event() {
        let event =
            EventFactory::role_parent_changed("r1".to_string(), Some("admin".to_string()), None);

        assert_eq!(event.event_type(), "RoleParentChanged");
        assert_eq!(event.old_parent_role_id.as_deref(), Some("admin"));
        assert!(event.new_parent_role_id.is_none());
    }

    #[test]
    fn test_role_assignment_events_are_keyed_by_user() {
        let event = EventFactory::role_assigned_to_user("u1".to_string(), "r1".to_string());
        assert_eq!(event.aggregate_id(), "u1");
        assert_eq!(event.event_type(), "RoleAssignedToUser");
    }
}
