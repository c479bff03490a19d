use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grouping used when listing the permission catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum PermissionCategory {
    #[serde(rename = "User Management")]
    UserManagement,
    #[serde(rename = "Role Management")]
    RoleManagement,
    #[serde(rename = "Permission Management")]
    PermissionManagement,
    #[serde(rename = "System")]
    System,
}

impl PermissionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCategory::UserManagement => "User Management",
            PermissionCategory::RoleManagement => "Role Management",
            PermissionCategory::PermissionManagement => "Permission Management",
            PermissionCategory::System => "System",
        }
    }

    /// Category implied by a dotted permission name such as `role.read`.
    pub fn from_permission_name(name: &str) -> Self {
        match name.split('.').next().unwrap_or_default() {
            "user" | "session" => PermissionCategory::UserManagement,
            "role" => PermissionCategory::RoleManagement,
            "permission" => PermissionCategory::PermissionManagement,
            _ => PermissionCategory::System,
        }
    }
}

impl fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User Management" => Ok(PermissionCategory::UserManagement),
            "Role Management" => Ok(PermissionCategory::RoleManagement),
            "Permission Management" => Ok(PermissionCategory::PermissionManagement),
            "System" => Ok(PermissionCategory::System),
            other => Err(format!("unknown permission category: {other}")),
        }
    }
}

/// Permission value object. The hierarchy logic only ever handles its `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: PermissionCategory,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Creates a new active Permission with a fresh id.
    pub fn new(
        name: String,
        description: String,
        category: PermissionCategory,
        created_by: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            category,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_new() {
        let perm = Permission::new(
            "role.read".to_string(),
            "Read roles".to_string(),
            PermissionCategory::RoleManagement,
            None,
        );
        assert_eq!(perm.name, "role.read");
        assert!(perm.is_active);
        assert!(!perm.id.is_empty());
    }

    #[test]
    fn test_category_from_permission_name() {
        assert_eq!(
            PermissionCategory::from_permission_name("session.delete"),
            PermissionCategory::UserManagement
        );
        assert_eq!(
            PermissionCategory::from_permission_name("permission.read"),
            PermissionCategory::PermissionManagement
        );
        assert_eq!(
            PermissionCategory::from_permission_name("system.backup"),
            PermissionCategory::System
        );
    }

    #[test]
    fn test_category_string_round_trip() {
        for category in [
            PermissionCategory::UserManagement,
            PermissionCategory::RoleManagement,
            PermissionCategory::PermissionManagement,
            PermissionCategory::System,
        ] {
            assert_eq!(category.as_str().parse::<PermissionCategory>(), Ok(category));
        }
        assert!("Billing".parse::<PermissionCategory>().is_err());
    }
}
