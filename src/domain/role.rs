use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role entity: a node in the role hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: HashSet<String>,   // permission IDs
    pub parent_role_id: Option<String>, // for role inheritance
    pub level: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a root role with a fresh id and no permissions.
    pub fn new(name: String, description: String, created_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            permissions: HashSet::new(),
            parent_role_id: None,
            level: 0,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.permissions.extend(permissions);
        self
    }

    /// Adds a permission to the role. Returns false if it was already present.
    pub fn add_permission(&mut self, permission_id: String) -> bool {
        let added = self.permissions.insert(permission_id);
        if added {
            self.touch();
        }
        added
    }

    /// Removes a permission from the role.
    pub fn remove_permission(&mut self, permission_id: &str) -> bool {
        let removed = self.permissions.remove(permission_id);
        if removed {
            self.touch();
        }
        removed
    }

    /// Sets the parent role for inheritance. The level is not recomputed here.
    pub fn set_parent_role(&mut self, parent_role_id: Option<String>) {
        self.parent_role_id = parent_role_id;
        self.touch();
    }

    /// Level a role takes under the given parent (root when `None`).
    pub fn level_under(parent: Option<&Role>) -> u32 {
        parent.map_or(0, |p| p.level + 1)
    }

    /// Updates the stored level. Returns true if it changed.
    pub fn set_level(&mut self, level: u32) -> bool {
        if self.level == level {
            return false;
        }
        self.level = level;
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_role() -> Role {
        Role::new("admin".to_string(), "Administrators".to_string(), None)
            .with_permissions(["perm1".to_string()])
    }

    #[test]
    fn test_new_role_is_root() {
        let role = test_role();
        assert!(role.parent_role_id.is_none());
        assert_eq!(role.level, 0);
        assert!(!role.id.is_empty());
        assert_eq!(role.created_at, role.updated_at);
    }

    #[test]
    fn test_add_and_remove_permission() {
        let mut role = test_role();
        assert!(role.add_permission("perm2".to_string()));
        assert!(!role.add_permission("perm2".to_string()));
        assert_eq!(role.permissions.len(), 2);
        assert!(role.remove_permission("perm1"));
        assert!(!role.permissions.contains("perm1"));
        assert!(!role.remove_permission("perm1"));
    }

    #[test]
    fn test_parent_role_management() {
        let mut role = test_role();

        role.set_parent_role(Some("parent_role".to_string()));
        assert_eq!(role.parent_role_id.as_deref(), Some("parent_role"));

        role.set_parent_role(None);
        assert!(role.parent_role_id.is_none());
    }

    #[test]
    fn test_level_under_parent() {
        let mut parent = test_role();
        assert_eq!(Role::level_under(None), 0);
        assert_eq!(Role::level_under(Some(&parent)), 1);
        parent.level = 4;
        assert_eq!(Role::level_under(Some(&parent)), 5);
    }

    #[test]
    fn test_set_level_reports_change() {
        let mut role = test_role();
        assert!(!role.set_level(0));
        assert!(role.set_level(2));
        assert_eq!(role.level, 2);
    }
}
