//! Forest view of the role hierarchy.
//!
//! Builds nested nodes from a flat role list in a single grouping pass. Roots are roles
//! without a parent, and roles whose parent is absent from the input (a dangling
//! reference resolves to nothing, the same as an unpopulated parent).

use crate::domain::permission::{Permission, PermissionCategory};
use crate::domain::role::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use utoipa::ToSchema;

/// Permission as shown inside a hierarchy node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct PermissionSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: PermissionCategory,
}

impl From<&Permission> for PermissionSummary {
    fn from(p: &Permission) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
            category: p.category,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleTreeNode {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<PermissionSummary>,
    pub parent_role_id: Option<String>,
    pub level: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(no_recursion)]
    pub children: Vec<RoleTreeNode>,
}

impl RoleTreeNode {
    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(RoleTreeNode::size).sum::<usize>()
    }
}

/// Builds the role forest. Siblings are ordered by name then id, so the result does
/// not depend on the order of `roles`. Permission ids missing from `catalog` are
/// skipped.
pub fn build_hierarchy_tree(roles: &[Role], catalog: &[Permission]) -> Vec<RoleTreeNode> {
    let known: HashSet<&str> = roles.iter().map(|r| r.id.as_str()).collect();
    let permissions: HashMap<&str, &Permission> =
        catalog.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut by_parent: HashMap<Option<&str>, Vec<&Role>> = HashMap::new();
    for role in roles {
        let parent = role
            .parent_role_id
            .as_deref()
            .filter(|id| known.contains(id));
        by_parent.entry(parent).or_default().push(role);
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    }

    let forest = build_level(None, &by_parent, &permissions);

    let placed: usize = forest.iter().map(RoleTreeNode::size).sum();
    if placed < roles.len() {
        // Only roles caught in a parent cycle are unreachable from a root.
        warn!(
            total = roles.len(),
            placed, "Role hierarchy contains roles unreachable from any root"
        );
    }
    forest
}

fn build_level(
    parent: Option<&str>,
    by_parent: &HashMap<Option<&str>, Vec<&Role>>,
    permissions: &HashMap<&str, &Permission>,
) -> Vec<RoleTreeNode> {
    let Some(siblings) = by_parent.get(&parent) else {
        return Vec::new();
    };
    siblings
        .iter()
        .map(|role| {
            let mut perms: Vec<PermissionSummary> = role
                .permissions
                .iter()
                .filter_map(|id| permissions.get(id.as_str()))
                .map(|p| PermissionSummary::from(*p))
                .collect();
            perms.sort_by(|a, b| a.name.cmp(&b.name));

            RoleTreeNode {
                id: role.id.clone(),
                name: role.name.clone(),
                description: role.description.clone(),
                permissions: perms,
                parent_role_id: role.parent_role_id.clone(),
                level: role.level,
                created_by: role.created_by.clone(),
                created_at: role.created_at,
                updated_at: role.updated_at,
                children: build_level(Some(role.id.as_str()), by_parent, permissions),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: &str, name: &str, parent: Option<&str>, level: u32) -> Role {
        let mut r = Role::new(name.to_string(), format!("{name} role"), None);
        r.id = id.to_string();
        r.parent_role_id = parent.map(str::to_string);
        r.level = level;
        r
    }

    fn shape(nodes: &[RoleTreeNode]) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        for n in nodes {
            out.push((n.id.clone(), n.children.iter().map(|c| c.id.clone()).collect()));
            out.extend(shape(&n.children));
        }
        out
    }

    #[test]
    fn test_empty_input_gives_empty_forest() {
        assert!(build_hierarchy_tree(&[], &[]).is_empty());
    }

    #[test]
    fn test_builds_nested_forest() {
        let roles = vec![
            role("a", "admin", None, 0),
            role("m", "manager", Some("a"), 1),
            role("g", "guest", Some("m"), 2),
            role("o", "auditor", None, 0),
        ];
        let forest = build_hierarchy_tree(&roles, &[]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].name, "admin");
        assert_eq!(forest[1].name, "auditor");
        assert_eq!(forest[0].children[0].id, "m");
        assert_eq!(forest[0].children[0].children[0].id, "g");
        assert_eq!(forest[0].size(), 3);
    }

    #[test]
    fn test_build_is_independent_of_input_order() {
        let mut roles = vec![
            role("a", "admin", None, 0),
            role("b", "billing", Some("a"), 1),
            role("c", "clerk", Some("a"), 1),
            role("d", "driver", Some("c"), 2),
        ];
        let first = build_hierarchy_tree(&roles, &[]);
        roles.reverse();
        let second = build_hierarchy_tree(&roles, &[]);
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_dangling_parent_is_rendered_as_root() {
        let roles = vec![role("x", "orphan", Some("missing"), 1)];
        let forest = build_hierarchy_tree(&roles, &[]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, "x");
    }

    #[test]
    fn test_cyclic_roles_do_not_loop() {
        let roles = vec![
            role("r", "root", None, 0),
            role("p", "p", Some("q"), 1),
            role("q", "q", Some("p"), 1),
        ];
        let forest = build_hierarchy_tree(&roles, &[]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, "r");
    }

    #[test]
    fn test_permissions_are_resolved_from_catalog() {
        let read = Permission::new(
            "role.read".to_string(),
            "Read roles".to_string(),
            PermissionCategory::RoleManagement,
            None,
        );
        let mut admin = role("a", "admin", None, 0);
        admin.permissions.insert(read.id.clone());
        admin.permissions.insert("unknown".to_string());

        let forest = build_hierarchy_tree(&[admin], std::slice::from_ref(&read));
        assert_eq!(forest[0].permissions.len(), 1);
        assert_eq!(forest[0].permissions[0].name, "role.read");
    }
}
