use rbac_service::application::commands::CommandFactory;
use rbac_service::application::services::{RoleError, RoleHierarchyService};
use rbac_service::domain::hierarchy::build_hierarchy_tree;
use rbac_service::domain::permission::Permission;
use rbac_service::domain::role::Role;
use rbac_service::infrastructure::{InMemoryRoleRepository, RoleRepository};
use rbac_service::test_utils::{permission, role, state_with};
use std::collections::HashSet;
use std::sync::Arc;

struct Scenario {
    x: Permission,
    y: Permission,
    z: Permission,
    admin: Role,
    manager: Role,
    guest: Role,
}

fn scenario() -> Scenario {
    let x = permission("report.read");
    let y = permission("report.export");
    let z = permission("team.manage");
    let admin = role("admin", None, &[&x, &y]);
    let manager = role("manager", Some(&admin), &[&z]);
    let guest = role("guest", Some(&manager), &[]);
    Scenario {
        x,
        y,
        z,
        admin,
        manager,
        guest,
    }
}

fn hierarchy_over(roles: Vec<Role>) -> (Arc<InMemoryRoleRepository>, RoleHierarchyService) {
    let repo = Arc::new(InMemoryRoleRepository::with_roles(roles));
    let service = RoleHierarchyService::new(repo.clone());
    (repo, service)
}

#[tokio::test]
async fn test_levels_follow_parent_depth() {
    let s = scenario();
    assert_eq!(s.admin.level, 0);
    assert_eq!(s.manager.level, 1);
    assert_eq!(s.guest.level, 2);
}

#[tokio::test]
async fn test_guest_inherits_whole_chain() {
    let s = scenario();
    let (_, hierarchy) = hierarchy_over(vec![s.admin, s.manager, s.guest.clone()]);

    let effective = hierarchy
        .compute_effective_permissions(&s.guest.id)
        .await
        .unwrap();
    let expected: HashSet<String> = [s.x.id, s.y.id, s.z.id].into_iter().collect();
    assert_eq!(effective, expected);
}

#[tokio::test]
async fn test_cycle_detection_on_chain() {
    let s = scenario();
    let (_, hierarchy) =
        hierarchy_over(vec![s.admin.clone(), s.manager.clone(), s.guest.clone()]);

    assert!(hierarchy.would_create_cycle(&s.admin.id, &s.guest.id).await.unwrap());
    assert!(!hierarchy.would_create_cycle(&s.guest.id, &s.admin.id).await.unwrap());
    assert!(hierarchy.would_create_cycle(&s.manager.id, &s.manager.id).await.unwrap());
    assert!(matches!(
        hierarchy.would_create_cycle(&s.admin.id, "missing").await,
        Err(RoleError::ParentNotFound(id)) if id == "missing"
    ));
}

#[tokio::test]
async fn test_reroot_manager_relevels_subtree() {
    let s = scenario();
    let (repo, hierarchy) =
        hierarchy_over(vec![s.admin.clone(), s.manager.clone(), s.guest.clone()]);

    let mut manager = repo.get_role(&s.manager.id).await.unwrap().unwrap();
    manager.set_parent_role(None);
    repo.save_role(&manager).await.unwrap();

    let updated = hierarchy.propagate_levels(&s.manager.id).await.unwrap();
    assert_eq!(updated, 2);
    assert_eq!(repo.get_role(&s.manager.id).await.unwrap().unwrap().level, 0);
    assert_eq!(repo.get_role(&s.guest.id).await.unwrap().unwrap().level, 1);
    assert_eq!(repo.get_role(&s.admin.id).await.unwrap().unwrap().level, 0);

    let effective = hierarchy
        .compute_effective_permissions(&s.guest.id)
        .await
        .unwrap();
    assert_eq!(effective, HashSet::from([s.z.id]));
}

#[tokio::test]
async fn test_tree_nests_chain_under_single_root() {
    let s = scenario();
    let catalog = vec![s.x.clone(), s.y.clone(), s.z.clone()];
    let forest = build_hierarchy_tree(&[s.guest.clone(), s.admin.clone(), s.manager.clone()], &catalog);

    assert_eq!(forest.len(), 1);
    let root = &forest[0];
    assert_eq!(root.id, s.admin.id);
    assert_eq!(root.size(), 3);
    assert_eq!(root.children[0].id, s.manager.id);
    assert_eq!(root.children[0].children[0].id, s.guest.id);
    assert!(root.children[0].children[0].children.is_empty());
    assert_eq!(root.permissions.len(), 2);
}

#[tokio::test]
async fn test_tree_of_nothing_is_empty() {
    assert!(build_hierarchy_tree(&[], &[]).is_empty());
}

#[tokio::test]
async fn test_reparenting_under_descendant_is_rejected_through_bus() {
    let s = scenario();
    let state = state_with(
        vec![s.admin.clone(), s.manager.clone(), s.guest.clone()],
        vec![s.x, s.y, s.z],
    )
    .await;

    let result = state
        .command_bus
        .execute(CommandFactory::set_parent_role(
            s.admin.id.clone(),
            Some(s.guest.id.clone()),
            None,
        ))
        .await;
    let err = result.err().unwrap();
    assert!(matches!(
        err.downcast_ref::<RoleError>(),
        Some(RoleError::CircularReference { .. })
    ));

    // Nothing moved.
    let admin = state.role_repo.get_role(&s.admin.id).await.unwrap().unwrap();
    assert!(admin.parent_role_id.is_none());
    assert_eq!(admin.level, 0);
}

#[tokio::test]
async fn test_moving_subtree_under_new_parent_through_bus() {
    let s = scenario();
    let other = role("auditor", None, &[]);
    let state = state_with(
        vec![s.admin.clone(), s.manager.clone(), s.guest.clone(), other.clone()],
        vec![],
    )
    .await;

    state
        .command_bus
        .execute(CommandFactory::set_parent_role(
            other.id.clone(),
            Some(s.guest.id.clone()),
            None,
        ))
        .await
        .unwrap();
    state
        .command_bus
        .execute(CommandFactory::set_parent_role(
            s.manager.id.clone(),
            None,
            None,
        ))
        .await
        .unwrap();

    let level = |id: String| {
        let repo = state.role_repo.clone();
        async move { repo.get_role(&id).await.unwrap().unwrap().level }
    };
    assert_eq!(level(s.manager.id).await, 0);
    assert_eq!(level(s.guest.id).await, 1);
    assert_eq!(level(other.id).await, 2);
}
