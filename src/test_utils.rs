//! Fixtures shared by unit and integration tests.

use crate::AppStateBuilder;
use crate::application::seeder::Seeder;
use crate::domain::permission::{Permission, PermissionCategory};
use crate::domain::role::Role;
use crate::infrastructure::{InMemoryPermissionRepository, InMemoryRoleRepository};
use crate::interface::app_state::AppState;
use std::sync::Arc;

/// User id given the `admin` role by [`seeded_state`].
pub const TEST_ADMIN_USER_ID: &str = "admin-user";

/// Creates an active permission whose category follows its dotted name.
pub fn permission(name: &str) -> Permission {
    Permission::new(
        name.to_string(),
        format!("{name} permission"),
        PermissionCategory::from_permission_name(name),
        None,
    )
}

/// Creates a role under `parent` with its level already set.
pub fn role(name: &str, parent: Option<&Role>, permissions: &[&Permission]) -> Role {
    let mut role = Role::new(name.to_string(), format!("{name} role"), None)
        .with_permissions(permissions.iter().map(|p| p.id.clone()));
    role.parent_role_id = parent.map(|p| p.id.clone());
    role.level = Role::level_under(parent);
    role
}

/// Empty in-memory application state.
pub async fn in_memory_state() -> Arc<AppState> {
    AppStateBuilder::new()
        .with_in_memory()
        .build()
        .await
        .expect("in-memory state builds")
}

/// In-memory state preloaded with the given roles and permissions.
pub async fn state_with(roles: Vec<Role>, permissions: Vec<Permission>) -> Arc<AppState> {
    AppStateBuilder::new()
        .with_repositories(
            Arc::new(InMemoryRoleRepository::with_roles(roles)),
            Arc::new(InMemoryPermissionRepository::with_permissions(permissions)),
        )
        .build()
        .await
        .expect("in-memory state builds")
}

/// In-memory state with the base catalog seeded and [`TEST_ADMIN_USER_ID`] as admin.
pub async fn seeded_state() -> Arc<AppState> {
    let state = in_memory_state().await;
    Seeder::new(
        state.role_repo.clone(),
        state.permission_repo.clone(),
        state.hierarchy_service.clone(),
    )
    .run(Some(TEST_ADMIN_USER_ID))
    .await
    .expect("seeding succeeds");
    state
}
