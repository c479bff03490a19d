// Interface layer: HTTP APIs, controllers, DTOs

use crate::application::queries::{EffectivePermissions, PaginatedResult};
use crate::domain::permission::{Permission, PermissionCategory};
use crate::domain::role::Role;
use axum::Router;
use axum::routing::{delete, get, post, put};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: String,
    /// Permission ids granted directly to the role.
    #[serde(default)]
    pub permissions: Vec<String>,
    pub parent_role_id: Option<String>,
}

/// Partial update. Omitted fields are left unchanged; `"parent_role_id": null` moves the
/// role to the root.
#[derive(Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateRoleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, nullable)]
    pub parent_role_id: Option<Option<String>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SetParentRoleRequest {
    pub parent_role_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CloneRoleRequest {
    pub name: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RolePermissionsRequest {
    pub permission_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub user_id: String,
    pub role_id: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RemoveRoleRequest {
    pub user_id: String,
    pub role_id: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub description: String,
    pub category: Option<PermissionCategory>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRolesParams {
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Case-insensitive substring match on the role name.
    pub name: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPermissionsParams {
    pub category: Option<PermissionCategory>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub parent_role_id: Option<String>,
    pub level: u32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        let mut permissions: Vec<String> = role.permissions.into_iter().collect();
        permissions.sort();
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            permissions,
            parent_role_id: role.parent_role_id,
            level: role.level,
            created_by: role.created_by,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RolesListResponse {
    pub roles: Vec<RoleResponse>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl From<PaginatedResult<Role>> for RolesListResponse {
    fn from(result: PaginatedResult<Role>) -> Self {
        Self {
            roles: result.items.into_iter().map(RoleResponse::from).collect(),
            total_count: result.total_count,
            page: result.page,
            page_size: result.page_size,
            total_pages: result.total_pages,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: String,
    pub roles: Vec<RoleResponse>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: PermissionCategory,
    pub is_active: bool,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            category: p.category,
            is_active: p.is_active,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PermissionsListResponse {
    pub permissions: Vec<PermissionResponse>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub role_id: String,
    pub permission_ids: Vec<String>,
    pub permissions: Vec<PermissionResponse>,
}

impl From<EffectivePermissions> for EffectivePermissionsResponse {
    fn from(e: EffectivePermissions) -> Self {
        Self {
            role_id: e.role_id,
            permission_ids: e.permission_ids,
            permissions: e.permissions.into_iter().map(PermissionResponse::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub role_id: String,
    pub permission_id: String,
    pub allowed: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

pub mod app_state;
pub mod http_handlers;

/// RBAC routes, relative to the `/v1` prefix.
pub fn rbac_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rbac/roles", post(create_role_handler).get(list_roles_handler))
        .route("/rbac/roles/hierarchy", get(get_role_hierarchy_handler))
        .route("/rbac/roles/assign", post(assign_role_handler))
        .route("/rbac/roles/remove", post(remove_role_handler))
        .route(
            "/rbac/roles/{role_id}",
            get(get_role_handler)
                .put(update_role_handler)
                .delete(delete_role_handler),
        )
        .route("/rbac/roles/{role_id}/clone", post(clone_role_handler))
        .route("/rbac/roles/{role_id}/parent", put(set_parent_role_handler))
        .route(
            "/rbac/roles/{role_id}/effective-permissions",
            get(get_effective_permissions_handler),
        )
        .route(
            "/rbac/roles/{role_id}/permissions",
            post(assign_role_permissions_handler).delete(remove_role_permissions_handler),
        )
        .route(
            "/rbac/roles/{role_id}/permissions/{permission_id}",
            get(check_role_permission_handler),
        )
        .route("/rbac/users/{user_id}/roles", get(get_user_roles_handler))
        .route(
            "/rbac/permissions",
            post(create_permission_handler).get(list_permissions_handler),
        )
        .route(
            "/rbac/permissions/{permission_id}",
            delete(delete_permission_handler),
        )
}

pub use app_state::AppState;
pub use http_handlers::{
    assign_role_handler, assign_role_permissions_handler, check_role_permission_handler,
    clone_role_handler, create_permission_handler, create_role_handler, delete_permission_handler,
    delete_role_handler, get_effective_permissions_handler, get_role_handler,
    get_role_hierarchy_handler, get_user_roles_handler, list_permissions_handler,
    list_roles_handler, remove_role_handler, remove_role_permissions_handler,
    set_parent_role_handler, update_role_handler,
};
