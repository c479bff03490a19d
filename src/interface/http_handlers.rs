use crate::application::commands::CommandFactory;
use crate::application::queries::{EffectivePermissions, PaginatedResult, QueryFactory};
use crate::application::services::RoleError;
use crate::domain::hierarchy::RoleTreeNode;
use crate::domain::permission::Permission;
use crate::domain::role::Role;
use crate::interface::app_state::AppState;
use crate::interface::{
    AssignRoleRequest, CloneRoleRequest, CreatePermissionRequest, CreateRoleRequest,
    EffectivePermissionsResponse, ErrorResponse, ListPermissionsParams, ListRolesParams,
    PermissionCheckResponse, PermissionResponse, PermissionsListResponse, RemoveRoleRequest,
    RolePermissionsRequest, RoleResponse, RolesListResponse, SetParentRoleRequest,
    SuccessResponse, UpdateRoleRequest, UserRolesResponse,
};
use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::{StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, warn};

type BusError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult<T> = Result<T, Response>;

/// Caller identity taken from the `x-user-id` header.
pub struct RequirePermission {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for RequirePermission
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing user id"))?;
        Ok(RequirePermission { user_id })
    }
}

fn status_for(error: &RoleError) -> StatusCode {
    match error {
        RoleError::RoleNotFound(_) | RoleError::PermissionNotFound(_) => StatusCode::NOT_FOUND,
        RoleError::ParentNotFound(_)
        | RoleError::CircularReference { .. }
        | RoleError::Validation(_) => StatusCode::BAD_REQUEST,
        RoleError::NameTaken(_)
        | RoleError::PermissionNameTaken(_)
        | RoleError::HasChildren(_)
        | RoleError::AssignedToUsers { .. } => StatusCode::CONFLICT,
        RoleError::DanglingReference { .. }
        | RoleError::IntegrityViolation(_)
        | RoleError::PropagationFailed { .. }
        | RoleError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: BusError) -> Response {
    match error.downcast::<RoleError>() {
        Ok(role_error) => {
            let status = status_for(&role_error);
            if status.is_server_error() {
                error!(error = %role_error, "Request failed");
                (status, Json(ErrorResponse::new("Internal server error"))).into_response()
            } else {
                warn!(error = %role_error, "Request rejected");
                (status, Json(ErrorResponse::new(role_error.to_string()))).into_response()
            }
        }
        Err(other) => {
            error!(error = %other, "Bus execution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            )
                .into_response()
        }
    }
}

fn downcast<T: 'static>(result: Result<Box<dyn Any + Send + Sync>, BusError>) -> HandlerResult<T> {
    let value = result.map_err(error_response)?;
    value.downcast::<T>().map(|b| *b).map_err(|_| {
        error!(expected = std::any::type_name::<T>(), "Invalid result type from bus");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Internal server error")),
        )
            .into_response()
    })
}

/// Resolves the caller's effective permissions and rejects with 403 when `permission`
/// is missing.
async fn ensure_permission(state: &AppState, user_id: &str, permission: &str) -> HandlerResult<()> {
    let allowed: bool = downcast(
        state
            .query_bus
            .execute(QueryFactory::check_user_permission(
                user_id.to_string(),
                permission.to_string(),
            ))
            .await,
    )?;
    if !allowed {
        warn!(user_id, permission, "Permission denied");
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new("Insufficient permissions")),
        )
            .into_response());
    }
    Ok(())
}

// --- ROLE HANDLERS ---

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 400, description = "Invalid input or unknown parent", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 409, description = "Role name already exists", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Create a role, optionally under a parent. Requires role.create."
)]
pub async fn create_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Json(payload): Json<CreateRoleRequest>,
) -> HandlerResult<(StatusCode, Json<RoleResponse>)> {
    ensure_permission(&state, &user_id, "role.create").await?;
    let cmd = CommandFactory::create_role(
        payload.name,
        payload.description,
        payload.permissions,
        payload.parent_role_id,
        Some(user_id),
    );
    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/roles",
    params(ListRolesParams),
    responses(
        (status = 200, description = "Page of roles ordered by level", body = RolesListResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "List roles. Requires role.read."
)]
pub async fn list_roles_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Query(params): Query<ListRolesParams>,
) -> HandlerResult<Json<RolesListResponse>> {
    ensure_permission(&state, &user_id, "role.read").await?;
    let query = QueryFactory::list_roles(
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(20),
        params.name,
    );
    let page: PaginatedResult<Role> = downcast(state.query_bus.execute(query).await)?;
    Ok(Json(page.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/roles/hierarchy",
    responses(
        (status = 200, description = "Role forest", body = [RoleTreeNode]),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Nested view of all roles. Requires role.read."
)]
pub async fn get_role_hierarchy_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
) -> HandlerResult<Json<Vec<RoleTreeNode>>> {
    ensure_permission(&state, &user_id, "role.read").await?;
    let forest: Vec<RoleTreeNode> =
        downcast(state.query_bus.execute(QueryFactory::get_role_hierarchy()).await)?;
    Ok(Json(forest))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/roles/{role_id}",
    params(("role_id" = String, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = RoleResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Fetch one role. Requires role.read."
)]
pub async fn get_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
) -> HandlerResult<Json<RoleResponse>> {
    ensure_permission(&state, &user_id, "role.read").await?;
    let role: Role = downcast(
        state
            .query_bus
            .execute(QueryFactory::get_role_by_id(role_id))
            .await,
    )?;
    Ok(Json(role.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    put,
    path = "/v1/rbac/roles/{role_id}",
    params(("role_id" = String, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 400, description = "Invalid input, unknown parent or circular reference", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Update a role. A parent change re-levels the role's subtree. Requires role.update."
)]
pub async fn update_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> HandlerResult<Json<RoleResponse>> {
    ensure_permission(&state, &user_id, "role.update").await?;
    let mut cmd = CommandFactory::update_role(role_id);
    cmd.name = payload.name;
    cmd.description = payload.description;
    cmd.permission_ids = payload.permissions;
    cmd.parent_role_id = payload.parent_role_id;
    cmd.actor_id = Some(user_id);

    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(role.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/v1/rbac/roles/{role_id}",
    params(("role_id" = String, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role deleted", body = SuccessResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 409, description = "Role has children or assigned users", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Delete a role with no children and no users. Requires role.delete."
)]
pub async fn delete_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
) -> HandlerResult<Json<SuccessResponse>> {
    ensure_permission(&state, &user_id, "role.delete").await?;
    let () = downcast(
        state
            .command_bus
            .execute(CommandFactory::delete_role(role_id, Some(user_id)))
            .await,
    )?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Role deleted successfully".to_string(),
    }))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/roles/{role_id}/clone",
    params(("role_id" = String, Path, description = "Role to copy")),
    request_body = CloneRoleRequest,
    responses(
        (status = 201, description = "Role cloned", body = RoleResponse),
        (status = 404, description = "Source role not found", body = ErrorResponse),
        (status = 409, description = "Role name already exists", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Copy a role's permissions and parent under a new name. Requires role.create."
)]
pub async fn clone_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
    Json(payload): Json<CloneRoleRequest>,
) -> HandlerResult<(StatusCode, Json<RoleResponse>)> {
    ensure_permission(&state, &user_id, "role.create").await?;
    let cmd = CommandFactory::clone_role(role_id, payload.name, payload.description, Some(user_id));
    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

#[axum::debug_handler]
#[utoipa::path(
    put,
    path = "/v1/rbac/roles/{role_id}/parent",
    params(("role_id" = String, Path, description = "Role ID")),
    request_body = SetParentRoleRequest,
    responses(
        (status = 200, description = "Parent set", body = RoleResponse),
        (status = 400, description = "Unknown parent or circular reference", body = ErrorResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Move a role under a new parent, or to the root with null. Requires role.update."
)]
pub async fn set_parent_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
    Json(payload): Json<SetParentRoleRequest>,
) -> HandlerResult<Json<RoleResponse>> {
    ensure_permission(&state, &user_id, "role.update").await?;
    let cmd = CommandFactory::set_parent_role(role_id, payload.parent_role_id, Some(user_id));
    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(role.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/roles/{role_id}/effective-permissions",
    params(("role_id" = String, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Own and inherited permissions", body = EffectivePermissionsResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Union of the role's permissions and those of all its ancestors. Requires role.read."
)]
pub async fn get_effective_permissions_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
) -> HandlerResult<Json<EffectivePermissionsResponse>> {
    ensure_permission(&state, &user_id, "role.read").await?;
    let effective: EffectivePermissions = downcast(
        state
            .query_bus
            .execute(QueryFactory::get_effective_permissions(role_id))
            .await,
    )?;
    Ok(Json(effective.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/roles/{role_id}/permissions/{permission_id}",
    params(
        ("role_id" = String, Path, description = "Role ID"),
        ("permission_id" = String, Path, description = "Permission ID"),
    ),
    responses(
        (status = 200, description = "Whether the role holds the permission, directly or inherited", body = PermissionCheckResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Check one permission against a role's effective set. Requires role.read."
)]
pub async fn check_role_permission_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path((role_id, permission_id)): Path<(String, String)>,
) -> HandlerResult<Json<PermissionCheckResponse>> {
    ensure_permission(&state, &user_id, "role.read").await?;
    let allowed: bool = downcast(
        state
            .query_bus
            .execute(QueryFactory::check_role_permission(
                role_id.clone(),
                permission_id.clone(),
            ))
            .await,
    )?;
    Ok(Json(PermissionCheckResponse {
        role_id,
        permission_id,
        allowed,
    }))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/roles/{role_id}/permissions",
    params(("role_id" = String, Path, description = "Role ID")),
    request_body = RolePermissionsRequest,
    responses(
        (status = 200, description = "Permissions assigned", body = RoleResponse),
        (status = 404, description = "Role or permission not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Grant permissions directly to a role. Requires role.update."
)]
pub async fn assign_role_permissions_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
    Json(payload): Json<RolePermissionsRequest>,
) -> HandlerResult<Json<RoleResponse>> {
    ensure_permission(&state, &user_id, "role.update").await?;
    let cmd =
        CommandFactory::assign_permissions_to_role(role_id, payload.permission_ids, Some(user_id));
    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(role.into()))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/v1/rbac/roles/{role_id}/permissions",
    params(("role_id" = String, Path, description = "Role ID")),
    request_body = RolePermissionsRequest,
    responses(
        (status = 200, description = "Permissions removed", body = RoleResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Roles"],
    description = "Revoke directly granted permissions from a role. Requires role.update."
)]
pub async fn remove_role_permissions_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(role_id): Path<String>,
    Json(payload): Json<RolePermissionsRequest>,
) -> HandlerResult<Json<RoleResponse>> {
    ensure_permission(&state, &user_id, "role.update").await?;
    let cmd = CommandFactory::remove_permissions_from_role(
        role_id,
        payload.permission_ids,
        Some(user_id),
    );
    let role: Role = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(role.into()))
}

// --- ROLE ASSIGNMENT HANDLERS ---

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/roles/assign",
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = SuccessResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
    ),
    tags = ["Assignments"],
    description = "Assign a role to a user. Requires user.update."
)]
pub async fn assign_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Json(payload): Json<AssignRoleRequest>,
) -> HandlerResult<Json<SuccessResponse>> {
    ensure_permission(&state, &user_id, "user.update").await?;
    let cmd = CommandFactory::assign_role_to_user(payload.user_id, payload.role_id, Some(user_id));
    let () = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Role assigned successfully".to_string(),
    }))
}

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/roles/remove",
    request_body = RemoveRoleRequest,
    responses(
        (status = 200, description = "Role removed", body = SuccessResponse),
    ),
    tags = ["Assignments"],
    description = "Remove a role from a user. Requires user.update."
)]
pub async fn remove_role_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Json(payload): Json<RemoveRoleRequest>,
) -> HandlerResult<Json<SuccessResponse>> {
    ensure_permission(&state, &user_id, "user.update").await?;
    let cmd =
        CommandFactory::remove_role_from_user(payload.user_id, payload.role_id, Some(user_id));
    let () = downcast(state.command_bus.execute(cmd).await)?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Role removed successfully".to_string(),
    }))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/users/{user_id}/roles",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Roles assigned to the user", body = UserRolesResponse),
    ),
    tags = ["Assignments"],
    description = "List a user's directly assigned roles. Requires user.read."
)]
pub async fn get_user_roles_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(target_user_id): Path<String>,
) -> HandlerResult<Json<UserRolesResponse>> {
    ensure_permission(&state, &user_id, "user.read").await?;
    let roles: Vec<Role> = downcast(
        state
            .query_bus
            .execute(QueryFactory::get_roles_for_user(target_user_id.clone()))
            .await,
    )?;
    Ok(Json(UserRolesResponse {
        user_id: target_user_id,
        roles: roles.into_iter().map(RoleResponse::from).collect(),
    }))
}

// --- PERMISSION HANDLERS ---

#[axum::debug_handler]
#[utoipa::path(
    post,
    path = "/v1/rbac/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Permission name already exists", body = ErrorResponse),
    ),
    tags = ["Permissions"],
    description = "Add a permission to the catalog. Requires permission.create."
)]
pub async fn create_permission_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Json(payload): Json<CreatePermissionRequest>,
) -> HandlerResult<(StatusCode, Json<PermissionResponse>)> {
    ensure_permission(&state, &user_id, "permission.create").await?;
    let cmd = CommandFactory::create_permission(
        payload.name,
        payload.description,
        payload.category,
        Some(user_id),
    );
    let permission: Permission = downcast(state.command_bus.execute(cmd).await)?;
    Ok((StatusCode::CREATED, Json(permission.into())))
}

#[axum::debug_handler]
#[utoipa::path(
    get,
    path = "/v1/rbac/permissions",
    params(ListPermissionsParams),
    responses(
        (status = 200, description = "Permission catalog", body = PermissionsListResponse),
    ),
    tags = ["Permissions"],
    description = "List the permission catalog, optionally by category. Requires permission.read."
)]
pub async fn list_permissions_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Query(params): Query<ListPermissionsParams>,
) -> HandlerResult<Json<PermissionsListResponse>> {
    ensure_permission(&state, &user_id, "permission.read").await?;
    let permissions: Vec<Permission> = downcast(
        state
            .query_bus
            .execute(QueryFactory::list_permissions(params.category))
            .await,
    )?;
    Ok(Json(PermissionsListResponse {
        permissions: permissions.into_iter().map(PermissionResponse::from).collect(),
    }))
}

#[axum::debug_handler]
#[utoipa::path(
    delete,
    path = "/v1/rbac/permissions/{permission_id}",
    params(("permission_id" = String, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission deleted", body = SuccessResponse),
        (status = 404, description = "Permission not found", body = ErrorResponse),
    ),
    tags = ["Permissions"],
    description = "Delete a permission and revoke it from every role. Requires permission.delete."
)]
pub async fn delete_permission_handler(
    State(state): State<Arc<AppState>>,
    RequirePermission { user_id }: RequirePermission,
    Path(permission_id): Path<String>,
) -> HandlerResult<Json<SuccessResponse>> {
    ensure_permission(&state, &user_id, "permission.delete").await?;
    let () = downcast(
        state
            .command_bus
            .execute(CommandFactory::delete_permission(permission_id, Some(user_id)))
            .await,
    )?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Permission deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::validators::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RoleError::RoleNotFound("r".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RoleError::CircularReference {
                role_id: "a".into(),
                parent_id: "b".into()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RoleError::Validation(ValidationError::BusinessRule {
                message: "x".into()
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RoleError::HasChildren("r".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&RoleError::IntegrityViolation("loop".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
