use super::queries::{
    CheckRolePermissionQuery, CheckUserPermissionQuery, EffectivePermissions,
    GetEffectivePermissionsQuery, GetRoleByIdQuery, GetRoleHierarchyQuery, GetRolesForUserQuery,
    ListPermissionsQuery, ListRolesQuery, PaginatedResult,
};
use super::query_bus::QueryHandler;
use super::services::{AuthorizationService, RoleError, RoleHierarchyService};
use crate::domain::hierarchy::{RoleTreeNode, build_hierarchy_tree};
use crate::domain::permission::Permission;
use crate::domain::role::Role;
use crate::infrastructure::{PermissionRepository, RoleRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

const MAX_PAGE_SIZE: u32 = 100;

/// Get role by ID query handler
pub struct GetRoleByIdQueryHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
}

impl GetRoleByIdQueryHandler {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self { role_repo }
    }
}

#[async_trait]
impl QueryHandler<GetRoleByIdQuery> for GetRoleByIdQueryHandler {
    type Result = Role;
    type Error = RoleError;

    #[instrument(name = "get_role_by_id_query_handler", skip(self, query), fields(role_id = %query.role_id))]
    async fn handle(&self, query: GetRoleByIdQuery) -> Result<Self::Result, Self::Error> {
        self.role_repo
            .get_role(&query.role_id)
            .await?
            .ok_or(RoleError::RoleNotFound(query.role_id))
    }
}

/// List roles query handler. Roles are ordered by level, then name.
pub struct ListRolesQueryHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
}

impl ListRolesQueryHandler {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self { role_repo }
    }
}

#[async_trait]
impl QueryHandler<ListRolesQuery> for ListRolesQueryHandler {
    type Result = PaginatedResult<Role>;
    type Error = RoleError;

    #[instrument(name = "list_roles_query_handler", skip(self, query))]
    async fn handle(&self, query: ListRolesQuery) -> Result<Self::Result, Self::Error> {
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let filter = query.name_filter.map(|f| f.to_lowercase());

        let mut roles: Vec<Role> = self
            .role_repo
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| {
                filter
                    .as_deref()
                    .is_none_or(|f| r.name.to_lowercase().contains(f))
            })
            .collect();
        roles.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));

        let total_count = roles.len() as u64;
        let items = roles
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        Ok(PaginatedResult::new(items, total_count, page, page_size))
    }
}

/// Role hierarchy query handler
pub struct GetRoleHierarchyQueryHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
}

impl GetRoleHierarchyQueryHandler {
    pub fn new(
        role_repo: Arc<dyn RoleRepository + Send + Sync>,
        permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    ) -> Self {
        Self {
            role_repo,
            permission_repo,
        }
    }
}

#[async_trait]
impl QueryHandler<GetRoleHierarchyQuery> for GetRoleHierarchyQueryHandler {
    type Result = Vec<RoleTreeNode>;
    type Error = RoleError;

    #[instrument(name = "get_role_hierarchy_query_handler", skip(self, _query))]
    async fn handle(&self, _query: GetRoleHierarchyQuery) -> Result<Self::Result, Self::Error> {
        let roles = self.role_repo.list_roles().await?;
        let catalog = self.permission_repo.list_permissions().await?;
        Ok(build_hierarchy_tree(&roles, &catalog))
    }
}

/// Effective permissions query handler
pub struct GetEffectivePermissionsQueryHandler {
    hierarchy: Arc<RoleHierarchyService>,
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
}

impl GetEffectivePermissionsQueryHandler {
    pub fn new(
        hierarchy: Arc<RoleHierarchyService>,
        permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    ) -> Self {
        Self {
            hierarchy,
            permission_repo,
        }
    }
}

#[async_trait]
impl QueryHandler<GetEffectivePermissionsQuery> for GetEffectivePermissionsQueryHandler {
    type Result = EffectivePermissions;
    type Error = RoleError;

    #[instrument(name = "get_effective_permissions_query_handler", skip(self, query), fields(role_id = %query.role_id))]
    async fn handle(
        &self,
        query: GetEffectivePermissionsQuery,
    ) -> Result<Self::Result, Self::Error> {
        let effective = self
            .hierarchy
            .compute_effective_permissions(&query.role_id)
            .await?;

        let mut permission_ids: Vec<String> = effective.into_iter().collect();
        permission_ids.sort();

        let permissions: Vec<Permission> = self
            .permission_repo
            .list_permissions()
            .await?
            .into_iter()
            .filter(|p| permission_ids.binary_search(&p.id).is_ok())
            .collect();

        Ok(EffectivePermissions {
            role_id: query.role_id,
            permission_ids,
            permissions,
        })
    }
}

pub struct CheckRolePermissionQueryHandler {
    hierarchy: Arc<RoleHierarchyService>,
}

impl CheckRolePermissionQueryHandler {
    pub fn new(hierarchy: Arc<RoleHierarchyService>) -> Self {
        Self { hierarchy }
    }
}

#[async_trait]
impl QueryHandler<CheckRolePermissionQuery> for CheckRolePermissionQueryHandler {
    type Result = bool;
    type Error = RoleError;

    #[instrument(name = "check_role_permission_query_handler", skip(self))]
    async fn handle(&self, query: CheckRolePermissionQuery) -> Result<Self::Result, Self::Error> {
        self.hierarchy
            .has_permission(&query.role_id, &query.permission_id)
            .await
    }
}

/// Check user permission query handler
pub struct CheckUserPermissionQueryHandler {
    authorization: Arc<AuthorizationService>,
}

impl CheckUserPermissionQueryHandler {
    pub fn new(authorization: Arc<AuthorizationService>) -> Self {
        Self { authorization }
    }
}

#[async_trait]
impl QueryHandler<CheckUserPermissionQuery> for CheckUserPermissionQueryHandler {
    type Result = bool;
    type Error = RoleError;

    #[instrument(name = "check_user_permission_query_handler", skip(self))]
    async fn handle(&self, query: CheckUserPermissionQuery) -> Result<Self::Result, Self::Error> {
        self.authorization
            .user_has_permission(&query.user_id, &query.permission_name)
            .await
    }
}

pub struct GetRolesForUserQueryHandler {
    role_repo: Arc<dyn RoleRepository + Send + Sync>,
}

impl GetRolesForUserQueryHandler {
    pub fn new(role_repo: Arc<dyn RoleRepository + Send + Sync>) -> Self {
        Self { role_repo }
    }
}

#[async_trait]
impl QueryHandler<GetRolesForUserQuery> for GetRolesForUserQueryHandler {
    type Result = Vec<Role>;
    type Error = RoleError;

    #[instrument(name = "get_roles_for_user_query_handler", skip(self))]
    async fn handle(&self, query: GetRolesForUserQuery) -> Result<Self::Result, Self::Error> {
        Ok(self.role_repo.get_roles_for_user(&query.user_id).await?)
    }
}

/// List permissions query handler
pub struct ListPermissionsQueryHandler {
    permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
}

impl ListPermissionsQueryHandler {
    pub fn new(permission_repo: Arc<dyn PermissionRepository + Send + Sync>) -> Self {
        Self { permission_repo }
    }
}

#[async_trait]
impl QueryHandler<ListPermissionsQuery> for ListPermissionsQueryHandler {
    type Result = Vec<Permission>;
    type Error = RoleError;

    #[instrument(name = "list_permissions_query_handler", skip(self))]
    async fn handle(&self, query: ListPermissionsQuery) -> Result<Self::Result, Self::Error> {
        let permissions = self.permission_repo.list_permissions().await?;
        Ok(match query.category_filter {
            Some(category) => permissions
                .into_iter()
                .filter(|p| p.category == category)
                .collect(),
            None => permissions,
        })
    }
}
