use crate::application::command_bus::CommandBus;
use crate::application::query_bus::QueryBus;
use crate::application::services::{AuthorizationService, RoleHierarchyService};
use crate::infrastructure::{PermissionRepository, RoleRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub role_repo: Arc<dyn RoleRepository + Send + Sync>,
    pub permission_repo: Arc<dyn PermissionRepository + Send + Sync>,
    pub hierarchy_service: Arc<RoleHierarchyService>,
    pub authorization_service: Arc<AuthorizationService>,
    pub command_bus: Arc<CommandBus>,
    pub query_bus: Arc<QueryBus>,
}
