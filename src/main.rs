use axum::Router;
use dotenvy::dotenv;
use rbac_service::application::seeder::Seeder;
use rbac_service::domain::hierarchy::{PermissionSummary, RoleTreeNode};
use rbac_service::domain::permission::PermissionCategory;
use rbac_service::interface::{
    AssignRoleRequest, CloneRoleRequest, CreatePermissionRequest, CreateRoleRequest,
    EffectivePermissionsResponse, ErrorResponse, PermissionCheckResponse, PermissionResponse,
    PermissionsListResponse, RemoveRoleRequest, RolePermissionsRequest, RoleResponse,
    RolesListResponse, SetParentRoleRequest, SuccessResponse, UpdateRoleRequest,
    UserRolesResponse, rbac_routes,
};
use rbac_service::{AppConfig, AppError, AppStateBuilder, StorageBackend};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        rbac_service::interface::http_handlers::create_role_handler,
        rbac_service::interface::http_handlers::list_roles_handler,
        rbac_service::interface::http_handlers::get_role_hierarchy_handler,
        rbac_service::interface::http_handlers::get_role_handler,
        rbac_service::interface::http_handlers::update_role_handler,
        rbac_service::interface::http_handlers::delete_role_handler,
        rbac_service::interface::http_handlers::clone_role_handler,
        rbac_service::interface::http_handlers::set_parent_role_handler,
        rbac_service::interface::http_handlers::get_effective_permissions_handler,
        rbac_service::interface::http_handlers::check_role_permission_handler,
        rbac_service::interface::http_handlers::assign_role_permissions_handler,
        rbac_service::interface::http_handlers::remove_role_permissions_handler,
        rbac_service::interface::http_handlers::assign_role_handler,
        rbac_service::interface::http_handlers::remove_role_handler,
        rbac_service::interface::http_handlers::get_user_roles_handler,
        rbac_service::interface::http_handlers::create_permission_handler,
        rbac_service::interface::http_handlers::list_permissions_handler,
        rbac_service::interface::http_handlers::delete_permission_handler,
    ),
    components(schemas(
        CreateRoleRequest, UpdateRoleRequest, SetParentRoleRequest, CloneRoleRequest,
        RolePermissionsRequest, AssignRoleRequest, RemoveRoleRequest, CreatePermissionRequest,
        RoleResponse, RolesListResponse, UserRolesResponse, PermissionResponse,
        PermissionsListResponse, EffectivePermissionsResponse, PermissionCheckResponse,
        SuccessResponse, ErrorResponse, RoleTreeNode, PermissionSummary, PermissionCategory
    )),
    tags(
        (name = "Roles", description = "Role hierarchy endpoints"),
        (name = "Assignments", description = "User role assignment endpoints"),
        (name = "Permissions", description = "Permission catalog endpoints")
    ),
    modifiers(&UserIdAddon)
)]
pub struct ApiDoc;

// Documents the caller identity header
pub struct UserIdAddon;

impl utoipa::Modify for UserIdAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "userId",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-user-id"))),
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let builder = AppStateBuilder::new().with_config(config.clone());
    let builder = match (config.storage_backend, config.database_url.as_deref()) {
        (StorageBackend::Postgres, Some(url)) => {
            let pool = PgPool::connect(url).await?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| AppError::Initialization(e.to_string()))?;
            builder.with_pool(pool)
        }
        (StorageBackend::Postgres, None) => return Err(AppError::MissingPool),
        (StorageBackend::Memory, _) => builder.with_in_memory(),
    };
    let app_state = builder.build().await?;

    if config.seed_on_startup {
        let report = Seeder::new(
            app_state.role_repo.clone(),
            app_state.permission_repo.clone(),
            app_state.hierarchy_service.clone(),
        )
        .run(config.bootstrap_admin_user_id.as_deref())
        .await
        .map_err(|e| AppError::Initialization(e.to_string()))?;
        info!(?report, "Seeded base roles and permissions");
    }

    let openapi = ApiDoc::openapi();
    let app = Router::new()
        .nest("/v1", rbac_routes())
        .merge(SwaggerUi::new("/swagger").url("/openapi.json", openapi))
        .with_state(app_state);

    let http_addr = config.http_address();
    let listener = TcpListener::bind(&http_addr)
        .await
        .map_err(|e| AppError::Initialization(format!("failed to bind {http_addr}: {e}")))?;
    info!(address = %http_addr, "HTTP server running");
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Initialization(e.to_string()))
}
