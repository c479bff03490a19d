use rbac_service::application::services::RoleHierarchyService;
use rbac_service::infrastructure::{
    PermissionRepository, PostgresPermissionRepository, PostgresRoleRepository, RoleRepository,
};
use rbac_service::test_utils::{permission, role};
use sqlx::{PgPool, Row};
use std::sync::Arc;

async fn connect() -> Option<PgPool> {
    // Skip if no database connection available
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping database test - no DATABASE_URL");
        return None;
    };
    let pool = PgPool::connect(&database_url).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(pool)
}

fn unique(name: &str) -> String {
    format!("{name}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_database_connectivity() {
    let Some(pool) = connect().await else {
        return;
    };

    let result = sqlx::query("SELECT 1 as test_value")
        .fetch_one(&pool)
        .await
        .unwrap();
    let test_value: i32 = result.get("test_value");
    assert_eq!(test_value, 1);

    let tables = sqlx::query(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    let table_names: Vec<String> = tables
        .iter()
        .map(|row| row.get::<String, _>("table_name"))
        .collect();

    for table in ["roles", "permissions", "role_permissions", "user_roles"] {
        assert!(
            table_names.contains(&table.to_string()),
            "{table} table not found"
        );
    }
}

#[tokio::test]
async fn test_postgres_hierarchy_round_trip() {
    let Some(pool) = connect().await else {
        return;
    };
    let role_repo: Arc<dyn RoleRepository + Send + Sync> =
        Arc::new(PostgresRoleRepository::new(pool.clone()));
    let permission_repo = PostgresPermissionRepository::new(pool);

    let read = permission(&format!("{}.read", unique("report")));
    permission_repo.create_permission(&read).await.unwrap();

    let top = role(&unique("top"), None, &[&read]);
    let middle = role(&unique("middle"), Some(&top), &[]);
    let bottom = role(&unique("bottom"), Some(&middle), &[]);
    for r in [&top, &middle, &bottom] {
        role_repo.create_role(r).await.unwrap();
    }

    let stored = role_repo.get_role(&bottom.id).await.unwrap().unwrap();
    assert_eq!(stored.level, 2);
    assert_eq!(stored.parent_role_id.as_deref(), Some(middle.id.as_str()));

    let hierarchy = RoleHierarchyService::new(role_repo.clone());
    assert!(
        hierarchy
            .has_permission(&bottom.id, &read.id)
            .await
            .unwrap()
    );

    let mut moved = role_repo.get_role(&middle.id).await.unwrap().unwrap();
    moved.set_parent_role(None);
    role_repo.save_role(&moved).await.unwrap();
    hierarchy.propagate_levels(&middle.id).await.unwrap();

    assert_eq!(role_repo.get_role(&middle.id).await.unwrap().unwrap().level, 0);
    assert_eq!(role_repo.get_role(&bottom.id).await.unwrap().unwrap().level, 1);
    assert!(
        !hierarchy
            .has_permission(&bottom.id, &read.id)
            .await
            .unwrap()
    );

    for id in [&bottom.id, &middle.id, &top.id] {
        role_repo.delete_role(id).await.unwrap();
    }
    permission_repo.delete_permission(&read.id).await.unwrap();
}
