use crate::domain::permission::{Permission, PermissionCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base trait for all queries
pub trait Query: Send + Sync {
    fn query_id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Query to get a role by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRoleByIdQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
}

/// Query to list roles with filtering and pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRolesQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub page: u32,
    pub page_size: u32,
    pub name_filter: Option<String>,
}

/// Query for the whole role forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRoleHierarchyQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEffectivePermissionsQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRolePermissionQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub role_id: String,
    pub permission_id: String,
}

/// Query to check a user's permission by name through all of the user's roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckUserPermissionQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub permission_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRolesForUserQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPermissionsQuery {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub category_filter: Option<PermissionCategory>,
}

macro_rules! impl_query {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Query for $ty {
                fn query_id(&self) -> &str {
                    &self.query_id
                }
                fn timestamp(&self) -> DateTime<Utc> {
                    self.timestamp
                }
            }
        )*
    };
}

impl_query!(
    GetRoleByIdQuery,
    ListRolesQuery,
    GetRoleHierarchyQuery,
    GetEffectivePermissionsQuery,
    CheckRolePermissionQuery,
    CheckUserPermissionQuery,
    GetRolesForUserQuery,
    ListPermissionsQuery,
);

/// Query factory functions
pub struct QueryFactory;

impl QueryFactory {
    pub fn get_role_by_id(role_id: String) -> GetRoleByIdQuery {
        GetRoleByIdQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            role_id,
        }
    }

    pub fn list_roles(page: u32, page_size: u32, name_filter: Option<String>) -> ListRolesQuery {
        ListRolesQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            page,
            page_size,
            name_filter,
        }
    }

    pub fn get_role_hierarchy() -> GetRoleHierarchyQuery {
        GetRoleHierarchyQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn get_effective_permissions(role_id: String) -> GetEffectivePermissionsQuery {
        GetEffectivePermissionsQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            role_id,
        }
    }

    pub fn check_role_permission(role_id: String, permission_id: String) -> CheckRolePermissionQuery {
        CheckRolePermissionQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            role_id,
            permission_id,
        }
    }

    pub fn check_user_permission(
        user_id: String,
        permission_name: String,
    ) -> CheckUserPermissionQuery {
        CheckUserPermissionQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id,
            permission_name,
        }
    }

    pub fn get_roles_for_user(user_id: String) -> GetRolesForUserQuery {
        GetRolesForUserQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id,
        }
    }

    pub fn list_permissions(category_filter: Option<PermissionCategory>) -> ListPermissionsQuery {
        ListPermissionsQuery {
            query_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category_filter,
        }
    }
}

/// Effective permission set of a role, as ids and as resolved catalog entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub role_id: String,
    /// Sorted.
    pub permission_ids: Vec<String>,
    /// Catalog entries for the ids that resolve, sorted by name.
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(u64::from(page_size)) as u32
        };
        let has_next = page < total_pages;
        let has_previous = page > 1;

        Self {
            items,
            total_count,
            page,
            page_size,
            total_pages,
            has_next,
            has_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_result() {
        let page: PaginatedResult<u32> = PaginatedResult::new(vec![1, 2], 5, 1, 2);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(!page.has_previous);

        let last: PaginatedResult<u32> = PaginatedResult::new(vec![5], 5, 3, 2);
        assert!(!last.has_next);
        assert!(last.has_previous);
    }

    #[test]
    fn test_query_factory() {
        let query = QueryFactory::list_roles(2, 10, Some("man".to_string()));
        assert_eq!(query.page, 2);
        assert_eq!(query.name_filter.as_deref(), Some("man"));
        assert!(!query.query_id().is_empty());
    }
}
