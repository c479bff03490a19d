use crate::application::commands::{
    CloneRoleCommand, CreatePermissionCommand, CreateRoleCommand, UpdateRoleCommand,
};
use async_trait::async_trait;

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field validation failed: {field} - {message}")]
    FieldValidation { field: String, message: String },
    #[error("Business rule violation: {message}")]
    BusinessRule { message: String },
}

impl ValidationError {
    fn field(field: &str, message: &str) -> Self {
        ValidationError::FieldValidation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Base trait for command validation
#[async_trait]
pub trait CommandValidator<C>: Send + Sync {
    async fn validate(&self, command: &C) -> Result<(), ValidationError>;
}

/// Field rules shared by the role commands.
pub struct RoleCommandValidator;

impl RoleCommandValidator {
    pub fn validate_name(name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::field("name", "Role name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::field(
                "name",
                "Role name must be at most 100 characters",
            ));
        }
        Ok(())
    }

    pub fn validate_description(description: &str) -> Result<(), ValidationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::field("description", "Description is required"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::field(
                "description",
                "Description must be at most 500 characters",
            ));
        }
        Ok(())
    }

    pub fn validate_id(field: &str, id: &str) -> Result<(), ValidationError> {
        if id.trim().is_empty() {
            return Err(ValidationError::FieldValidation {
                field: field.to_string(),
                message: format!("{field} cannot be empty"),
            });
        }
        Ok(())
    }

    pub fn validate_permission_ids(ids: &[String]) -> Result<(), ValidationError> {
        ids.iter()
            .try_for_each(|id| Self::validate_id("permissions", id))
    }
}

pub struct CreateRoleCommandValidator;

#[async_trait]
impl CommandValidator<CreateRoleCommand> for CreateRoleCommandValidator {
    async fn validate(&self, command: &CreateRoleCommand) -> Result<(), ValidationError> {
        RoleCommandValidator::validate_name(&command.name)?;
        RoleCommandValidator::validate_description(&command.description)?;
        RoleCommandValidator::validate_permission_ids(&command.permission_ids)?;
        if let Some(parent_id) = &command.parent_role_id {
            RoleCommandValidator::validate_id("parent_role_id", parent_id)?;
        }
        Ok(())
    }
}

pub struct UpdateRoleCommandValidator;

#[async_trait]
impl CommandValidator<UpdateRoleCommand> for UpdateRoleCommandValidator {
    async fn validate(&self, command: &UpdateRoleCommand) -> Result<(), ValidationError> {
        RoleCommandValidator::validate_id("role_id", &command.role_id)?;
        if let Some(name) = &command.name {
            RoleCommandValidator::validate_name(name)?;
        }
        if let Some(description) = &command.description {
            RoleCommandValidator::validate_description(description)?;
        }
        if let Some(ids) = &command.permission_ids {
            RoleCommandValidator::validate_permission_ids(ids)?;
        }
        if let Some(Some(parent_id)) = &command.parent_role_id {
            if parent_id == &command.role_id {
                return Err(ValidationError::BusinessRule {
                    message: "A role cannot be its own parent".to_string(),
                });
            }
            RoleCommandValidator::validate_id("parent_role_id", parent_id)?;
        }
        Ok(())
    }
}

pub struct CloneRoleCommandValidator;

#[async_trait]
impl CommandValidator<CloneRoleCommand> for CloneRoleCommandValidator {
    async fn validate(&self, command: &CloneRoleCommand) -> Result<(), ValidationError> {
        RoleCommandValidator::validate_id("role_id", &command.source_role_id)?;
        RoleCommandValidator::validate_name(&command.name)
            .map_err(|_| ValidationError::field("name", "New role name is required"))?;
        RoleCommandValidator::validate_description(&command.description)
    }
}

pub struct CreatePermissionCommandValidator;

impl CreatePermissionCommandValidator {
    /// Permission names are dotted lowercase identifiers such as `role.create`.
    pub fn validate_permission_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::field("name", "Permission name is required"));
        }
        let well_formed = name.split('.').count() >= 2
            && name.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            });
        if !well_formed {
            return Err(ValidationError::field(
                "name",
                "Permission name must look like `resource.action`",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandValidator<CreatePermissionCommand> for CreatePermissionCommandValidator {
    async fn validate(&self, command: &CreatePermissionCommand) -> Result<(), ValidationError> {
        Self::validate_permission_name(&command.name)?;
        RoleCommandValidator::validate_description(&command.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::CommandFactory;

    #[test]
    fn test_validate_name() {
        assert!(RoleCommandValidator::validate_name("manager").is_ok());
        assert!(RoleCommandValidator::validate_name("   ").is_err());
        assert!(RoleCommandValidator::validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_permission_name() {
        assert!(CreatePermissionCommandValidator::validate_permission_name("role.create").is_ok());
        assert!(CreatePermissionCommandValidator::validate_permission_name("user.read_all").is_ok());
        assert!(CreatePermissionCommandValidator::validate_permission_name("role").is_err());
        assert!(CreatePermissionCommandValidator::validate_permission_name("Role.Create").is_err());
        assert!(CreatePermissionCommandValidator::validate_permission_name("role.").is_err());
    }

    #[tokio::test]
    async fn test_create_role_validator() {
        let validator = CreateRoleCommandValidator;
        let ok = CommandFactory::create_role(
            "editor".to_string(),
            "Edits content".to_string(),
            vec![],
            None,
            None,
        );
        assert!(validator.validate(&ok).await.is_ok());

        let missing_description =
            CommandFactory::create_role("editor".to_string(), " ".to_string(), vec![], None, None);
        assert!(matches!(
            validator.validate(&missing_description).await,
            Err(ValidationError::FieldValidation { field, .. }) if field == "description"
        ));
    }

    #[tokio::test]
    async fn test_update_role_validator_rejects_self_parent() {
        let validator = UpdateRoleCommandValidator;
        let mut cmd = CommandFactory::update_role("r1".to_string());
        cmd.parent_role_id = Some(Some("r1".to_string()));
        assert!(matches!(
            validator.validate(&cmd).await,
            Err(ValidationError::BusinessRule { .. })
        ));

        cmd.parent_role_id = Some(None);
        assert!(validator.validate(&cmd).await.is_ok());
    }
}
