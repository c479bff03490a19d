use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;
type BoxedResult = Result<Box<dyn Any + Send + Sync>, BoxedError>;

/// Command handler trait
#[async_trait]
pub trait CommandHandler<C>: Send + Sync {
    type Result: Send + Sync;
    type Error: std::error::Error + Send + Sync;

    async fn handle(&self, command: C) -> Result<Self::Result, Self::Error>;
}

/// Command bus for handling commands
pub struct CommandBus {
    handlers: Arc<RwLock<HashMap<TypeId, Box<dyn CommandHandlerBox + Send + Sync>>>>,
}

/// Boxed command handler for type erasure
#[async_trait]
trait CommandHandlerBox: Send + Sync {
    async fn handle(&self, command: Box<dyn Any + Send + Sync>) -> BoxedResult;
}

impl CommandBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a command handler. A later registration for the same command replaces
    /// the earlier one.
    pub async fn register_handler<C, H>(&self, handler: H)
    where
        C: 'static + Send + Sync,
        H: CommandHandler<C> + 'static + Send + Sync,
    {
        let boxed_handler = Box::new(HandlerWrapper::new(handler));
        let type_id = TypeId::of::<C>();

        let mut handlers = self.handlers.write().await;
        handlers.insert(type_id, boxed_handler);
    }

    /// Execute a command
    pub async fn execute<C>(&self, command: C) -> BoxedResult
    where
        C: 'static + Send + Sync,
    {
        let type_id = TypeId::of::<C>();
        let handlers = self.handlers.read().await;

        if let Some(handler) = handlers.get(&type_id) {
            let boxed_command = Box::new(command);
            handler.handle(boxed_command).await
        } else {
            Err(format!(
                "No handler registered for command type: {}",
                std::any::type_name::<C>()
            )
            .into())
        }
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper for command handlers to enable type erasure
struct HandlerWrapper<C, H> {
    handler: H,
    _phantom: std::marker::PhantomData<C>,
}

impl<C, H> HandlerWrapper<C, H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<C, H> CommandHandlerBox for HandlerWrapper<C, H>
where
    C: 'static + Send + Sync,
    H: CommandHandler<C> + Send + Sync,
    <H as CommandHandler<C>>::Result: 'static,
    <H as CommandHandler<C>>::Error: 'static,
{
    async fn handle(&self, command: Box<dyn Any + Send + Sync>) -> BoxedResult {
        let command = command
            .downcast::<C>()
            .map_err(|_| "Failed to downcast command")?;

        let result = self
            .handler
            .handle(*command)
            .await
            .map_err(|e| Box::new(e) as BoxedError)?;

        Ok(Box::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command_handlers::CreateRoleCommandHandler;
    use crate::application::commands::{CommandFactory, DeleteRoleCommand};
    use crate::application::services::{RoleError, RoleHierarchyService};
    use crate::domain::role::Role;
    use crate::infrastructure::{InMemoryPermissionRepository, InMemoryRoleRepository};

    #[tokio::test]
    async fn test_command_bus_registration_and_execution() {
        let command_bus = CommandBus::new();
        let role_repo = Arc::new(InMemoryRoleRepository::new());
        let permission_repo = Arc::new(InMemoryPermissionRepository::new());
        let hierarchy = Arc::new(RoleHierarchyService::new(role_repo.clone()));

        command_bus
            .register_handler::<crate::application::commands::CreateRoleCommand, _>(
                CreateRoleCommandHandler::new(role_repo.clone(), permission_repo, hierarchy),
            )
            .await;

        let command = CommandFactory::create_role(
            "auditor".to_string(),
            "Reads audit trails".to_string(),
            vec![],
            None,
            None,
        );
        let result = command_bus.execute(command).await.unwrap();
        let role = result.downcast::<Role>().unwrap();
        assert_eq!(role.name, "auditor");
        assert_eq!(role.level, 0);
    }

    #[tokio::test]
    async fn test_command_bus_no_handler() {
        let command_bus = CommandBus::new();
        let result = command_bus
            .execute(CommandFactory::delete_role("r1".to_string(), None))
            .await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("DeleteRoleCommand"));
    }

    #[tokio::test]
    async fn test_command_bus_preserves_handler_error_type() {
        struct AlwaysMissing;

        #[async_trait]
        impl CommandHandler<DeleteRoleCommand> for AlwaysMissing {
            type Result = ();
            type Error = RoleError;

            async fn handle(&self, command: DeleteRoleCommand) -> Result<(), RoleError> {
                Err(RoleError::RoleNotFound(command.role_id))
            }
        }

        let command_bus = CommandBus::new();
        command_bus.register_handler(AlwaysMissing).await;

        let err = command_bus
            .execute(CommandFactory::delete_role("r1".to_string(), None))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RoleError>(),
            Some(RoleError::RoleNotFound(id)) if id == "r1"
        ));
    }
}
