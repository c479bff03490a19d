// Application layer: use cases, services, CQRS
pub mod command_bus;
pub mod command_handlers;
pub mod commands;
pub mod events;
pub mod queries;
pub mod query_bus;
pub mod query_handlers;
pub mod seeder;
pub mod services;
pub mod validators;
