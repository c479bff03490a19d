// Domain layer: entities, value objects and pure hierarchy logic
pub mod hierarchy;
pub mod permission;
pub mod role;
