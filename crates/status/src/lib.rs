pub mod manager;
pub mod patch;

pub use manager::{RouteUpdateHook, StatusManager};
pub use patch::{ActionUpdate, ExecutionUpdate};
