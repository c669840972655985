mod listeners;
pub mod manager;
mod poller;
pub mod registry;

pub use listeners::Subscription;
pub use manager::{AuthSync, Lifecycle};
pub use registry::ManagerRegistry;
