//! Avatar resolution services.

pub mod avatar_resolver;
pub mod avatar_service;

pub use avatar_resolver::{Attempt, AvatarResolver};
pub use avatar_service::AvatarService;
