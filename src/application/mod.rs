//! Application layer with the resolution services and DTOs.

/// Data transfer objects.
pub mod dto;
/// Resolution chain and session controller.
pub mod services;

pub use dto::{AvatarStatus, AvatarView};
pub use services::{Attempt, AvatarResolver, AvatarService};
