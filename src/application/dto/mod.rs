//! Data transfer objects for the application layer.

mod avatar_dto;

pub use avatar_dto::{AvatarStatus, AvatarView};
