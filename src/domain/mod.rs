//! Domain layer with core business entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{AvatarImage, Identity, Initials, Resolution};
pub use errors::{AvatarError, ConvertError};
pub use ports::{ByteStorePort, ContactPhotoPort, HttpPort};
