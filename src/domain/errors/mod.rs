//! Domain error types.

mod avatar_error;
mod convert_error;

pub use avatar_error::AvatarError;
pub use convert_error::ConvertError;
