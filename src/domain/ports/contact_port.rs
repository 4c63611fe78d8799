//! Local contact photo port definition.

use async_trait::async_trait;

use crate::domain::entities::AvatarImage;
use crate::domain::errors::AvatarError;

/// Port for the local address book.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactPhotoPort: Send + Sync {
    /// Returns the contact photo stored for an email address, if any.
    async fn find_photo_by_email(&self, email: &str) -> Result<Option<AvatarImage>, AvatarError>;
}
