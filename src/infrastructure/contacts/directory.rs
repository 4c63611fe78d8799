//! Contact photos stored as `<email>.<ext>` files in a directory.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, trace};

use crate::domain::entities::{AvatarImage, AvatarSource, SVG_MIME_TYPE};
use crate::domain::errors::AvatarError;
use crate::domain::ports::ContactPhotoPort;

/// Supported photo extensions, in lookup order, with their MIME types.
const PHOTO_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("svg", SVG_MIME_TYPE),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
];

/// Address book backed by a directory of photos named after email addresses.
pub struct DirectoryContacts {
    dir: PathBuf,
}

impl DirectoryContacts {
    /// Creates an address book reading from `dir`.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ContactPhotoPort for DirectoryContacts {
    async fn find_photo_by_email(&self, email: &str) -> Result<Option<AvatarImage>, AvatarError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || email.contains(['/', '\\']) || email.starts_with('.') {
            return Ok(None);
        }

        for (extension, mime_type) in PHOTO_EXTENSIONS {
            let path = self.dir.join(format!("{email}.{extension}"));
            match fs::read(&path).await {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(email = %email, path = %path.display(), "Found contact photo");
                    return Ok(Some(AvatarImage::new(
                        Bytes::from(bytes),
                        *mime_type,
                        AvatarSource::Contacts,
                    )));
                }
                Ok(_) => trace!(path = %path.display(), "Skipping empty contact photo"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AvatarError::storage(format!(
                        "Failed to read {}: {e}",
                        path.display()
                    )));
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_finds_photo_case_insensitively() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("jane@bigcorp.com.jpg"), b"jpeg").unwrap();
        let contacts = DirectoryContacts::new(temp.path().to_path_buf());

        let photo = contacts
            .find_photo_by_email("Jane@BigCorp.com")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(photo.mime_type(), "image/jpeg");
        assert_eq!(photo.source(), &AvatarSource::Contacts);
    }

    #[tokio::test]
    async fn test_missing_photo() {
        let temp = TempDir::new().unwrap();
        let contacts = DirectoryContacts::new(temp.path().to_path_buf());

        assert!(contacts.find_photo_by_email("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("secret.png"), b"png").unwrap();
        let contacts = DirectoryContacts::new(temp.path().join("contacts"));

        assert!(contacts.find_photo_by_email("../secret").await.unwrap().is_none());
    }
}
