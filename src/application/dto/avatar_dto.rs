//! Avatar DTOs.

use serde::Serialize;

use crate::domain::entities::{AvatarColor, Identity, Resolution};

/// Kind of a resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarStatus {
    /// An image was found.
    Image,
    /// Colored initials stand in for the image.
    Initials,
    /// Nothing to show.
    NotFound,
    /// Resolution started; ask again.
    Pending,
    /// Too many resolutions in flight; ask again later.
    Rejected,
}

/// Serializable view of a resolution, ready for painting.
#[derive(Debug, Clone, Serialize)]
pub struct AvatarView {
    /// Author string as given.
    pub author: String,
    /// Normalized email address.
    pub email: String,
    /// Outcome kind.
    pub status: AvatarStatus,
    /// `data:` URL of the image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Where the image came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Initials text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,
    /// CSS `light-dark()` color of the initials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Color components of the initials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<AvatarColor>,
}

impl AvatarView {
    /// Builds the view of an identity's resolution.
    #[must_use]
    pub fn new(identity: &Identity, resolution: &Resolution) -> Self {
        let mut view = Self {
            author: identity.author().to_string(),
            email: identity.email().to_string(),
            status: AvatarStatus::NotFound,
            url: None,
            source: None,
            initials: None,
            color: None,
            palette: None,
        };

        match resolution {
            Resolution::Image(image) => {
                view.status = AvatarStatus::Image;
                view.url = Some(image.to_data_url());
                view.source = Some(image.source().to_string());
            }
            Resolution::Initials(initials) => {
                view.status = AvatarStatus::Initials;
                view.initials = Some(initials.text().to_string());
                view.color = Some(initials.color().css());
                view.palette = Some(initials.color());
            }
            Resolution::NotFound => {}
            Resolution::Pending => view.status = AvatarStatus::Pending,
            Resolution::ConcurrencyRejected => view.status = AvatarStatus::Rejected,
        }

        view
    }
}

impl std::fmt::Display for AvatarView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            AvatarStatus::Image => write!(
                f,
                "{}: image from {}",
                self.email,
                self.source.as_deref().unwrap_or("unknown")
            ),
            AvatarStatus::Initials => write!(
                f,
                "{}: initials {} {}",
                self.email,
                self.initials.as_deref().unwrap_or_default(),
                self.color.as_deref().unwrap_or_default()
            ),
            AvatarStatus::NotFound => write!(f, "{}: not found", self.email),
            AvatarStatus::Pending => write!(f, "{}: pending", self.email),
            AvatarStatus::Rejected => write!(f, "{}: rejected, try again later", self.email),
        }
    }
}
