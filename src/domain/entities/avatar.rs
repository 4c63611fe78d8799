//! Avatar payloads and resolution outcomes.

use std::fmt;

use base64::Engine;
use bytes::Bytes;

use super::Initials;

/// MIME type used for SVG payloads.
pub const SVG_MIME_TYPE: &str = "image/svg+xml";

/// Where an avatar image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarSource {
    /// Local contact photo.
    Contacts,
    /// Persistent avatar cache, with the provider that originally supplied it.
    Cache {
        /// Provider name recorded with the cache entry.
        provider: String,
    },
    /// Downloaded from a provider.
    Network {
        /// Provider name.
        provider: String,
    },
}

impl fmt::Display for AvatarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contacts => write!(f, "contacts"),
            Self::Cache { provider } => write!(f, "cache ({provider})"),
            Self::Network { provider } => write!(f, "network ({provider})"),
        }
    }
}

/// Raw avatar image bytes with their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct AvatarImage {
    bytes: Bytes,
    mime_type: String,
    source: AvatarSource,
}

impl AvatarImage {
    /// Creates an image payload.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>, source: AvatarSource) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            source,
        }
    }

    /// Image bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// MIME type, possibly empty when unknown.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Origin of the payload.
    #[must_use]
    pub const fn source(&self) -> &AvatarSource {
        &self.source
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true for SVG payloads.
    #[must_use]
    pub fn is_svg(&self) -> bool {
        self.mime_type.starts_with(SVG_MIME_TYPE)
    }

    /// Returns the same payload tagged with another source.
    #[must_use]
    pub fn with_source(mut self, source: AvatarSource) -> Self {
        self.source = source;
        self
    }

    /// Displayable `data:` URL for the payload.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        let mime = if self.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.mime_type
        };
        format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for AvatarImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvatarImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("source", &self.source)
            .finish()
    }
}

/// Outcome of running the resolution chain once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// An image was found.
    Found(AvatarImage),
    /// No source has an avatar for this identity.
    NotFound,
}

impl ChainOutcome {
    /// Returns the image, if any.
    #[must_use]
    pub fn image(&self) -> Option<&AvatarImage> {
        match self {
            Self::Found(image) => Some(image),
            Self::NotFound => None,
        }
    }
}

/// Result handed to callers of the avatar service.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An avatar image.
    Image(AvatarImage),
    /// Colored initials fallback.
    Initials(Initials),
    /// No avatar exists and the initials fallback is disabled.
    NotFound,
    /// Resolution started in the background; ask again later.
    Pending,
    /// Too many resolutions in flight; ask again later.
    ConcurrencyRejected,
}

impl Resolution {
    /// Returns true for the transient outcomes that warrant a retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Pending | Self::ConcurrencyRejected)
    }

    /// Returns the image, if any.
    #[must_use]
    pub fn image(&self) -> Option<&AvatarImage> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }
}
