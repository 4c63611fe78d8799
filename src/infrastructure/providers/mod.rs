//! Avatar provider catalog.
//!
//! A provider maps an identity to a candidate image URL. Providers never
//! download the image themselves; BIMI and webpage scraping only fetch what
//! they need to build the URL.

mod bimi;
mod favicon_api;
mod favicon_webpage;
mod hashed_email;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::entities::Identity;
use crate::domain::errors::AvatarError;
use crate::domain::ports::HttpPort;

pub use bimi::parse_bimi_logo;
pub use favicon_webpage::find_favicon_url;
pub use hashed_email::email_hash;

/// What a provider keys its results on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderScope {
    /// Results depend on the domain only.
    Domain,
    /// Results depend on the full email address.
    Email,
}

/// Avatar source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// DuckDuckGo favicon API.
    #[default]
    DuckDuckGo,
    /// Google favicon API.
    Google,
    /// Icon Horse favicon API.
    IconHorse,
    /// Splitbee favicon API.
    Splitbee,
    /// Gravatar, by email hash.
    Gravatar,
    /// Libravatar, by email hash.
    Libravatar,
    /// BIMI brand logo published in DNS.
    Bimi,
    /// Favicon declared by the domain's home page.
    FaviconWebpage,
}

impl Provider {
    /// Every provider, in catalog order.
    pub const ALL: [Self; 8] = [
        Self::DuckDuckGo,
        Self::Google,
        Self::IconHorse,
        Self::Splitbee,
        Self::Gravatar,
        Self::Libravatar,
        Self::Bimi,
        Self::FaviconWebpage,
    ];

    /// Configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DuckDuckGo => "duckduckgo",
            Self::Google => "google",
            Self::IconHorse => "iconhorse",
            Self::Splitbee => "splitbee",
            Self::Gravatar => "gravatar",
            Self::Libravatar => "libravatar",
            Self::Bimi => "bimi",
            Self::FaviconWebpage => "favicon_webpage",
        }
    }

    /// Cache grouping scope.
    #[must_use]
    pub const fn scope(self) -> ProviderScope {
        match self {
            Self::Gravatar | Self::Libravatar => ProviderScope::Email,
            _ => ProviderScope::Domain,
        }
    }

    /// Returns true for the stateless favicon APIs usable as the default provider.
    #[must_use]
    pub const fn is_favicon_api(self) -> bool {
        matches!(
            self,
            Self::DuckDuckGo | Self::Google | Self::IconHorse | Self::Splitbee
        )
    }

    /// Key under which this provider's result for `identity` is cached.
    #[must_use]
    pub fn cache_key(self, identity: &Identity) -> &str {
        match self.scope() {
            ProviderScope::Domain => identity.domain(),
            ProviderScope::Email => identity.email(),
        }
    }

    /// Builds the candidate image URL for an identity.
    ///
    /// Returns `Ok(None)` when the provider has nothing for this identity.
    ///
    /// # Errors
    /// Returns error if a lookup request (DNS-over-HTTPS, home page) fails.
    pub async fn resolve_url(
        self,
        identity: &Identity,
        http: &dyn HttpPort,
    ) -> Result<Option<String>, AvatarError> {
        let key = self.cache_key(identity);
        if key.is_empty() {
            return Ok(None);
        }

        let url = match self {
            Self::DuckDuckGo | Self::Google | Self::IconHorse | Self::Splitbee => {
                favicon_api::url(self, key)
            }
            Self::Gravatar | Self::Libravatar => hashed_email::url(self, key),
            Self::Bimi => bimi::logo_url(http, key).await?,
            Self::FaviconWebpage => favicon_webpage::favicon_url(http, key).await?,
        };

        trace!(provider = %self, key = %key, url = ?url, "Resolved provider URL");
        Ok(url)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.name() == name)
            .ok_or_else(|| AvatarError::unknown_provider(s))
    }
}

impl TryFrom<String> for Provider {
    type Error = AvatarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.name().to_string()
    }
}
