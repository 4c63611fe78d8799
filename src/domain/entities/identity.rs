//! Correspondent identity value object.
//!
//! An [`Identity`] is built from the raw "author" header of a message
//! (`"Jane Doe <jane@example.com>"`) and exposes the email/domain views the
//! resolution chain keys its cache and providers on.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{trace, warn};

use super::initials::{AvatarColor, Initials};

/// Webmail domains whose users get personal, not company, avatars.
pub const DEFAULT_PUBLIC_DOMAINS: &[&str] = &[
    "gmail",
    "yahoo",
    "hotmail",
    "outlook",
    "aol",
    "protonmail",
    "yandex",
    "icloud",
    "gmx",
    "laposte",
    "sfr",
    "free",
    "bbox",
    "wanadoo",
    "orange.fr",
    "live",
    "msn",
];

const PASS_ALIAS_DOMAINS: &[&str] = &["passmail.com", "passmail.net", "passinbox.com", "passfwd.com"];

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+)>").expect("Invalid regex"));

static DUCK_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_at_(.+?)_.+@duck\.com$").expect("Invalid regex")
});

static PASS_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)_[a-z0-9]+@(passmail\.com|passmail\.net|passinbox\.com|passfwd\.com)$")
        .expect("Invalid regex")
});

/// Set of public webmail domains.
///
/// Entries are matched against both the domain without its TLD
/// (`gmail` for `gmail.com`) and the top domain (`orange.fr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicDomains {
    domains: HashSet<String>,
}

impl PublicDomains {
    /// Creates a set from any list of domain names.
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Returns true if the name is a public webmail domain.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.domains.contains(name)
    }

    /// Number of configured domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Returns true if no domain is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for PublicDomains {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_DOMAINS)
    }
}

/// A normalized message correspondent.
#[derive(Clone)]
pub struct Identity {
    author: String,
    email: String,
    display_name: Option<String>,
    domain: String,
    public_domains: Arc<PublicDomains>,
}

impl Identity {
    /// Parses an author string using the default public domain set.
    #[must_use]
    pub fn parse(author: &str) -> Self {
        Self::parse_with(author, Arc::new(PublicDomains::default()))
    }

    /// Parses an author string. Never fails: malformed input degrades to the
    /// lowercased author as email and an empty domain.
    #[must_use]
    pub fn parse_with(author: &str, public_domains: Arc<PublicDomains>) -> Self {
        let (email, parsed_name) = parse_mailbox(author);
        let display_name = if author.contains('<') {
            parsed_name
                .or_else(|| author.split('<').next().map(|name| name.trim().to_string()))
                .filter(|name| !name.is_empty())
        } else {
            None
        };

        Self::from_parts(author.to_string(), email, display_name, public_domains)
    }

    fn from_parts(
        author: String,
        email: String,
        display_name: Option<String>,
        public_domains: Arc<PublicDomains>,
    ) -> Self {
        let domain = match email.split('@').nth(1) {
            Some(domain) => domain.to_string(),
            None => {
                if !email.is_empty() {
                    warn!(email = %email, "Author has no email domain");
                }
                String::new()
            }
        };

        Self {
            author,
            email,
            display_name,
            domain,
            public_domains,
        }
    }

    /// Raw author string as received.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Lowercased email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Display name, when the author carried one.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Whether the author string carried a display name part.
    #[must_use]
    pub fn has_display_name(&self) -> bool {
        self.author.contains('<')
    }

    /// Email local part (before `@`).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or_default()
    }

    /// Email domain, empty for addresses without `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Domain with its last label removed (`mail.example` for `mail.example.com`).
    #[must_use]
    pub fn domain_without_tld(&self) -> &str {
        match self.domain.rfind('.') {
            Some(idx) => &self.domain[..idx],
            None => &self.domain,
        }
    }

    /// Last two labels of the domain.
    ///
    /// Multi-label public suffixes are not recognized: `example.co.uk`
    /// yields `co.uk`.
    #[must_use]
    pub fn top_domain(&self) -> &str {
        let mut dots = self.domain.rmatch_indices('.').map(|(idx, _)| idx);
        dots.next();
        match dots.next() {
            Some(idx) => &self.domain[idx + 1..],
            None => &self.domain,
        }
    }

    /// Whether the domain has more than two labels.
    #[must_use]
    pub fn has_sub_domain(&self) -> bool {
        self.domain.split('.').count() > 2
    }

    /// Returns a copy whose email is rewritten to `local@top_domain`.
    #[must_use]
    pub fn without_sub_domain(&self) -> Self {
        let email = format!("{}@{}", self.local_part(), self.top_domain());
        Self::from_parts(
            self.author.clone(),
            email,
            self.display_name.clone(),
            self.public_domains.clone(),
        )
    }

    /// Whether the address belongs to a public webmail provider.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.public_domains.contains(self.domain_without_tld())
            || self.public_domains.contains(self.top_domain())
    }

    /// Key used for the session state of this identity.
    #[must_use]
    pub fn session_key(&self) -> String {
        self.author.to_lowercase()
    }

    /// Key the fallback color is derived from.
    #[must_use]
    pub fn color_key(&self) -> &str {
        if self.email.is_empty() {
            &self.author
        } else {
            &self.email
        }
    }

    /// One or two uppercase initials.
    #[must_use]
    pub fn initials(&self) -> String {
        super::initials::extract_initials(self)
    }

    /// Deterministic fallback color.
    #[must_use]
    pub fn color(&self) -> AvatarColor {
        AvatarColor::from_identifier(self.color_key())
    }

    /// Initials and color used when no image exists.
    #[must_use]
    pub fn initials_avatar(&self) -> Initials {
        Initials::new(self.initials(), self.color())
    }

    /// Maps privacy-relay aliases back to the real correspondent.
    ///
    /// Handles DuckDuckGo Email Protection (`a_at_b.com_xyz@duck.com`) and
    /// Proton Pass aliases (`a_at_b_com_xyz@passmail.net`). Returns `self`
    /// unchanged for anything else.
    #[must_use]
    pub fn unalias(self) -> Self {
        match unalias_email(&self.email) {
            Some(real) => {
                trace!(alias = %self.email, real = %real, "Resolved relay alias");
                Self::parse_with(&real, self.public_domains)
            }
            None => self,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("author", &self.author)
            .field("email", &self.email)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.author)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.author == other.author && self.email == other.email
    }
}

impl Eq for Identity {}

fn parse_mailbox(author: &str) -> (String, Option<String>) {
    if let Ok(list) = mailparse::addrparse(author) {
        let first = list.iter().find_map(|addr| match addr {
            mailparse::MailAddr::Single(info) => Some(info.clone()),
            mailparse::MailAddr::Group(group) => group.addrs.first().cloned(),
        });
        if let Some(info) = first
            && info.addr.contains('@')
        {
            let name = info.display_name.map(|n| n.trim().to_string());
            return (info.addr.trim().to_lowercase(), name);
        }
    }

    if let Some(captures) = ANGLE_ADDRESS.captures(author) {
        return (captures[1].trim().to_lowercase(), None);
    }

    (author.trim().to_lowercase(), None)
}

fn unalias_email(email: &str) -> Option<String> {
    if email.ends_with("@duck.com") {
        let captures = DUCK_ALIAS.captures(email)?;
        return Some(format!("{}@{}", &captures[1], &captures[2]));
    }

    if PASS_ALIAS_DOMAINS
        .iter()
        .any(|domain| email.ends_with(&format!("@{domain}")))
    {
        let captures = PASS_ALIAS.captures(email)?;
        let alias = &captures[1];
        let idx = alias.rfind("_at_")?;
        let user = &alias[..idx];
        let domain = alias[idx + 4..].replace('_', ".");
        return Some(format!("{user}@{domain}"));
    }

    None
}
