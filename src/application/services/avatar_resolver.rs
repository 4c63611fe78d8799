//! Ordered fallback chain resolving one identity to an image.
//!
//! The chain is a flat list of [`Attempt`]s built per identity. Each attempt
//! yields an image, nothing, or a terminal "not found" read from the negative
//! cache. Errors never leave an attempt: they are logged and the chain moves on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::domain::entities::{AvatarImage, AvatarSource, ChainOutcome, Identity};
use crate::domain::errors::AvatarError;
use crate::domain::ports::{ContactPhotoPort, HttpPort};
use crate::infrastructure::cache::{AvatarCache, CacheLookup};
use crate::infrastructure::config::ResolverConfig;
use crate::infrastructure::image::accepted_mime_type;
use crate::infrastructure::providers::{Provider, ProviderScope};

const IMAGE_ACCEPT: &str = "image/*";

/// One step of the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Local address book photo.
    Contact,
    /// Cache read for a domain or email key.
    Cache(String),
    /// Provider fetch for an identity, possibly rewritten to its top domain.
    Online {
        /// Provider to query.
        provider: Provider,
        /// Identity handed to the provider.
        identity: Identity,
    },
}

enum Step {
    Image(AvatarImage),
    NoResult,
    NotFound,
}

/// Runs the resolution chain.
pub struct AvatarResolver {
    http: Arc<dyn HttpPort>,
    cache: Arc<AvatarCache>,
    contacts: Option<Arc<dyn ContactPhotoPort>>,
    default_provider: Provider,
    disable_cache: bool,
    attempt_timeout: Duration,
}

impl AvatarResolver {
    /// Creates a resolver. Contacts are ignored when disabled in `config`.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpPort>,
        cache: Arc<AvatarCache>,
        contacts: Option<Arc<dyn ContactPhotoPort>>,
        config: &ResolverConfig,
    ) -> Self {
        let default_provider = if config.default_provider.is_favicon_api() {
            config.default_provider
        } else {
            warn!(
                provider = %config.default_provider,
                fallback = %Provider::default(),
                "Default provider is not a favicon API"
            );
            Provider::default()
        };

        Self {
            http,
            cache,
            contacts: contacts.filter(|_| config.contacts_enabled),
            default_provider,
            disable_cache: config.disable_cache,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Builds the attempt list for an identity.
    #[must_use]
    pub fn plan(&self, identity: &Identity) -> Vec<Attempt> {
        let online = |provider: Provider, identity: &Identity| Attempt::Online {
            provider,
            identity: identity.clone(),
        };

        let mut attempts = Vec::new();
        if self.contacts.is_some() {
            attempts.push(Attempt::Contact);
        }
        attempts.push(Attempt::Cache(identity.email().to_string()));

        if identity.domain().is_empty() {
            return attempts;
        }

        if identity.is_public() {
            attempts.push(online(Provider::Gravatar, identity));
            attempts.push(online(Provider::Libravatar, identity));
            return attempts;
        }

        let top = identity
            .has_sub_domain()
            .then(|| identity.without_sub_domain());

        attempts.push(Attempt::Cache(identity.domain().to_string()));
        attempts.push(online(Provider::Bimi, identity));
        if let Some(top) = &top {
            attempts.push(Attempt::Cache(top.domain().to_string()));
            attempts.push(online(Provider::Bimi, top));
        }
        attempts.push(online(Provider::Gravatar, identity));
        attempts.push(online(self.default_provider, identity));
        attempts.push(online(Provider::FaviconWebpage, identity));
        if let Some(top) = &top {
            attempts.push(online(self.default_provider, top));
            attempts.push(online(Provider::FaviconWebpage, top));
        }

        attempts
    }

    /// Resolves an identity. Never fails: every error degrades to the next attempt.
    pub async fn resolve(&self, identity: &Identity) -> ChainOutcome {
        for attempt in self.plan(identity) {
            match self.run(&attempt, identity).await {
                Step::Image(image) => {
                    debug!(author = %identity, source = %image.source(), "Avatar resolved");
                    return ChainOutcome::Found(image);
                }
                Step::NotFound => {
                    debug!(author = %identity, attempt = ?attempt, "Avatar known to be missing");
                    return ChainOutcome::NotFound;
                }
                Step::NoResult => {}
            }
        }

        self.remember_not_found(identity).await;
        debug!(author = %identity, "No avatar found");
        ChainOutcome::NotFound
    }

    async fn run(&self, attempt: &Attempt, original: &Identity) -> Step {
        match attempt {
            Attempt::Contact => self.from_contacts(original).await,
            Attempt::Cache(key) => self.from_cache(key).await,
            Attempt::Online { provider, identity } => {
                self.from_provider(*provider, identity, original).await
            }
        }
    }

    async fn from_contacts(&self, identity: &Identity) -> Step {
        let Some(contacts) = &self.contacts else {
            return Step::NoResult;
        };

        match contacts.find_photo_by_email(identity.email()).await {
            Ok(Some(photo)) if !photo.is_empty() => {
                Step::Image(photo.with_source(AvatarSource::Contacts))
            }
            Ok(_) => Step::NoResult,
            Err(e) => {
                warn!(email = %identity.email(), error = %e, "Contact photo lookup failed");
                Step::NoResult
            }
        }
    }

    async fn from_cache(&self, key: &str) -> Step {
        if self.disable_cache || key.is_empty() {
            return Step::NoResult;
        }

        match self.cache.lookup(key).await {
            CacheLookup::Hit(image) => Step::Image(image),
            CacheLookup::NotFound => Step::NotFound,
            CacheLookup::Miss => Step::NoResult,
        }
    }

    async fn from_provider(&self, provider: Provider, identity: &Identity, original: &Identity) -> Step {
        let fetched = tokio::time::timeout(self.attempt_timeout, self.fetch(provider, identity)).await;

        let image = match fetched {
            Ok(Ok(Some(image))) => image,
            Ok(Ok(None)) => {
                trace!(provider = %provider, author = %identity, "Provider has no URL");
                return Step::NoResult;
            }
            Ok(Err(e)) => {
                if e.is_network_error() {
                    debug!(provider = %provider, author = %identity, error = %e, "Provider attempt failed");
                } else {
                    warn!(provider = %provider, author = %identity, error = %e, "Provider attempt failed");
                }
                return Step::NoResult;
            }
            Err(_) => {
                let e = AvatarError::timeout(self.attempt_timeout);
                debug!(provider = %provider, author = %identity, error = %e, "Provider attempt abandoned");
                return Step::NoResult;
            }
        };

        self.remember_image(provider, identity, original, &image).await;
        Step::Image(image)
    }

    async fn fetch(&self, provider: Provider, identity: &Identity) -> Result<Option<AvatarImage>, AvatarError> {
        let Some(url) = provider.resolve_url(identity, self.http.as_ref()).await? else {
            return Ok(None);
        };

        let response = self.http.get(&url, Some(IMAGE_ACCEPT)).await?;
        if !response.is_success() {
            return Err(AvatarError::network(format!(
                "{url} returned {}",
                response.status
            )));
        }

        let mime_type = accepted_mime_type(&response)?;
        debug!(provider = %provider, url = %url, mime = %mime_type, size = response.body.len(), "Downloaded avatar");

        Ok(Some(AvatarImage::new(
            response.body,
            mime_type,
            AvatarSource::Network {
                provider: provider.name().to_string(),
            },
        )))
    }

    async fn remember_image(
        &self,
        provider: Provider,
        identity: &Identity,
        original: &Identity,
        image: &AvatarImage,
    ) {
        let key = provider.cache_key(identity);
        let alias = if provider.scope() == ProviderScope::Email || original.is_public() {
            original.email()
        } else {
            original.domain()
        };
        let alias = [alias];
        let aliases: &[&str] = if alias[0] == key { &[] } else { &alias };

        if let Err(e) = self
            .cache
            .store_image(key, aliases, image, provider.name())
            .await
        {
            warn!(key = %key, error = %e, "Failed to cache avatar");
        }
    }

    async fn remember_not_found(&self, identity: &Identity) {
        let mut keys = Vec::with_capacity(2);
        if !identity.domain().is_empty() {
            keys.push(identity.domain());
        }
        if identity.is_public() {
            keys.push(identity.email());
        }

        for key in keys {
            if let Err(e) = self.cache.store_not_found(key).await {
                warn!(key = %key, error = %e, "Failed to cache negative result");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ByteStorePort;
    use crate::domain::ports::mocks::{MockContactPhotoPort, MockHttp};
    use crate::infrastructure::cache::{CacheRecord, DEFAULT_NOT_FOUND_TTL};
    use chrono::{TimeDelta, Utc};
    use crate::infrastructure::providers::email_hash;
    use crate::infrastructure::storage::MemoryStore;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const BIMI_LOGO: &str = "https://bigcorp.com/bimi/logo.svg";
    const LOGO_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"/>"#;

    struct Fixture {
        http: MockHttp,
        store: Arc<MemoryStore>,
        cache: Arc<AvatarCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let cache = Arc::new(AvatarCache::new(store.clone(), DEFAULT_NOT_FOUND_TTL));
            Self {
                http: MockHttp::new(),
                store,
                cache,
            }
        }

        fn resolver(&self, config: &ResolverConfig) -> AvatarResolver {
            AvatarResolver::new(Arc::new(self.http.clone()), self.cache.clone(), None, config)
        }

        fn with_contacts(&self, contacts: MockContactPhotoPort) -> AvatarResolver {
            AvatarResolver::new(
                Arc::new(self.http.clone()),
                self.cache.clone(),
                Some(Arc::new(contacts)),
                &ResolverConfig::default(),
            )
        }
    }

    fn bimi_query(domain: &str) -> String {
        format!("https://cloudflare-dns.com/dns-query?name=default._bimi.{domain}&type=TXT")
    }

    fn bimi_answer(domain: &str, logo: &str) -> String {
        format!(
            r#"{{"Status":0,"Answer":[{{"name":"default._bimi.{domain}","type":16,"data":"\"v=BIMI1; l={logo};\""}}]}}"#
        )
    }

    fn gravatar(email: &str) -> String {
        format!("https://www.gravatar.com/avatar/{}?d=404", email_hash(email))
    }

    fn libravatar(email: &str) -> String {
        format!("https://seccdn.libravatar.org/avatar/{}?d=404", email_hash(email))
    }

    fn online(provider: Provider, author: &str) -> Attempt {
        Attempt::Online {
            provider,
            identity: Identity::parse(author),
        }
    }

    #[test]
    fn test_public_plan() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver(&ResolverConfig::default());

        assert_eq!(
            resolver.plan(&Identity::parse("Foo <foo@gmail.com>")),
            vec![
                Attempt::Cache("foo@gmail.com".to_string()),
                online(Provider::Gravatar, "Foo <foo@gmail.com>"),
                online(Provider::Libravatar, "Foo <foo@gmail.com>"),
            ]
        );
    }

    #[test]
    fn test_sub_domain_plan() {
        let fixture = Fixture::new();
        let config = ResolverConfig {
            default_provider: Provider::Google,
            ..ResolverConfig::default()
        };
        let resolver = fixture.resolver(&config);
        let identity = Identity::parse("john@mail.example.com");
        let top = identity.without_sub_domain();
        let on_top = |provider| Attempt::Online {
            provider,
            identity: top.clone(),
        };

        assert_eq!(top.email(), "john@example.com");
        assert_eq!(
            resolver.plan(&identity),
            vec![
                Attempt::Cache("john@mail.example.com".to_string()),
                Attempt::Cache("mail.example.com".to_string()),
                online(Provider::Bimi, "john@mail.example.com"),
                Attempt::Cache("example.com".to_string()),
                on_top(Provider::Bimi),
                online(Provider::Gravatar, "john@mail.example.com"),
                online(Provider::Google, "john@mail.example.com"),
                online(Provider::FaviconWebpage, "john@mail.example.com"),
                on_top(Provider::Google),
                on_top(Provider::FaviconWebpage),
            ]
        );
    }

    #[test]
    fn test_plan_without_domain() {
        let fixture = Fixture::new();
        let resolver = fixture.with_contacts(MockContactPhotoPort::new());

        assert_eq!(
            resolver.plan(&Identity::parse("undisclosed-recipients")),
            vec![
                Attempt::Contact,
                Attempt::Cache("undisclosed-recipients".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_favicon_default_provider_falls_back() {
        let fixture = Fixture::new();
        let config = ResolverConfig {
            default_provider: Provider::Gravatar,
            ..ResolverConfig::default()
        };
        let resolver = fixture.resolver(&config);

        assert!(resolver
            .plan(&Identity::parse("jane@bigcorp.com"))
            .contains(&online(Provider::DuckDuckGo, "jane@bigcorp.com")));
    }

    #[test]
    fn test_disabled_contacts_are_skipped() {
        let fixture = Fixture::new();
        let config = ResolverConfig {
            contacts_enabled: false,
            ..ResolverConfig::default()
        };
        let resolver = AvatarResolver::new(
            Arc::new(fixture.http.clone()),
            fixture.cache.clone(),
            Some(Arc::new(MockContactPhotoPort::new())),
            &config,
        );

        assert_ne!(
            resolver.plan(&Identity::parse("jane@bigcorp.com")).first(),
            Some(&Attempt::Contact)
        );
    }

    #[tokio::test]
    async fn test_contact_photo_short_circuits() {
        let fixture = Fixture::new();
        let mut contacts = MockContactPhotoPort::new();
        contacts
            .expect_find_photo_by_email()
            .times(1)
            .returning(|email| {
                assert_eq!(email, "jane@bigcorp.com");
                Ok(Some(AvatarImage::new(
                    PNG,
                    "image/png",
                    AvatarSource::Contacts,
                )))
            });
        let resolver = fixture.with_contacts(contacts);

        let outcome = resolver.resolve(&Identity::parse("Jane <jane@bigcorp.com>")).await;

        assert_eq!(outcome.image().map(AvatarImage::source), Some(&AvatarSource::Contacts));
        assert_eq!(fixture.http.calls(), 0);
        assert!(fixture.store.is_empty());
    }

    #[tokio::test]
    async fn test_contact_error_falls_through() {
        let fixture = Fixture::new();
        let mut contacts = MockContactPhotoPort::new();
        contacts
            .expect_find_photo_by_email()
            .returning(|_| Err(AvatarError::storage("address book locked")));
        fixture
            .http
            .route(&gravatar("foo@gmail.com"), "image/png", PNG);
        let resolver = fixture.with_contacts(contacts);

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert!(matches!(outcome, ChainOutcome::Found(_)));
    }

    #[tokio::test]
    async fn test_bimi_logo_cached_under_domain() {
        let fixture = Fixture::new();
        fixture.http.route(
            &bimi_query("bigcorp.com"),
            "application/dns-json",
            bimi_answer("bigcorp.com", BIMI_LOGO),
        );
        fixture.http.route(BIMI_LOGO, "image/svg+xml", LOGO_SVG);
        let resolver = fixture.resolver(&ResolverConfig::default());
        let identity = Identity::parse("Jane Doe <jane@bigcorp.com>");

        let first = resolver.resolve(&identity).await;
        let first = first.image().expect("BIMI logo");
        assert_eq!(first.mime_type(), "image/svg+xml");
        assert!(matches!(fixture.cache.lookup("bigcorp.com").await, CacheLookup::Hit(_)));

        fixture.http.set_offline(true);
        let calls = fixture.http.calls();
        let second = resolver.resolve(&identity).await;
        let second = second.image().expect("cached logo");

        assert_eq!(second.bytes(), first.bytes());
        assert_eq!(
            second.source(),
            &AvatarSource::Cache {
                provider: "bimi".to_string()
            }
        );
        assert_eq!(fixture.http.calls(), calls);
    }

    #[tokio::test]
    async fn test_top_domain_logo_aliased_to_sub_domain() {
        let fixture = Fixture::new();
        fixture.http.route(
            &bimi_query("example.com"),
            "application/dns-json",
            bimi_answer("example.com", BIMI_LOGO),
        );
        fixture.http.route(BIMI_LOGO, "text/plain", LOGO_SVG);
        let resolver = fixture.resolver(&ResolverConfig::default());

        let outcome = resolver.resolve(&Identity::parse("john@mail.example.com")).await;

        assert_eq!(
            outcome.image().map(AvatarImage::mime_type),
            Some("image/svg+xml")
        );
        assert!(matches!(fixture.cache.lookup("example.com").await, CacheLookup::Hit(_)));
        assert!(matches!(fixture.cache.lookup("mail.example.com").await, CacheLookup::Hit(_)));
        assert!(matches!(
            fixture.cache.lookup("john@mail.example.com").await,
            CacheLookup::Miss
        ));
    }

    #[tokio::test]
    async fn test_public_identity_not_found_is_cached() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver(&ResolverConfig::default());
        let identity = Identity::parse("foo@gmail.com");

        let outcome = resolver.resolve(&identity).await;

        assert_eq!(outcome, ChainOutcome::NotFound);
        assert_eq!(
            fixture.http.requests(),
            vec![gravatar("foo@gmail.com"), libravatar("foo@gmail.com")]
        );
        assert!(matches!(
            fixture.cache.lookup("foo@gmail.com").await,
            CacheLookup::NotFound
        ));
    }

    #[tokio::test]
    async fn test_negative_cache_blocks_network() {
        let fixture = Fixture::new();
        fixture.cache.store_not_found("foo@gmail.com").await.unwrap();
        let resolver = fixture.resolver(&ResolverConfig::default());

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert_eq!(outcome, ChainOutcome::NotFound);
        assert_eq!(fixture.http.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_not_found_reaches_network() {
        let fixture = Fixture::new();
        let stale = CacheRecord::NotFound {
            ts: Utc::now() - TimeDelta::days(31),
        };
        fixture
            .cache
            .set_property("ICON_foo@gmail.com", &stale)
            .await
            .unwrap();
        fixture.http.route(&gravatar("foo@gmail.com"), "image/png", PNG);
        let resolver = fixture.resolver(&ResolverConfig::default());

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert!(outcome.image().is_some());
        assert_eq!(fixture.http.requests(), vec![gravatar("foo@gmail.com")]);
        assert!(matches!(fixture.cache.lookup("foo@gmail.com").await, CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn test_error_status_advances_chain() {
        let fixture = Fixture::new();
        fixture.http.route_status(&gravatar("foo@gmail.com"), 500);
        fixture
            .http
            .route(&libravatar("foo@gmail.com"), "image/jpeg", &b"\xff\xd8\xff\xe0jpeg"[..]);
        let resolver = fixture.resolver(&ResolverConfig::default());

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert_eq!(
            outcome.image().map(AvatarImage::source),
            Some(&AvatarSource::Network {
                provider: "libravatar".to_string()
            })
        );

        fixture
            .http
            .route_status("https://icons.duckduckgo.com/ip3/bigcorp.com.ico", 403);
        fixture
            .http
            .route("https://bigcorp.com", "text/html", r#"<link rel="icon" href="/favicon.png">"#);
        fixture
            .http
            .route("https://bigcorp.com/favicon.png", "image/png", PNG);

        let outcome = resolver.resolve(&Identity::parse("jane@bigcorp.com")).await;

        assert_eq!(
            outcome.image().map(AvatarImage::source),
            Some(&AvatarSource::Network {
                provider: "favicon_webpage".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_disable_cache_still_writes() {
        let fixture = Fixture::new();
        fixture.cache.store_not_found("foo@gmail.com").await.unwrap();
        fixture
            .http
            .route(&libravatar("foo@gmail.com"), "image/jpeg", &b"\xff\xd8\xff\xe0jpeg"[..]);
        let config = ResolverConfig {
            disable_cache: true,
            ..ResolverConfig::default()
        };
        let resolver = fixture.resolver(&config);

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert_eq!(
            outcome.image().map(AvatarImage::source),
            Some(&AvatarSource::Network {
                provider: "libravatar".to_string()
            })
        );
        assert!(matches!(fixture.cache.lookup("foo@gmail.com").await, CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn test_company_chain_order_and_not_found() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver(&ResolverConfig::default());
        let identity = Identity::parse("jane@bigcorp.com");

        let outcome = resolver.resolve(&identity).await;

        assert_eq!(outcome, ChainOutcome::NotFound);
        assert_eq!(
            fixture.http.requests(),
            vec![
                bimi_query("bigcorp.com"),
                gravatar("jane@bigcorp.com"),
                "https://icons.duckduckgo.com/ip3/bigcorp.com.ico".to_string(),
                "https://bigcorp.com".to_string(),
            ]
        );
        assert!(matches!(fixture.cache.lookup("bigcorp.com").await, CacheLookup::NotFound));
        assert!(!fixture.store.contains("ICON_jane@bigcorp.com"));

        let calls = fixture.http.calls();
        assert_eq!(resolver.resolve(&identity).await, ChainOutcome::NotFound);
        assert_eq!(fixture.http.calls(), calls);
    }

    #[tokio::test]
    async fn test_html_served_as_image_is_skipped() {
        let fixture = Fixture::new();
        fixture.http.route(
            "https://icons.duckduckgo.com/ip3/bigcorp.com.ico",
            "image/x-icon",
            "<!DOCTYPE html><html>blocked</html>",
        );
        fixture.http.route(
            "https://bigcorp.com",
            "text/html",
            r#"<link rel="icon" href="/favicon.png">"#,
        );
        fixture
            .http
            .route("https://bigcorp.com/favicon.png", "image/png", PNG);
        let resolver = fixture.resolver(&ResolverConfig::default());

        let outcome = resolver.resolve(&Identity::parse("jane@bigcorp.com")).await;

        assert_eq!(
            outcome.image().map(AvatarImage::source),
            Some(&AvatarSource::Network {
                provider: "favicon_webpage".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let fixture = Fixture::new();
        fixture
            .http
            .route(&gravatar("foo@gmail.com"), "image/png", PNG);
        fixture.http.set_delay(Duration::from_millis(200));
        let config = ResolverConfig {
            attempt_timeout_secs: 0,
            ..ResolverConfig::default()
        };
        let resolver = fixture.resolver(&config);

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert_eq!(outcome, ChainOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_image() {
        let store = Arc::new(crate::domain::ports::mocks::FailingStore::new());
        store.set_failing(true);
        let cache = Arc::new(AvatarCache::new(store.clone(), DEFAULT_NOT_FOUND_TTL));
        let http = MockHttp::new();
        http.route(&gravatar("foo@gmail.com"), "image/png", PNG);
        let resolver = AvatarResolver::new(
            Arc::new(http.clone()),
            cache,
            None,
            &ResolverConfig::default(),
        );

        let outcome = resolver.resolve(&Identity::parse("foo@gmail.com")).await;

        assert!(matches!(outcome, ChainOutcome::Found(_)));
        assert!(store.list().await.is_err());
    }
}
