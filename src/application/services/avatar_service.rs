//! Session-level avatar service.
//!
//! Wraps [`AvatarResolver`] with per-identity deduplication and an admission
//! ceiling. The first caller for an identity starts a background resolution and
//! gets [`Resolution::Pending`]; later callers wait on the same outcome for a
//! bounded time. Outcomes are kept in memory for the lifetime of the service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::entities::{AvatarImage, ChainOutcome, Identity, PublicDomains, Resolution};
use crate::domain::errors::{AvatarError, ConvertError};
use crate::domain::ports::{ByteStorePort, ContactPhotoPort, HttpPort};
use crate::infrastructure::cache::{AvatarCache, CacheSize};
use crate::infrastructure::config::{AppConfig, ConcurrencyConfig};
use crate::infrastructure::image::{ImageNormalizer, TargetSize};

use super::avatar_resolver::AvatarResolver;

#[derive(Debug, Clone)]
enum Settled {
    Resolved(ChainOutcome),
    Failed,
}

type Signal = watch::Sender<Option<Settled>>;

enum Entry {
    InFlight(Arc<Signal>),
    Settled(Settled),
}

type Session = Arc<Mutex<HashMap<String, Entry>>>;

/// Publishes a background resolution's outcome. Dropping it unsettled
/// records a failure, so waiters never hang on a panicked task.
struct Completion {
    key: String,
    session: Session,
    signal: Option<Arc<Signal>>,
}

impl Completion {
    fn settle(&mut self, settled: Settled) {
        let Some(signal) = self.signal.take() else {
            return;
        };
        {
            let mut session = self.session.lock();
            if owns_entry(session.get(&self.key), &signal) {
                session.insert(self.key.clone(), Entry::Settled(settled.clone()));
            }
        }
        signal.send_replace(Some(settled));
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.signal.is_some() {
            warn!(key = %self.key, "Avatar resolution aborted");
            self.settle(Settled::Failed);
        }
    }
}

/// Whether a finished resolution may record its outcome under the entry.
///
/// A newer resolution started after the session was cleared owns its own
/// signal; an older task must not replace it.
fn owns_entry(entry: Option<&Entry>, signal: &Arc<Signal>) -> bool {
    match entry {
        None | Some(Entry::Settled(Settled::Failed)) => true,
        Some(Entry::InFlight(active)) => Arc::ptr_eq(active, signal),
        Some(Entry::Settled(Settled::Resolved(_))) => false,
    }
}

/// Deduplicating, rate-limited avatar resolution.
pub struct AvatarService {
    resolver: Arc<AvatarResolver>,
    cache: Arc<AvatarCache>,
    normalizer: ImageNormalizer,
    public_domains: Arc<PublicDomains>,
    session: Session,
    max_in_flight: usize,
    wait_timeout: Duration,
    fallback_to_initials: bool,
}

impl AvatarService {
    /// Creates a service around an existing resolver and cache.
    #[must_use]
    pub fn new(
        resolver: AvatarResolver,
        cache: Arc<AvatarCache>,
        normalizer: ImageNormalizer,
        public_domains: Arc<PublicDomains>,
        config: &ConcurrencyConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            cache,
            normalizer,
            public_domains,
            session: Arc::new(Mutex::new(HashMap::new())),
            max_in_flight: config.max_in_flight,
            wait_timeout: config.wait_timeout(),
            fallback_to_initials: config.fallback_to_initials,
        }
    }

    /// Wires the whole engine from configuration and adapters.
    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        http: Arc<dyn HttpPort>,
        store: Arc<dyn ByteStorePort>,
        contacts: Option<Arc<dyn ContactPhotoPort>>,
    ) -> Self {
        let cache = Arc::new(AvatarCache::new(store, config.resolver.not_found_ttl()));
        let resolver = AvatarResolver::new(http, cache.clone(), contacts, &config.resolver);
        Self::new(
            resolver,
            cache,
            ImageNormalizer::new(config.resolver.svg_size),
            config.public_domains(),
            &config.concurrency,
        )
    }

    /// Parses an author string with the configured public domains.
    #[must_use]
    pub fn identity(&self, author: &str) -> Identity {
        Identity::parse_with(author, self.public_domains.clone())
    }

    /// Resolves an author string. See [`AvatarService::resolve_identity`].
    pub async fn resolve(&self, author: &str) -> Resolution {
        self.resolve_identity(self.identity(author)).await
    }

    /// Resolves an identity.
    ///
    /// Returns `Pending` to the first caller, `ConcurrencyRejected` when the
    /// ceiling is reached, and otherwise the shared outcome, waiting for it if
    /// a resolution is in flight.
    pub async fn resolve_identity(&self, identity: Identity) -> Resolution {
        let key = identity.session_key();

        let signal = {
            let mut session = self.session.lock();
            let existing = session.get(&key).map(|entry| match entry {
                Entry::Settled(settled) => Err(settled.clone()),
                Entry::InFlight(signal) => Ok(Arc::clone(signal)),
            });

            match existing {
                Some(Ok(signal)) => signal,
                Some(Err(settled)) => return self.present(&identity, &settled),
                None => {
                    let in_flight = count_in_flight(&session);
                    if in_flight >= self.max_in_flight {
                        debug!(key = %key, in_flight, "Avatar resolution rejected");
                        return Resolution::ConcurrencyRejected;
                    }

                    let (signal, _) = watch::channel(None);
                    let signal = Arc::new(signal);
                    session.insert(key.clone(), Entry::InFlight(signal.clone()));
                    drop(session);

                    debug!(key = %key, in_flight = in_flight + 1, "Avatar resolution started");
                    self.spawn_resolution(key, identity, signal);
                    return Resolution::Pending;
                }
            }
        };

        let settled = self.wait(&key, &signal).await;
        self.present(&identity, &settled)
    }

    /// Resolves an author string, waiting for the outcome if it is pending.
    pub async fn resolve_and_wait(&self, author: &str) -> Resolution {
        self.resolve_identity_and_wait(self.identity(author)).await
    }

    /// Resolves an identity, waiting for the outcome if it is pending.
    pub async fn resolve_identity_and_wait(&self, identity: Identity) -> Resolution {
        match self.resolve_identity(identity.clone()).await {
            Resolution::Pending => self.resolve_identity(identity).await,
            resolution => resolution,
        }
    }

    /// Resolves an author string to a PNG file, when an image exists.
    ///
    /// # Errors
    /// Returns error if the found image cannot be converted.
    pub async fn avatar_png(&self, author: &str, target: TargetSize) -> Result<Option<Bytes>, ConvertError> {
        match self.resolve_and_wait(author).await {
            Resolution::Image(image) => self.to_png(&image, target).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Converts a resolved image to PNG.
    ///
    /// # Errors
    /// Returns error if the image cannot be decoded, rendered or encoded.
    pub async fn to_png(&self, image: &AvatarImage, target: TargetSize) -> Result<Bytes, ConvertError> {
        self.normalizer.to_png(image, target).await
    }

    /// Number of resolutions currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        count_in_flight(&self.session.lock())
    }

    /// Measures the persistent cache.
    ///
    /// # Errors
    /// Returns error if the store cannot be enumerated.
    pub async fn cache_size(&self) -> Result<CacheSize, AvatarError> {
        self.cache.size().await
    }

    /// Clears the persistent cache and every settled session entry.
    ///
    /// In-flight resolutions are kept and still publish their outcome.
    ///
    /// # Errors
    /// Returns error if the store cannot be cleared.
    pub async fn clear_cache(&self) -> Result<usize, AvatarError> {
        let removed = self.cache.clear().await?;
        self.session
            .lock()
            .retain(|_, entry| matches!(entry, Entry::InFlight(_)));
        info!(removed, "Avatar cache cleared");
        Ok(removed)
    }

    fn spawn_resolution(&self, key: String, identity: Identity, signal: Arc<Signal>) {
        let resolver = Arc::clone(&self.resolver);
        let mut completion = Completion {
            key,
            session: Arc::clone(&self.session),
            signal: Some(signal),
        };

        tokio::spawn(async move {
            let outcome = resolver.resolve(&identity).await;
            completion.settle(Settled::Resolved(outcome));
        });
    }

    async fn wait(&self, key: &str, signal: &Arc<Signal>) -> Settled {
        let mut receiver = signal.subscribe();
        let waited = tokio::time::timeout(self.wait_timeout, receiver.wait_for(Option::is_some)).await;

        match waited {
            Ok(Ok(state)) => state.clone().unwrap_or(Settled::Failed),
            Ok(Err(_)) => Settled::Failed,
            Err(_) => {
                warn!(key = %key, timeout = ?self.wait_timeout, "Gave up waiting for avatar");
                self.mark_failed(key, signal);
                Settled::Failed
            }
        }
    }

    fn mark_failed(&self, key: &str, signal: &Arc<Signal>) {
        {
            let mut session = self.session.lock();
            if matches!(session.get(key), Some(Entry::InFlight(active)) if Arc::ptr_eq(active, signal)) {
                session.insert(key.to_string(), Entry::Settled(Settled::Failed));
            }
        }
        signal.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Settled::Failed);
            true
        });
    }

    fn present(&self, identity: &Identity, settled: &Settled) -> Resolution {
        match settled {
            Settled::Resolved(ChainOutcome::Found(image)) => Resolution::Image(image.clone()),
            _ if self.fallback_to_initials => Resolution::Initials(identity.initials_avatar()),
            _ => Resolution::NotFound,
        }
    }
}

fn count_in_flight(session: &HashMap<String, Entry>) -> usize {
    session
        .values()
        .filter(|entry| matches!(entry, Entry::InFlight(_)))
        .count()
}
