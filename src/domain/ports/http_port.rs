//! Network transport port definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::AvatarError;

/// Response of an HTTP GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, lowercased, if present.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Media type without parameters (`text/html` for `text/html; charset=utf-8`).
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Body decoded as UTF-8, lossy.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Port for outbound HTTP requests.
#[async_trait]
pub trait HttpPort: Send + Sync {
    /// Performs a GET with an optional `Accept` header.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<HttpResponse, AvatarError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock transport answering from a fixed route table.
    ///
    /// Unknown URLs answer 404.
    #[derive(Clone, Default)]
    pub struct MockHttp {
        routes: Arc<Mutex<HashMap<String, HttpResponse>>>,
        requests: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
        offline: Arc<AtomicBool>,
        delay: Arc<Mutex<Option<Duration>>>,
    }

    impl MockHttp {
        /// Creates mock with no routes.
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a 200 response.
        pub fn route(&self, url: &str, content_type: &str, body: impl Into<Bytes>) {
            self.routes.lock().insert(
                url.to_string(),
                HttpResponse {
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    body: body.into(),
                },
            );
        }

        /// Registers a response with an explicit status.
        pub fn route_status(&self, url: &str, status: u16) {
            self.routes.lock().insert(
                url.to_string(),
                HttpResponse {
                    status,
                    content_type: None,
                    body: Bytes::new(),
                },
            );
        }

        /// Makes every request fail with a network error.
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Delays every response.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of requests made so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// URLs requested so far, in order.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl HttpPort for MockHttp {
        async fn get(&self, url: &str, _accept: Option<&str>) -> Result<HttpResponse, AvatarError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(url.to_string());

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if self.offline.load(Ordering::SeqCst) {
                return Err(AvatarError::network("offline"));
            }

            Ok(self
                .routes
                .lock()
                .get(url)
                .cloned()
                .unwrap_or(HttpResponse {
                    status: 404,
                    content_type: None,
                    body: Bytes::new(),
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        let response = HttpResponse {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: Bytes::new(),
        };
        assert_eq!(response.media_type(), Some("text/html"));
        assert!(response.is_success());
    }

    #[test]
    fn test_non_success_status() {
        let response = HttpResponse {
            status: 404,
            content_type: None,
            body: Bytes::new(),
        };
        assert!(!response.is_success());
        assert_eq!(response.media_type(), None);
    }
}
