//! reqwest-backed HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, trace, warn};

use crate::domain::errors::AvatarError;
use crate::domain::ports::{HttpPort, HttpResponse};

const USER_AGENT: &str = concat!("sender-avatars/", env!("CARGO_PKG_VERSION"));

/// Default transport-level request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client used by providers and image downloads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default timeout.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new() -> Result<Self, AvatarError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn with_timeout(timeout: Duration) -> Result<Self, AvatarError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AvatarError::network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn map_error(url: &str, e: &reqwest::Error) -> AvatarError {
        warn!(url = %url, error = %e, "HTTP request failed");
        if e.is_timeout() {
            AvatarError::network("request timed out")
        } else if e.is_connect() {
            AvatarError::network(format!("failed to connect to {url}"))
        } else {
            AvatarError::network(e.to_string())
        }
    }
}

#[async_trait]
impl HttpPort for HttpClient {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<HttpResponse, AvatarError> {
        trace!(url = %url, "GET");

        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }

        let response = request.send().await.map_err(|e| Self::map_error(url, &e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_lowercase);

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(url, &e))?;

        debug!(
            url = %url,
            status = status.as_u16(),
            size = body.len(),
            "HTTP response received"
        );

        Ok(HttpResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
