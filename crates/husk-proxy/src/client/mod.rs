//! Upstream registry access
//!
//! [`RemoteFetcher`] is the capability the proxy cache depends on.
//! [`HttpFetcher`] implements it over reqwest; the circuit breaker wraps any
//! implementation and exposes the same capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;

use husk_config::ProxySection;
use husk_core::error::HuskError;

use crate::ProxyResult;

/// A successful upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteContent {
    pub body: Bytes,
    /// `Last-Modified` header, verbatim
    pub last_modified: Option<String>,
    /// `Content-Type` header, verbatim
    pub content_type: Option<String>,
}

impl RemoteContent {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            last_modified: None,
            content_type: None,
        }
    }
}

/// Fetches metadata documents and assets from the upstream registry.
///
/// `Ok(None)` means the upstream answered "not found".
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Metadata document of `name` (scoped names included)
    async fn load_package(&self, name: &str) -> ProxyResult<Option<RemoteContent>>;

    /// Asset stored at the registry-relative `path`
    async fn load_asset(&self, path: &str) -> ProxyResult<Option<RemoteContent>>;
}

/// Fetcher handle shared between components
pub type SharedFetcher = Arc<dyn RemoteFetcher>;

#[async_trait]
impl<T: RemoteFetcher + ?Sized> RemoteFetcher for Arc<T> {
    async fn load_package(&self, name: &str) -> ProxyResult<Option<RemoteContent>> {
        (**self).load_package(name).await
    }

    async fn load_asset(&self, path: &str) -> ProxyResult<Option<RemoteContent>> {
        (**self).load_asset(path).await
    }
}

/// Settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the upstream registry
    pub upstream: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Bearer token sent with every request
    pub token: Option<String>,
}

impl From<&ProxySection> for FetcherConfig {
    fn from(section: &ProxySection) -> Self {
        Self {
            upstream: section.upstream.clone(),
            connect_timeout: section.connect_timeout(),
            request_timeout: section.request_timeout(),
            token: section.token.clone(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::from(&ProxySection::default())
    }
}

/// reqwest-backed upstream client.
///
/// No retries: a failed request is reported once and the circuit breaker
/// decides what happens next.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Upstream base URL without a trailing slash
    base_url: String,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> ProxyResult<Self> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(true)
            .user_agent(concat!("husk/", env!("CARGO_PKG_VERSION")));

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| HuskError::upstream("Invalid upstream token".to_string(), e))?;
            value.set_sensitive(true);

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| HuskError::upstream("Failed to create HTTP client".to_string(), e))?;

        Ok(Self {
            client,
            base_url: config.upstream.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Metadata URL; scoped names travel as `@scope%2fname`
    fn package_url(&self, name: &str) -> String {
        let encoded = if name.starts_with('@') {
            name.replacen('/', "%2f", 1)
        } else {
            name.to_string()
        };
        format!("{}/{}", self.base_url, encoded)
    }

    fn asset_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, url: &str) -> ProxyResult<Option<RemoteContent>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HuskError::upstream(format!("Failed to fetch {}", url), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "upstream has no such document");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(HuskError::Upstream {
                message: format!("Upstream returned status {} for {}", status, url),
                source: None,
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let last_modified = header(LAST_MODIFIED);
        let content_type = header(CONTENT_TYPE);

        let body = response
            .bytes()
            .await
            .map_err(|e| HuskError::upstream(format!("Failed to read body of {}", url), e))?;

        debug!(url, bytes = body.len(), "fetched from upstream");
        Ok(Some(RemoteContent {
            body,
            last_modified,
            content_type,
        }))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn load_package(&self, name: &str) -> ProxyResult<Option<RemoteContent>> {
        self.get(&self.package_url(name)).await
    }

    async fn load_asset(&self, path: &str) -> ProxyResult<Option<RemoteContent>> {
        self.get(&self.asset_url(path)).await
    }
}
