//! HTTP client implementation.

use crate::headers::cache_control;
use crate::response::FetchedResource;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// HTTP client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Timeout")]
    Timeout,
    #[error("Request error: {0}")]
    Request(String),
    #[error("Response error: {0}")]
    Response(String),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else if err.is_body() || err.is_decode() {
            ClientError::Response(err.to_string())
        } else {
            ClientError::Request(err.to_string())
        }
    }
}

/// Something that can fetch a resource by URL.
///
/// The proxy is written against this trait so the outbound side can be
/// replaced in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a single GET for `url`. No retries.
    async fn fetch(&self, url: &str) -> Result<FetchedResource, ClientError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, ClientError> {
        (**self).fetch(url).await
    }
}

/// HTTP client for fetching resources to verify.
pub struct HttpClient {
    inner: reqwest::Client,
}

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Request timeout, covering connect, headers and body.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Ask intermediaries to revalidate with the origin on every fetch.
    pub no_cache: bool,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub system_proxy: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!(
                "integrity-proxy/{} ({})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            ),
            no_cache: true,
            system_proxy: true,
        }
    }
}

impl HttpClient {
    /// Create a client with custom configuration.
    ///
    /// The redirect policy is reqwest's default.
    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| ClientError::InvalidHeader(config.user_agent.clone()))?,
        );

        if config.no_cache {
            headers.insert(
                reqwest::header::CACHE_CONTROL,
                reqwest::header::HeaderValue::from_static(cache_control::NO_CACHE),
            );
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(headers);
        if !config.system_proxy {
            builder = builder.no_proxy();
        }

        let inner = builder
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        debug!(%url, "fetching");
        let response = self.inner.get(url).send().await?;

        FetchedResource::from_reqwest(response).await
    }
}
