//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use common::{ServiceError, ServiceResult};
use integrity_security::ContentSecurityPolicy;
use networking::ClientConfig;
use url::Url;

use crate::page::REPORT_ENDPOINT;

/// Request body limit for the asset and page servers. The proxy never buffers bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Configuration of the whole demo: proxy, asset origin and page server.
#[derive(Clone, Debug, Default)]
pub struct DemoConfig {
    /// Integrity verification proxy.
    pub proxy: ProxyConfig,
    /// Asset origin ("CDN") server.
    pub assets: AssetServerConfig,
    /// Page server.
    pub page: PageServerConfig,
}

/// Integrity verification proxy configuration.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Listen address.
    pub listen: SocketAddr,
    /// Upper bound on one upstream fetch, body included.
    pub fetch_timeout: Duration,
    /// Upstream connect timeout.
    pub connect_timeout: Duration,
    /// User agent sent upstream.
    pub user_agent: String,
    /// Mark responses `Cache-Control: no-store` and send `no-cache` upstream.
    ///
    /// The proxy itself never caches; every request is fetched and hashed
    /// again regardless of this flag.
    pub no_store: bool,
}

impl ProxyConfig {
    /// Set listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set upstream fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set no-store behaviour.
    pub fn with_no_store(mut self, no_store: bool) -> Self {
        self.no_store = no_store;
        self
    }

    /// Configuration for the outbound client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.fetch_timeout,
            connect_timeout: self.connect_timeout.min(self.fetch_timeout),
            user_agent: self.user_agent.clone(),
            no_cache: self.no_store,
            system_proxy: true,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 9000)),
            fetch_timeout: client.timeout,
            connect_timeout: client.connect_timeout,
            user_agent: client.user_agent,
            no_store: true,
        }
    }
}

/// Asset origin server configuration.
#[derive(Clone, Debug)]
pub struct AssetServerConfig {
    /// Listen address.
    pub listen: SocketAddr,
    /// Directory of scripts to serve.
    pub root: PathBuf,
}

impl AssetServerConfig {
    /// Set listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set served directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

impl Default for AssetServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8888)),
            root: PathBuf::from("demo/third-party-scripts"),
        }
    }
}

/// Page server configuration.
#[derive(Clone, Debug)]
pub struct PageServerConfig {
    /// Listen address.
    pub listen: SocketAddr,
    /// Directory of public files.
    pub root: PathBuf,
    /// Directory for the CSP violation log.
    pub log_dir: PathBuf,
    /// Origin of the page server itself, used for the report URI.
    pub page_origin: String,
    /// Origin of the asset server, allowed as a script source.
    pub cdn_origin: String,
    /// Origin of the proxy, allowed as a script source.
    pub proxy_origin: String,
    /// Maximum violation report size.
    pub max_body_bytes: usize,
}

impl PageServerConfig {
    /// Set listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set served directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set log directory.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Path of the CSP violation log.
    pub fn violation_log_path(&self) -> PathBuf {
        self.log_dir.join("csp-violations.log")
    }

    /// Policy sent with the document.
    pub fn content_security_policy(&self) -> ServiceResult<ContentSecurityPolicy> {
        let page = serialize_origin(&self.page_origin)?;
        let cdn = serialize_origin(&self.cdn_origin)?;
        let proxy = serialize_origin(&self.proxy_origin)?;

        Ok(ContentSecurityPolicy::new()
            .with_directive("default-src", ["'self'"])
            .with_directive("script-src", ["'self'".to_string(), cdn, proxy])
            .with_directive("worker-src", ["'self'"])
            .with_directive("connect-src", ["'none'"])
            .with_report_uri(&format!("{}{}", page, REPORT_ENDPOINT)))
    }
}

impl Default for PageServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            root: PathBuf::from("demo/public"),
            log_dir: PathBuf::from("logs"),
            page_origin: "http://localhost:8000".to_string(),
            cdn_origin: "http://localhost:8888".to_string(),
            proxy_origin: "http://localhost:9000".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Normalize `http://host:port/` style input to `scheme://host[:port]`.
fn serialize_origin(input: &str) -> ServiceResult<String> {
    let url = Url::parse(input)?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(ServiceError::config(format!("not a tuple origin: {}", input)));
    }
    Ok(origin.ascii_serialization())
}
