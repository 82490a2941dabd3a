//! Integrity Proxy - serves third-party scripts only after checking their
//! Subresource Integrity digest against a live fetch.
//!
//! This crate ties the pieces together:
//! - `verify`: fetch-and-hash of one resource
//! - `proxy`: the verification endpoint
//! - `assets`: the asset origin ("CDN") serving the demo scripts
//! - `page`: the demo page with its Content-Security-Policy and report sink
//! - `server`: the HTTP/1 accept loop they all run on

pub mod assets;
pub mod config;
pub mod page;
pub mod proxy;
pub mod response;
pub mod server;
pub mod verify;

use std::future::Future;
use std::sync::Arc;

use common::{ServiceError, ServiceResult};
use networking::HttpClient;
use tracing::warn;

pub use assets::{AssetServer, StaticFiles};
pub use config::{AssetServerConfig, DemoConfig, PageServerConfig, ProxyConfig};
pub use page::{PageServer, ViolationLog};
pub use proxy::ProxyService;
pub use server::{shutdown_signal, BodyPolicy, Handler, ServeOptions};
pub use verify::{IntegrityVerifier, VerificationOutcome, VerificationRequest};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the verification proxy until `shutdown` resolves.
pub async fn run_proxy<S>(config: &ProxyConfig, shutdown: S) -> ServiceResult<()>
where
    S: Future<Output = ()> + Send,
{
    let client = HttpClient::with_config(config.client_config())
        .map_err(|e| ServiceError::config(format!("http client: {}", e)))?;
    let service = ProxyService::new(client, config.no_store);

    let listener = server::bind(config.listen).await?;
    server::serve(
        listener,
        Arc::new(service),
        ServeOptions::discarding_body("proxy"),
        shutdown,
    )
    .await
}

/// Run the asset origin until `shutdown` resolves.
pub async fn run_assets<S>(config: &AssetServerConfig, shutdown: S) -> ServiceResult<()>
where
    S: Future<Output = ()> + Send,
{
    if !config.root.is_dir() {
        warn!(root = %config.root.display(), "asset directory does not exist");
    }

    let listener = server::bind(config.listen).await?;
    server::serve(
        listener,
        Arc::new(AssetServer::new(config)),
        ServeOptions::new("cdn", crate::config::DEFAULT_MAX_BODY_BYTES),
        shutdown,
    )
    .await
}

/// Run the page server until `shutdown` resolves.
pub async fn run_page<S>(config: &PageServerConfig, shutdown: S) -> ServiceResult<()>
where
    S: Future<Output = ()> + Send,
{
    if !config.root.is_dir() {
        warn!(root = %config.root.display(), "public directory does not exist");
    }

    let page = PageServer::new(config).await?;
    let listener = server::bind(config.listen).await?;
    server::serve(
        listener,
        Arc::new(page),
        ServeOptions::new("page", config.max_body_bytes),
        shutdown,
    )
    .await
}
