//! Integrity Proxy - Subresource Integrity verification for third-party scripts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use integrity_security::{HashAlgorithm, IntegrityToken};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use integrity_proxy::{
    run_assets, run_page, run_proxy, shutdown_signal, AssetServerConfig, PageServerConfig,
    ProxyConfig,
};

/// Integrity Proxy - verify third-party scripts before they run
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the integrity verification proxy
    Proxy(ProxyArgs),
    /// Run the asset origin serving third-party scripts
    Cdn(CdnArgs),
    /// Run the demo page server
    Page(PageArgs),
    /// Run proxy, asset origin and page server together
    All {
        #[command(flatten)]
        proxy: ProxyArgs,
        #[command(flatten)]
        cdn: CdnArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Print the integrity token of a file
    Digest {
        /// File to hash
        file: PathBuf,

        /// Hash algorithm (sha256, sha384, sha512)
        #[arg(long, default_value = "sha384")]
        algorithm: HashAlgorithm,
    },
}

#[derive(ClapArgs, Debug)]
struct ProxyArgs {
    /// Proxy listen address
    #[arg(long, default_value = "127.0.0.1:9000")]
    proxy_listen: SocketAddr,

    /// Upstream fetch timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

impl ProxyArgs {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig::default()
            .with_listen(self.proxy_listen)
            .with_fetch_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(ClapArgs, Debug)]
struct CdnArgs {
    /// Asset origin listen address
    #[arg(long, default_value = "127.0.0.1:8888")]
    cdn_listen: SocketAddr,

    /// Directory of scripts to serve
    #[arg(long, default_value = "demo/third-party-scripts")]
    cdn_root: PathBuf,
}

impl CdnArgs {
    fn into_config(self) -> AssetServerConfig {
        AssetServerConfig::default()
            .with_listen(self.cdn_listen)
            .with_root(self.cdn_root)
    }
}

#[derive(ClapArgs, Debug)]
struct PageArgs {
    /// Page server listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    page_listen: SocketAddr,

    /// Directory of public files
    #[arg(long, default_value = "demo/public")]
    page_root: PathBuf,

    /// Directory for the CSP violation log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Origin the page is served from, used in the report URI
    #[arg(long, default_value = "http://localhost:8000")]
    page_origin: String,

    /// Origin of the asset server, allowed to serve scripts
    #[arg(long, default_value = "http://localhost:8888")]
    cdn_origin: String,

    /// Origin of the proxy, allowed to serve scripts
    #[arg(long, default_value = "http://localhost:9000")]
    proxy_origin: String,
}

impl PageArgs {
    fn into_config(self) -> PageServerConfig {
        PageServerConfig {
            page_origin: self.page_origin,
            cdn_origin: self.cdn_origin,
            proxy_origin: self.proxy_origin,
            ..PageServerConfig::default()
        }
        .with_listen(self.page_listen)
        .with_root(self.page_root)
        .with_log_dir(self.log_dir)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Proxy(proxy) => {
            info!("Integrity Proxy v{}", integrity_proxy::VERSION);
            run_proxy(&proxy.into_config(), shutdown_signal())
                .await
                .context("proxy server failed")?;
        }
        Command::Cdn(cdn) => {
            run_assets(&cdn.into_config(), shutdown_signal())
                .await
                .context("asset server failed")?;
        }
        Command::Page(page) => {
            run_page(&page.into_config(), shutdown_signal())
                .await
                .context("page server failed")?;
        }
        Command::All { proxy, cdn, page } => {
            info!("Integrity Proxy v{}", integrity_proxy::VERSION);
            let (proxy, cdn, page) = (proxy.into_config(), cdn.into_config(), page.into_config());
            tokio::try_join!(
                async {
                    run_proxy(&proxy, shutdown_signal())
                        .await
                        .context("proxy server failed")
                },
                async {
                    run_assets(&cdn, shutdown_signal())
                        .await
                        .context("asset server failed")
                },
                async {
                    run_page(&page, shutdown_signal())
                        .await
                        .context("page server failed")
                },
            )?;
        }
        Command::Digest { file, algorithm } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            println!("{}", IntegrityToken::generate(&content, algorithm));
        }
    }

    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_proxy_defaults() {
        let args = Args::parse_from(["integrity-proxy", "proxy"]);
        assert!(!args.verbose);
        match args.command {
            Command::Proxy(proxy) => {
                let config = proxy.into_config();
                assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 9000)));
                assert_eq!(config.fetch_timeout, Duration::from_secs(10));
                assert!(config.no_store);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_args_all_with_overrides() {
        let args = Args::parse_from([
            "integrity-proxy",
            "all",
            "--verbose",
            "--proxy-listen",
            "0.0.0.0:9100",
            "--cdn-root",
            "/srv/scripts",
            "--proxy-origin",
            "http://localhost:9100",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::All { proxy, cdn, page } => {
                assert_eq!(proxy.into_config().listen.port(), 9100);
                assert_eq!(cdn.into_config().root, PathBuf::from("/srv/scripts"));
                assert_eq!(page.into_config().proxy_origin, "http://localhost:9100");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_args_digest() {
        let args = Args::parse_from(["integrity-proxy", "digest", "worker.js", "--algorithm", "sha256"]);
        match args.command {
            Command::Digest { file, algorithm } => {
                assert_eq!(file, PathBuf::from("worker.js"));
                assert_eq!(algorithm, HashAlgorithm::Sha256);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let args = Args::parse_from(["integrity-proxy", "digest", "worker.js"]);
        assert!(matches!(
            args.command,
            Command::Digest { algorithm: HashAlgorithm::Sha384, .. }
        ));
    }

    #[test]
    fn test_args_rejects_unknown_algorithm() {
        assert!(Args::try_parse_from(["integrity-proxy", "digest", "f.js", "--algorithm", "md5"]).is_err());
        assert!(Args::try_parse_from(["integrity-proxy"]).is_err());
    }
}
