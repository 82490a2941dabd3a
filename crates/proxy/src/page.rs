//! Page server: the demo document, its policy and the violation report sink.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{ServiceError, ServiceResult};
use http::header::{HeaderValue, CONTENT_SECURITY_POLICY};
use http::{Method, Request, StatusCode};
use integrity_security::{CorsConfig, CspViolationReport};
use networking::headers::content_type;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::assets::{serve_lookup, StaticFiles};
use crate::config::PageServerConfig;
use crate::response::{empty, extend_headers, plain, HttpResponse};
use crate::server::Handler;

/// Path receiving `report-uri` POSTs.
pub const REPORT_ENDPOINT: &str = "/csp-violation-report-endpoint";

const INDEX: &str = "index.html";

/// Append-only log of CSP violation reports, one line per report.
#[derive(Debug)]
pub struct ViolationLog {
    path: PathBuf,
    write: Mutex<()>,
}

impl ViolationLog {
    /// Open the log, creating its directory.
    pub async fn open(path: impl Into<PathBuf>) -> ServiceResult<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(Self {
            path,
            write: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a report stamped with the current time.
    pub async fn append(&self, report: &CspViolationReport) -> io::Result<()> {
        self.append_at(report, Utc::now()).await
    }

    /// Append a report with an explicit timestamp.
    pub async fn append_at(
        &self,
        report: &CspViolationReport,
        at: DateTime<Utc>,
    ) -> io::Result<()> {
        let line = format_entry(report, at);

        let _guard = self.write.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// `<RFC 3339 UTC, milliseconds> - <compact JSON>\n`
pub fn format_entry(report: &CspViolationReport, at: DateTime<Utc>) -> String {
    format!(
        "{} - {}\n",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        report.raw()
    )
}

/// Serves the demo page with its Content-Security-Policy and collects
/// violation reports.
pub struct PageServer {
    files: StaticFiles,
    cors: CorsConfig,
    policy: HeaderValue,
    log: ViolationLog,
}

impl PageServer {
    /// Build the policy and open the violation log.
    pub async fn new(config: &PageServerConfig) -> ServiceResult<Self> {
        let policy = config.content_security_policy()?;
        let policy = HeaderValue::from_str(&policy.header_value())
            .map_err(|e| ServiceError::config(format!("invalid policy: {}", e)))?;
        let log = ViolationLog::open(config.violation_log_path()).await?;

        Ok(Self {
            files: StaticFiles::new(&config.root),
            cors: CorsConfig::permissive(),
            policy,
            log,
        })
    }

    async fn report(&self, body: &[u8]) -> HttpResponse {
        let report = match CspViolationReport::from_slice(body) {
            Ok(report) => report,
            Err(err) => {
                debug!(error = %err, "malformed violation report");
                return plain(StatusCode::BAD_REQUEST, "Bad Request");
            }
        };

        match self.log.append(&report).await {
            Ok(()) => info!(
                document = report.document_uri().unwrap_or("-"),
                directive = report.violated_directive().unwrap_or("-"),
                blocked = report.blocked_uri().unwrap_or("-"),
                "CSP violation logged"
            ),
            Err(err) => error!(
                path = %self.log.path().display(),
                error = %err,
                "failed to log CSP violation"
            ),
        }

        plain(StatusCode::OK, "CSP violation logged")
    }

    async fn file(&self, request: &Request<Bytes>) -> HttpResponse {
        let path = match request.uri().path() {
            "/" => "/index.html",
            path => path,
        };

        let lookup = self.files.read(path).await;
        let mut response = serve_lookup(
            lookup,
            |file| {
                let ext = file.extension().and_then(|e| e.to_str()).unwrap_or_default();
                content_type::from_extension(ext)
            },
            &self.cors,
        );

        if response.status().is_success() && is_index(path) {
            response
                .headers_mut()
                .insert(CONTENT_SECURITY_POLICY, self.policy.clone());
        }
        response
    }
}

/// Any path mentioning `index.html` gets the policy, not only the exact file name.
fn is_index(path: &str) -> bool {
    path.contains(INDEX)
}

#[async_trait]
impl Handler for PageServer {
    async fn handle(&self, request: Request<Bytes>) -> HttpResponse {
        if request.method() == Method::POST && request.uri().path() == REPORT_ENDPOINT {
            return self.report(request.body()).await;
        }

        if request.method() == Method::OPTIONS {
            let mut response = empty(StatusCode::NO_CONTENT);
            extend_headers(&mut response, self.cors.preflight_headers());
            return response;
        }

        self.file(&request).await
    }
}
