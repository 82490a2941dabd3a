//! Static file serving for the asset origin ("CDN") and the page server.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Request, StatusCode};
use integrity_security::CorsConfig;
use networking::headers::content_type;
use tracing::{debug, error};

use crate::config::AssetServerConfig;
use crate::response::{extend_headers, never_cache, plain, with_body, HttpResponse};
use crate::server::Handler;

/// Files under a root directory, addressed by URL path.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    root: PathBuf,
}

/// Result of looking a request path up.
#[derive(Debug)]
pub enum Lookup {
    /// File contents.
    Found { path: PathBuf, body: Bytes },
    /// The path climbs out of the root.
    Forbidden,
    /// No such file, or a directory.
    NotFound,
    /// Any other IO failure.
    Failed(io::Error),
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a URL path under the root.
    ///
    /// Empty and `.` segments are dropped and `..` removes the previous
    /// segment, as URL normalization does. Returns `None` if the path would
    /// leave the root. Percent-escapes are not decoded.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in request_path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop()?;
                }
                s => segments.push(s),
            }
        }

        let mut path = self.root.clone();
        path.extend(segments);
        Some(path)
    }

    /// Read the file for a URL path.
    pub async fn read(&self, request_path: &str) -> Lookup {
        let Some(path) = self.resolve(request_path) else {
            return Lookup::Forbidden;
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Lookup::NotFound,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Lookup::NotFound,
            Err(err) => return Lookup::Failed(err),
        }

        match tokio::fs::read(&path).await {
            Ok(body) => Lookup::Found {
                path,
                body: Bytes::from(body),
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Lookup::NotFound,
            Err(err) => Lookup::Failed(err),
        }
    }
}

/// Turn a lookup into a response.
///
/// Found files get `content_type_for(path)`, no-cache headers and the CORS
/// response headers; failures become short plain-text responses.
pub fn serve_lookup<F>(
    lookup: Lookup,
    content_type_for: F,
    cors: &CorsConfig,
) -> HttpResponse
where
    F: FnOnce(&Path) -> &'static str,
{
    match lookup {
        Lookup::Found { path, body } => {
            debug!(path = %path.display(), "serving file");
            let mut response = with_body(
                StatusCode::OK,
                HeaderValue::from_static(content_type_for(&path)),
                body,
            );
            never_cache(&mut response);
            extend_headers(&mut response, cors.response_headers());
            response
        }
        Lookup::Forbidden => plain(StatusCode::FORBIDDEN, "Access Denied"),
        Lookup::NotFound => plain(StatusCode::NOT_FOUND, "Not Found"),
        Lookup::Failed(err) => {
            error!(error = %err, "error serving file");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// The asset origin: every file is served as JavaScript.
pub struct AssetServer {
    files: StaticFiles,
    cors: CorsConfig,
}

impl AssetServer {
    pub fn new(config: &AssetServerConfig) -> Self {
        Self {
            files: StaticFiles::new(&config.root),
            cors: CorsConfig::permissive(),
        }
    }
}

#[async_trait]
impl Handler for AssetServer {
    async fn handle(&self, request: Request<Bytes>) -> HttpResponse {
        let lookup = self.files.read(request.uri().path()).await;
        serve_lookup(lookup, |_| content_type::JAVASCRIPT, &self.cors)
    }
}
