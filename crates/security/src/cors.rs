//! Cross-Origin Resource Sharing (CORS) response headers for the demo servers.

const ALLOW_ORIGIN: &str = "access-control-allow-origin";
const ALLOW_METHODS: &str = "access-control-allow-methods";
const ALLOW_HEADERS: &str = "access-control-allow-headers";

/// CORS configuration for a server. Any origin may read responses.
#[derive(Clone, Debug)]
pub struct CorsConfig {
    /// Allowed methods, in the order they are advertised.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Preflights allow `GET`, `POST` and `OPTIONS` with a `Content-Type`
    /// header.
    pub fn permissive() -> Self {
        Self {
            allowed_methods: ["GET", "POST", "OPTIONS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_headers: vec!["Content-Type".to_string()],
        }
    }

    /// Headers attached to every non-preflight response.
    pub fn response_headers(&self) -> Vec<(&'static str, String)> {
        vec![(ALLOW_ORIGIN, "*".to_string())]
    }

    /// Headers answering an `OPTIONS` preflight.
    pub fn preflight_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = self.response_headers();
        headers.push((ALLOW_METHODS, self.allowed_methods.join(", ")));
        if !self.allowed_headers.is_empty() {
            headers.push((ALLOW_HEADERS, self.allowed_headers.join(", ")));
        }
        headers
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::permissive()
    }
}
