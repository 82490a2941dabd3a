//! Header values used by the servers.

/// Cache-Control values.
pub mod cache_control {
    /// Sent on proxy responses: the verdict of one verification must not be
    /// replayed by an intermediary.
    pub const NO_STORE: &str = "no-store";
    /// Sent upstream so intermediaries revalidate with the origin.
    pub const NO_CACHE: &str = "no-cache";
    /// Sent by the static file servers.
    pub const NEVER: &str = "no-cache, no-store, must-revalidate";
}

/// Content type utilities.
pub mod content_type {
    pub const HTML: &str = "text/html";
    pub const CSS: &str = "text/css";
    pub const JAVASCRIPT: &str = "application/javascript";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    /// Content type for a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "html" => HTML,
            "css" => CSS,
            "js" => JAVASCRIPT,
            _ => OCTET_STREAM,
        }
    }
}
