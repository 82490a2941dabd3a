//! Wire responses.
//!
//! `VerificationOutcome::into_response` is a pure mapping; nothing here
//! touches the network.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use http::{Response, StatusCode};
use http_body_util::Full;
use networking::headers::{cache_control, content_type};

use crate::verify::VerificationOutcome;

/// Response type produced by every handler.
pub type HttpResponse = Response<Full<Bytes>>;

/// Body served in place of content whose digest did not match.
///
/// Valid, inert script: an importer that loads it blindly keeps running and
/// the failure still shows up in the console.
pub const MISMATCH_SCRIPT: &str =
    "// Integrity check failed\nconsole.error(\"Integrity mismatch\");\n";

/// Body for rejected requests.
pub const INVALID_REQUEST_BODY: &str = "// Invalid request\n";

impl VerificationOutcome {
    /// Status code this outcome is served with.
    pub fn status(&self) -> StatusCode {
        match self {
            VerificationOutcome::Match { .. } | VerificationOutcome::Mismatch => StatusCode::OK,
            VerificationOutcome::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            VerificationOutcome::InvalidRequest => StatusCode::BAD_REQUEST,
            VerificationOutcome::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the wire response for this outcome.
    pub fn into_response(self) -> HttpResponse {
        let status = self.status();
        match self {
            VerificationOutcome::Match { body, content_type } => {
                with_body(status, content_type, body)
            }
            VerificationOutcome::Mismatch => with_body(
                status,
                HeaderValue::from_static(content_type::JAVASCRIPT),
                Bytes::from_static(MISMATCH_SCRIPT.as_bytes()),
            ),
            VerificationOutcome::UpstreamError(upstream) => plain(
                status,
                format!("// Failed to fetch target ({})\n", upstream.as_u16()),
            ),
            VerificationOutcome::InvalidRequest => plain(status, INVALID_REQUEST_BODY),
            VerificationOutcome::InternalError(detail) => {
                plain(status, format!("// Error: {}\n", detail))
            }
        }
    }
}

/// A `text/plain` response.
pub fn plain(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    with_body(status, HeaderValue::from_static(content_type::PLAIN), body.into())
}

/// A response with an explicit content type.
pub fn with_body(status: StatusCode, content_type: HeaderValue, body: Bytes) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}

/// An empty response.
pub fn empty(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Mark a static file response as never cacheable.
pub fn never_cache(response: &mut HttpResponse) {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache_control::NEVER));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

/// Append headers given as `(name, value)` pairs, skipping unrepresentable ones.
pub fn extend_headers<I>(response: &mut HttpResponse, headers: I)
where
    I: IntoIterator<Item = (&'static str, String)>,
{
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
    }
}
