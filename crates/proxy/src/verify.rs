//! Fetch-and-verify of a single resource.
//!
//! `IntegrityVerifier::verify` never fails: every way a verification can end
//! is a variant of [`VerificationOutcome`], and the HTTP mapping lives in
//! `response.rs`.

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use integrity_security::{IntegrityError, IntegrityToken};
use networking::headers::content_type;
use networking::Fetcher;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::form_urlencoded;

/// Why a request could not be turned into a [`VerificationRequest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing or empty `url` parameter")]
    MissingUrl,
    #[error("missing `integrity` parameter")]
    MissingIntegrity,
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// A validated verification request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Resource to fetch. Not validated beyond being non-empty; a malformed
    /// URL surfaces as a fetch failure.
    pub target_url: String,
    /// Expected digest.
    pub token: IntegrityToken,
}

impl VerificationRequest {
    /// Build a request from raw parameter values.
    pub fn new(url: Option<&str>, integrity: Option<&str>) -> Result<Self, RequestError> {
        let target_url = url
            .filter(|u| !u.is_empty())
            .ok_or(RequestError::MissingUrl)?;
        let integrity = integrity.ok_or(RequestError::MissingIntegrity)?;
        let token = IntegrityToken::parse(integrity)?;

        Ok(Self {
            target_url: target_url.to_string(),
            token,
        })
    }

    /// Build a request from a query string (`url=...&integrity=...`).
    ///
    /// The first occurrence of each parameter wins.
    pub fn from_query(query: Option<&str>) -> Result<Self, RequestError> {
        let mut url = None;
        let mut integrity = None;

        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "url" if url.is_none() => url = Some(value.into_owned()),
                "integrity" if integrity.is_none() => integrity = Some(value.into_owned()),
                _ => {}
            }
        }

        Self::new(url.as_deref(), integrity.as_deref())
    }
}

/// Result of verifying one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The digest matched; serve the fetched bytes.
    Match {
        body: Bytes,
        content_type: HeaderValue,
    },
    /// The digest did not match.
    Mismatch,
    /// The upstream answered with a non-2xx status.
    UpstreamError(StatusCode),
    /// Missing parameters or an unsupported integrity token.
    InvalidRequest,
    /// Transport failure or any other error while fetching.
    InternalError(String),
}

impl VerificationOutcome {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationOutcome::Match { .. } => "match",
            VerificationOutcome::Mismatch => "mismatch",
            VerificationOutcome::UpstreamError(_) => "upstream_error",
            VerificationOutcome::InvalidRequest => "invalid_request",
            VerificationOutcome::InternalError(_) => "internal_error",
        }
    }

    /// Check if the content may be executed.
    pub fn is_match(&self) -> bool {
        matches!(self, VerificationOutcome::Match { .. })
    }
}

/// Fetches resources and checks them against their integrity token.
///
/// Holds no state besides the fetcher: every call fetches and hashes afresh.
pub struct IntegrityVerifier<F> {
    fetcher: F,
}

impl<F: Fetcher> IntegrityVerifier<F> {
    /// Create a verifier on top of a fetcher.
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Parse a query string and verify it.
    ///
    /// Invalid requests are rejected before any fetch is attempted.
    pub async fn verify_query(&self, query: Option<&str>) -> VerificationOutcome {
        match VerificationRequest::from_query(query) {
            Ok(request) => self.verify(&request).await,
            Err(err) => {
                debug!(error = %err, "rejecting verification request");
                VerificationOutcome::InvalidRequest
            }
        }
    }

    /// Fetch the target once and compare its digest.
    pub async fn verify(&self, request: &VerificationRequest) -> VerificationOutcome {
        let outcome = match self.fetcher.fetch(&request.target_url).await {
            Err(err) => VerificationOutcome::InternalError(err.to_string()),
            Ok(resource) if !resource.is_success() => {
                VerificationOutcome::UpstreamError(resource.status)
            }
            Ok(resource) => {
                if request.token.matches(&resource.body) {
                    VerificationOutcome::Match {
                        content_type: resource
                            .content_type
                            .unwrap_or_else(|| HeaderValue::from_static(content_type::JAVASCRIPT)),
                        body: resource.body,
                    }
                } else {
                    VerificationOutcome::Mismatch
                }
            }
        };

        match &outcome {
            VerificationOutcome::Match { body, .. } => info!(
                url = %request.target_url,
                algorithm = %request.token.algorithm,
                bytes = body.len(),
                "integrity verified"
            ),
            VerificationOutcome::Mismatch => warn!(
                url = %request.target_url,
                integrity = %request.token.expected,
                algorithm = %request.token.algorithm,
                "integrity mismatch"
            ),
            VerificationOutcome::UpstreamError(status) => warn!(
                url = %request.target_url,
                status = status.as_u16(),
                "upstream returned an error status"
            ),
            VerificationOutcome::InternalError(err) => warn!(
                url = %request.target_url,
                error = %err,
                "fetch failed"
            ),
            VerificationOutcome::InvalidRequest => {}
        }

        outcome
    }
}
