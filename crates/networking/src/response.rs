//! Fetched resources.

use crate::client::ClientError;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};

/// A resource fetched from an upstream origin.
///
/// The body is only read for successful (2xx) responses; for any other status
/// it is left empty.
#[derive(Clone, Debug)]
pub struct FetchedResource {
    /// Response status code.
    pub status: StatusCode,
    /// Declared `Content-Type`, kept byte-for-byte.
    pub content_type: Option<HeaderValue>,
    /// Response body.
    pub body: Bytes,
}

impl FetchedResource {
    /// A successful resource.
    pub fn ok(body: impl Into<Bytes>, content_type: Option<HeaderValue>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type,
            body: body.into(),
        }
    }

    /// A resource with the given status and no body.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Create a resource from a reqwest response, reading the whole body.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status();
        let content_type = response.headers().get(http::header::CONTENT_TYPE).cloned();

        if !status.is_success() {
            return Ok(Self {
                status,
                content_type,
                body: Bytes::new(),
            });
        }

        let body = response.bytes().await.map_err(ClientError::from)?;

        Ok(Self {
            status,
            content_type,
            body,
        })
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
