//! Content Security Policy headers and violation reports.

use indexmap::IndexMap;
use serde_json::Value;

/// Content Security Policy sent with a document.
#[derive(Clone, Debug, Default)]
pub struct ContentSecurityPolicy {
    /// Directive name to source list, in declaration order.
    directives: IndexMap<String, Vec<String>>,
    /// Report URI for violations.
    report_uri: Option<String>,
}

impl ContentSecurityPolicy {
    /// Create a new empty CSP.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directive. Redeclaring a directive replaces its sources but
    /// keeps its original position.
    pub fn with_directive<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.directives.insert(name.to_lowercase(), values);
        self
    }

    /// Set report URI.
    pub fn with_report_uri(mut self, uri: &str) -> Self {
        self.report_uri = Some(uri.to_string());
        self
    }

    /// Render the policy as a `Content-Security-Policy` header value.
    pub fn header_value(&self) -> String {
        let mut parts: Vec<String> = self
            .directives
            .iter()
            .map(|(name, values)| {
                if values.is_empty() {
                    name.clone()
                } else {
                    format!("{} {}", name, values.join(" "))
                }
            })
            .collect();

        if let Some(uri) = &self.report_uri {
            parts.push(format!("report-uri {}", uri));
        }

        parts.join("; ")
    }
}

/// A CSP violation report as posted by a browser to the `report-uri`.
///
/// The raw JSON is kept as received; accessors read the well-known fields of
/// the legacy `csp-report` envelope.
#[derive(Clone, Debug)]
pub struct CspViolationReport {
    raw: Value,
}

impl CspViolationReport {
    /// Parse a report body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body).map(|raw| Self { raw })
    }

    /// The raw report.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The directive that was violated.
    pub fn violated_directive(&self) -> Option<&str> {
        self.field("violated-directive")
    }

    /// The URI that was blocked.
    pub fn blocked_uri(&self) -> Option<&str> {
        self.field("blocked-uri")
    }

    /// The document the violation occurred in.
    pub fn document_uri(&self) -> Option<&str> {
        self.field("document-uri")
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.raw.get("csp-report")?.get(name)?.as_str()
    }
}
