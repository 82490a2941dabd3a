//! Security primitives for the integrity proxy.
//!
//! This crate implements:
//! - Subresource Integrity (SRI) token parsing and digest verification
//! - Content Security Policy (CSP) headers and violation reports
//! - Cross-Origin Resource Sharing (CORS) response headers

pub mod cors;
pub mod csp;
pub mod sri;

pub use cors::CorsConfig;
pub use csp::{ContentSecurityPolicy, CspViolationReport};
pub use sri::{HashAlgorithm, IntegrityError, IntegrityToken};
