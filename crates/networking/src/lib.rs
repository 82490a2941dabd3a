//! Networking layer for the integrity proxy.
//!
//! This crate handles:
//! - Outbound HTTP fetches of resources to verify
//! - The `Fetcher` seam the proxy is written against
//! - Header names and content type helpers shared by the servers

pub mod client;
pub mod headers;
pub mod response;

pub use client::{ClientConfig, ClientError, Fetcher, HttpClient};
pub use response::FetchedResource;
