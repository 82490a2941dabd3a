//! Common types shared across the integrity proxy workspace.

pub mod error;

pub use error::{ServiceError, ServiceResult};
