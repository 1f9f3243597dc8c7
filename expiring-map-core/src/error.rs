//! Error types for the expiring map.

use thiserror::Error;

/// Errors returned by [`ExpiringMap`](crate::ExpiringMap) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The key is absent or its entry has already expired
    #[error("key not found")]
    NotFound,

    /// The sweep interval must be greater than zero
    #[error("sweep interval must be greater than zero")]
    InvalidSweepInterval,

    /// The map was constructed outside of a Tokio runtime
    #[error("expiring map requires a Tokio runtime to spawn its sweeper")]
    NoRuntime,
}

impl Error {
    /// Returns `true` if this error means the key was absent or expired.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
