//! Error types for the Apiary auth service

use std::io;

use thiserror::Error;

/// Result type alias for the Apiary auth service
pub type Result<T> = std::result::Result<T, Error>;

/// Apiary auth errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token failed structural or signature checks
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token expiry is in the past
    #[error("Token expired")]
    Expired,

    /// Token is present in the revocation ledger
    #[error("Token revoked")]
    Revoked,

    /// Credentials, session or token did not authenticate
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Client exceeded its rate-limit bucket
    #[error("Too many requests")]
    TooManyRequests,

    /// Exchange ticket missing, expired or already redeemed
    #[error("Exchange ticket not found")]
    HandoffNotFound,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an `Unauthorized` error with a reason kept for server-side logs.
    ///
    /// The reason never reaches a client; the HTTP layer collapses every
    /// authentication failure into one generic 401 body.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// Whether this error is one of the authentication failure kinds that
    /// must be indistinguishable on the wire.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::Expired | Self::Revoked | Self::Unauthorized(_)
        )
    }
}
