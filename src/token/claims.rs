//! Claim set carried inside signed access tokens.
//!
//! Field names follow the wire contract consumed by the mobile app and the
//! web dashboard: `camelCase` for the custom claims, registered names
//! (`sub`, `iat`, `exp`, `jti`) for the standard ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator claim separating access tokens from refresh credentials.
///
/// Only `Access` JWTs are minted by this service. Refresh credentials are
/// opaque strings, not JWTs, but the discriminator stays in the claim set so
/// a validator can reject a token presented for the wrong purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Short-lived bearer token for API requests.
    #[serde(rename = "ACCESS")]
    Access,
    /// Long-lived credential used only against the refresh endpoint.
    #[serde(rename = "REFRESH")]
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "ACCESS"),
            Self::Refresh => write!(f, "REFRESH"),
        }
    }
}

/// Claims embedded in every access token issued by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the account's email address.
    pub sub: String,
    /// Token purpose discriminator.
    #[serde(rename = "tokenType")]
    pub token_type: TokenType,
    /// Stable account identifier.
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// Role name used by downstream authorization checks.
    pub role: String,
    /// Issued-at (Unix epoch seconds).
    pub iat: i64,
    /// Expires-at (Unix epoch seconds).
    pub exp: i64,
    /// Unique token identifier, fresh per issuance.
    pub jti: Uuid,
}

impl AccessClaims {
    /// Returns `true` if the expiry timestamp is in the past.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }

    /// Expiry as a UTC timestamp, if `exp` is within the representable range.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}
