//! Token validation pipeline.
//!
//! # Validation flow
//!
//! 1. Decode: structure and signature via [`TokenCodec`]. Failure is
//!    [`Error::Malformed`].
//! 2. Purpose: the `tokenType` claim must match what the call site expects.
//!    A refresh-typed JWT on an API route fails here.
//! 3. Expiry: `exp` in the past is [`Error::Expired`].
//! 4. Revocation: the ledger is consulted on **every** call. Positive
//!    results are never cached, so a revocation takes effect on the next
//!    request.

use std::sync::Arc;

use chrono::Utc;

use super::claims::{AccessClaims, TokenType};
use super::codec::TokenCodec;
use super::revocation::RevocationLedger;
use crate::error::{Error, Result};

/// Validates presented bearer tokens against the codec and the ledger.
#[derive(Clone)]
pub struct TokenValidator {
    codec: Arc<TokenCodec>,
    ledger: Arc<dyn RevocationLedger>,
}

impl TokenValidator {
    /// Create a validator over a codec and a revocation ledger.
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, ledger: Arc<dyn RevocationLedger>) -> Self {
        Self { codec, ledger }
    }

    /// Run the full validation pipeline, returning the claims on success.
    pub async fn validate(&self, token: &str, expected: TokenType) -> Result<AccessClaims> {
        let claims = self.codec.decode(token)?;

        if claims.token_type != expected {
            return Err(Error::unauthorized(format!(
                "token type {} presented where {expected} expected",
                claims.token_type
            )));
        }

        if claims.is_expired(Utc::now()) {
            return Err(Error::Expired);
        }

        if self.ledger.is_revoked(token).await {
            return Err(Error::Revoked);
        }

        Ok(claims)
    }

    /// Boolean form of [`validate`](Self::validate).
    pub async fn is_valid(&self, token: &str, expected: TokenType) -> bool {
        self.validate(token, expected).await.is_ok()
    }
}
