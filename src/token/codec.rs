//! Signing and parsing of access tokens.
//!
//! One codec, one symmetric key, one algorithm (HS256). Every token this
//! service issues or accepts goes through [`TokenCodec`]; there is no second
//! issuance path to drift out of sync.
//!
//! `decode` deliberately does **not** enforce expiry. Structural and
//! signature failures are a different failure class than an expired but
//! well-formed token, and the revocation ledger must be able to inspect
//! tokens past their natural lifetime. Expiry is a separate, explicit step
//! in [`crate::token::TokenValidator`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use uuid::Uuid;

use super::claims::{AccessClaims, TokenType};
use crate::error::{Error, Result};

/// Encodes and decodes HS256-signed access tokens with a shared secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec from the raw signing secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by the validator, not here. `exp` must still be
        // present for the token to parse at all.
        validation.validate_exp = false;
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Mint a signed access token for an account.
    ///
    /// Each call stamps a fresh `jti`, `iat = now` and `exp = now + ttl`.
    pub fn encode(&self, user_id: Uuid, email: &str, role: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: email.to_string(),
            token_type: TokenType::Access,
            user_id,
            role: role.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(ttl_secs(ttl)),
            jti: Uuid::new_v4(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("jwt encode: {e}")))
    }

    /// Parse a token and verify its signature and structure.
    ///
    /// Any failure collapses into [`Error::Malformed`]; callers never see a
    /// partially-parsed claim set.
    pub fn decode(&self, token: &str) -> Result<AccessClaims> {
        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Malformed(e.to_string()))
    }
}

/// Payload shape for signature-independent expiry reads.
#[derive(Deserialize)]
struct RawExpiry {
    exp: i64,
}

/// Read the `exp` claim from a token without verifying its signature.
///
/// The revocation ledger uses this to size blacklist entries. Skipping
/// signature verification keeps revocation working for tokens signed under
/// a since-rotated key.
#[must_use]
pub fn peek_expiry(token: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return None;
    }

    let payload = base64::Engine::decode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        parts[1],
    )
    .ok()?;

    let raw: RawExpiry = serde_json::from_slice(&payload).ok()?;
    DateTime::from_timestamp(raw.exp, 0)
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}
