//! Refresh session store: the server-side half of every issued token pair.
//!
//! Access tokens are stateless and die on their own; refresh credentials
//! are opaque strings backed by a [`RefreshSession`] record here. A session
//! stays in the store until its natural expiry even after revocation, so a
//! replayed credential keeps failing instead of silently vanishing.
//!
//! The [`RefreshSessionStore`] trait abstracts the backing store. The only
//! current implementation is [`InMemorySessionStore`], a `DashMap` keyed by
//! the opaque credential with lazy eviction on read plus a periodic sweep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Prefix on every refresh credential. Makes leaked credentials greppable
/// and detectable by secret scanners.
const TOKEN_PREFIX: &str = "apy_";

/// A long-lived refresh session tied to one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSession {
    /// Stable session identifier (for audit trails).
    pub id: Uuid,
    /// The opaque credential value (`apy_<base64>`).
    pub token: String,
    /// Account this session belongs to.
    pub user_id: Uuid,
    /// When the session was created.
    pub issued_at: DateTime<Utc>,
    /// When the session stops being redeemable.
    pub expires_at: DateTime<Utc>,
    /// Set by logout, forced reset or account lock. Never unset.
    pub revoked: bool,
}

impl RefreshSession {
    /// Returns `true` once the session has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// A session is redeemable while it is neither expired nor revoked.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}

/// Trait abstracting the refresh session backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request tasks.
#[async_trait::async_trait]
pub trait RefreshSessionStore: Send + Sync + 'static {
    /// Create and persist a new session for an account.
    ///
    /// Accounts may hold any number of live sessions at once, one per
    /// signed-in device.
    async fn issue(&self, user_id: Uuid, ttl: Duration) -> RefreshSession;

    /// Look up a presented credential and check it is still redeemable.
    async fn verify(&self, token: &str) -> Result<RefreshSession>;

    /// Mark a single session revoked. Returns `true` if it existed.
    async fn revoke(&self, token: &str) -> bool;

    /// Mark every live session of an account revoked, returning how many
    /// were newly marked. Used by logout, forced password reset and
    /// account locks.
    async fn revoke_all(&self, user_id: Uuid) -> usize;

    /// Remove sessions past their expiry. Called by the maintenance sweep.
    async fn reap_expired(&self) -> usize;
}

/// In-memory session store keyed by the opaque credential value.
pub struct InMemorySessionStore {
    sessions: DashMap<String, RefreshSession>,
}

impl InMemorySessionStore {
    /// Create an empty session store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Generate a cryptographically random opaque refresh credential.
    ///
    /// Format: `apy_<43-char URL-safe base64>` (256 bits of entropy).
    #[must_use]
    pub fn generate_token() -> String {
        let random_bytes: [u8; 32] = rand::rng().random();
        format!(
            "{TOKEN_PREFIX}{}",
            base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                random_bytes,
            )
        )
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RefreshSessionStore for InMemorySessionStore {
    async fn issue(&self, user_id: Uuid, ttl: Duration) -> RefreshSession {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let session = RefreshSession {
            id: Uuid::new_v4(),
            token: Self::generate_token(),
            user_id,
            issued_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            revoked: false,
        };

        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    async fn verify(&self, token: &str) -> Result<RefreshSession> {
        let Some(entry) = self.sessions.get(token) else {
            return Err(Error::unauthorized("unknown refresh credential"));
        };
        let session = entry.clone();
        drop(entry);

        if session.is_expired() {
            // Lazy eviction: remove on access
            self.sessions.remove(token);
            debug!(session_id = %session.id, "Lazy-evicted expired refresh session");
            return Err(Error::unauthorized("refresh session expired"));
        }

        if session.revoked {
            return Err(Error::unauthorized("refresh session revoked"));
        }

        Ok(session)
    }

    async fn revoke(&self, token: &str) -> bool {
        match self.sessions.get_mut(token) {
            Some(mut entry) => {
                entry.revoked = true;
                true
            }
            None => false,
        }
    }

    async fn revoke_all(&self, user_id: Uuid) -> usize {
        let mut marked = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.user_id == user_id && !entry.revoked {
                entry.revoked = true;
                marked += 1;
            }
        }
        marked
    }

    async fn reap_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        before - self.sessions.len()
    }
}
