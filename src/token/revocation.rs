//! Revocation ledger: the deny-list consulted on every token validation.
//!
//! Logout and compromise handling cannot recall a signed token, so the
//! ledger records the raw token under a `blacklist:` key until the token
//! would have expired on its own. Entries are sized from the token's own
//! `exp` claim, clamped to a minimum floor so an entry never dies before
//! the token it blocks.
//!
//! The [`RevocationLedger`] trait abstracts the backing store. The only
//! current implementation is [`InMemoryRevocationLedger`], a `DashMap` with
//! lazy eviction on read plus a periodic background sweep.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use super::codec::peek_expiry;

/// Key prefix shared with the other services that read the deny-list.
const LEDGER_PREFIX: &str = "blacklist:";

/// Trait abstracting the revocation ledger backend.
///
/// Implementations must be `Send + Sync` because the ledger is consulted
/// concurrently from every request task.
#[async_trait::async_trait]
pub trait RevocationLedger: Send + Sync + 'static {
    /// Record a token as revoked.
    ///
    /// Never fails: when the token's expiry cannot be read, the entry gets
    /// a fixed fallback lifetime instead of being dropped.
    async fn revoke(&self, token: &str);

    /// Whether a token is currently on the deny-list.
    async fn is_revoked(&self, token: &str) -> bool;

    /// Remove entries whose deadline has passed. Called by the sweeper.
    async fn reap_expired(&self) -> usize;
}

/// In-memory deny-list keyed `blacklist:<raw token>` with per-entry deadlines.
pub struct InMemoryRevocationLedger {
    entries: DashMap<String, Instant>,
    /// Floor for the entry lifetime, absorbing clock skew between hosts.
    min_ttl: Duration,
    /// Lifetime applied when the token's `exp` claim cannot be read.
    fallback_ttl: Duration,
}

impl InMemoryRevocationLedger {
    /// Create an empty ledger with the given entry-lifetime bounds.
    #[must_use]
    pub fn new(min_ttl: Duration, fallback_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            min_ttl,
            fallback_ttl,
        }
    }

    /// Lifetime for a new entry: remaining token lifetime, clamped to the
    /// floor, or the fallback when the expiry cannot be read at all.
    fn entry_ttl(&self, token: &str) -> Duration {
        match peek_expiry(token) {
            Some(exp) => {
                let remaining = (exp - chrono::Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                remaining.max(self.min_ttl)
            }
            None => {
                warn!("Revoking token with unreadable expiry, applying fallback lifetime");
                self.fallback_ttl
            }
        }
    }
}

#[async_trait::async_trait]
impl RevocationLedger for InMemoryRevocationLedger {
    async fn revoke(&self, token: &str) {
        let ttl = self.entry_ttl(token);
        let deadline = Instant::now() + ttl;
        self.entries
            .insert(format!("{LEDGER_PREFIX}{token}"), deadline);
        debug!(ttl_secs = ttl.as_secs(), "Token added to revocation ledger");
    }

    async fn is_revoked(&self, token: &str) -> bool {
        let key = format!("{LEDGER_PREFIX}{token}");
        let Some(deadline) = self.entries.get(&key).map(|e| *e.value()) else {
            return false;
        };

        if Instant::now() < deadline {
            return true;
        }

        // Lazy eviction: the entry outlived the token it was blocking.
        self.entries.remove(&key);
        false
    }

    async fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, deadline| *deadline > now);
        before - self.entries.len()
    }
}
