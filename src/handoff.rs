//! Federated-login handoff broker.
//!
//! When a browser finishes the identity-provider round trip, the freshly
//! issued credentials must reach the single-page app without riding the
//! redirect URL, where they would land in history and proxy logs. The
//! broker parks the pair under a random state id; the redirect carries only
//! that id and the app collects the pair with one `GET /exchange-token`
//! call.
//!
//! # Guarantees
//!
//! - Redemption is a single atomic map removal: under any interleaving of
//!   concurrent attempts, exactly one caller receives the pair.
//! - Entries live for a short TTL (seconds, not minutes). A never-redeemed
//!   entry is dropped by expiry-on-redeem or the background sweep.
//! - Misses are indistinguishable. Never-existed, expired and
//!   already-redeemed all answer the same way, so the endpoint leaks
//!   nothing about which ids ever existed.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngExt;
use serde::Serialize;
use tracing::debug;

/// The credential pair produced by a completed sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Signed short-lived access token.
    #[serde(rename = "accessToken")]
    pub access_token: String,
    /// Opaque long-lived refresh credential.
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// A parked pair awaiting collection.
#[derive(Debug, Clone)]
struct Parked {
    pair: TokenPair,
    stored_at: Instant,
}

/// One-time store for completed federated sign-ins.
pub struct HandoffBroker {
    entries: DashMap<String, Parked>,
    ttl: Duration,
}

impl HandoffBroker {
    /// Create an empty broker whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Generate an unguessable state id (128 bits, URL-safe).
    #[must_use]
    pub fn generate_state_id() -> String {
        let random_bytes: [u8; 16] = rand::rng().random();
        base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            random_bytes,
        )
    }

    /// Park a pair under `state_id`.
    pub fn store(&self, state_id: &str, pair: TokenPair) {
        self.entries.insert(
            state_id.to_string(),
            Parked {
                pair,
                stored_at: Instant::now(),
            },
        );
    }

    /// Collect and destroy the entry for `state_id`.
    ///
    /// The removal is the redemption: a second caller, concurrent or later,
    /// observes absence. Expired entries are consumed without being
    /// returned.
    pub fn redeem(&self, state_id: &str) -> Option<TokenPair> {
        let (_, parked) = self.entries.remove(state_id)?;
        if parked.stored_at.elapsed() > self.ttl {
            debug!("Discarded expired sign-in handoff on redeem");
            return None;
        }
        Some(parked.pair)
    }

    /// Evict entries that were never collected. Called by the background
    /// maintenance task.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.ttl;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| (e.value().stored_at.elapsed() > ttl).then(|| e.key().clone()))
            .collect();

        let count = stale.len();
        for key in stale {
            self.entries.remove(&key);
        }
        count
    }

    /// Current number of parked pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
