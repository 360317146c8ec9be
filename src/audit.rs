//! Audit trail for authentication lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with the serialized event in
//! the `audit` field, making the trail queryable by any log aggregator
//! (Loki, CloudWatch, Datadog).
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `auth.login_succeeded` | Credentials verified and a token pair issued |
//! | `auth.login_failed` | Login rejected (unknown address, bad password, inactive account) |
//! | `auth.token_refreshed` | A refresh token was exchanged for a new pair |
//! | `auth.logout` | Access token revoked and the user's refresh sessions closed |
//! | `auth.sessions_revoked` | All refresh sessions for a user revoked administratively |
//! | `auth.handoff_stored` | Token pair parked for one-time pickup after federated login |
//! | `auth.handoff_redeemed` | A parked token pair was claimed |
//! | `auth.password_reset_requested` | A reset was requested for an address |
//!
//! # Delivery
//!
//! Recording an event never blocks and never fails the caller: [`AuditLog`]
//! pushes onto a bounded channel with [`try_send`], and a background worker
//! drains the channel into `tracing`. When the buffer is full the event is
//! dropped and counted, so a slow log sink cannot stall a login.
//!
//! [`try_send`]: tokio::sync::mpsc::Sender::try_send

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::directory::UserRecord;

/// Structured audit event for one authentication lifecycle transition.
///
/// Credentials never appear here: tokens are referenced only through
/// [`token_fingerprint`] digests.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"auth.login_succeeded"`).
    pub event: &'static str,
    /// Email address involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Stable user identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Role granted to the issued credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Refresh session affected by the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Session replaced during rotation (for `auth.token_refreshed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_session_id: Option<Uuid>,
    /// One-time handoff state identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    /// Fingerprint of the affected token, never the token itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_fp: Option<String>,
    /// Number of refresh sessions revoked by the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<usize>,
    /// Client IP address (when available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
    /// Human-readable reason for failure events. Server-side only; the
    /// HTTP layer returns a generic message to the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(event: &'static str) -> Self {
        Self {
            event,
            email: None,
            user_id: None,
            role: None,
            session_id: None,
            previous_session_id: None,
            state_id: None,
            token_fp: None,
            revoked: None,
            client_ip: None,
            reason: None,
        }
    }

    /// Construct an `auth.login_succeeded` event.
    #[must_use]
    pub fn login_succeeded(user: &UserRecord, client_ip: Option<IpAddr>) -> Self {
        Self {
            email: Some(user.email.clone()),
            user_id: Some(user.id),
            role: Some(user.role.clone()),
            client_ip,
            ..Self::base("auth.login_succeeded")
        }
    }

    /// Construct an `auth.login_failed` event.
    #[must_use]
    pub fn login_failed(
        email: &str,
        reason: impl Into<String>,
        client_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            email: Some(email.to_string()),
            reason: Some(reason.into()),
            client_ip,
            ..Self::base("auth.login_failed")
        }
    }

    /// Construct an `auth.token_refreshed` event recording the rotation.
    #[must_use]
    pub fn token_refreshed(user_id: Uuid, previous_session: Uuid, new_session: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            session_id: Some(new_session),
            previous_session_id: Some(previous_session),
            ..Self::base("auth.token_refreshed")
        }
    }

    /// Construct an `auth.logout` event.
    #[must_use]
    pub fn logout(user_id: Uuid, token_fp: String, revoked: usize) -> Self {
        Self {
            user_id: Some(user_id),
            token_fp: Some(token_fp),
            revoked: Some(revoked),
            ..Self::base("auth.logout")
        }
    }

    /// Construct an `auth.sessions_revoked` event (administrative revoke-all).
    #[must_use]
    pub fn sessions_revoked(user_id: Uuid, revoked: usize) -> Self {
        Self {
            user_id: Some(user_id),
            revoked: Some(revoked),
            ..Self::base("auth.sessions_revoked")
        }
    }

    /// Construct an `auth.handoff_stored` event.
    #[must_use]
    pub fn handoff_stored(user_id: Uuid, state_id: &str) -> Self {
        Self {
            user_id: Some(user_id),
            state_id: Some(state_id.to_string()),
            ..Self::base("auth.handoff_stored")
        }
    }

    /// Construct an `auth.handoff_redeemed` event.
    #[must_use]
    pub fn handoff_redeemed(state_id: &str) -> Self {
        Self {
            state_id: Some(state_id.to_string()),
            ..Self::base("auth.handoff_redeemed")
        }
    }

    /// Construct an `auth.password_reset_requested` event.
    #[must_use]
    pub fn password_reset_requested(email: &str, client_ip: Option<IpAddr>) -> Self {
        Self {
            email: Some(email.to_string()),
            client_ip,
            ..Self::base("auth.password_reset_requested")
        }
    }
}

/// Handle for recording audit events from request handlers.
///
/// Cheap to clone; all clones feed the same background worker. The worker
/// exits once every handle has been dropped.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl AuditLog {
    /// Spawn the background worker and return a recording handle.
    ///
    /// `buffer` is the number of events that may be queued before new ones
    /// are dropped. A zero buffer is bumped to one.
    #[must_use]
    pub fn spawn(buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                emit(&event);
            }
            tracing::debug!("audit worker stopped");
        });
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue an event for emission. Never blocks.
    ///
    /// A full or closed buffer drops the event and bumps the counter; the
    /// caller's own outcome is unaffected.
    pub fn record(&self, event: AuditEvent) {
        if let Err(err) = self.tx.try_send(event) {
            let lost = match &err {
                TrySendError::Full(e) | TrySendError::Closed(e) => e.event,
            };
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                event = lost,
                total_dropped = total,
                "audit buffer unavailable, event dropped"
            );
        }
    }

    /// Total number of events dropped since startup.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Serialize and emit one event through `tracing`.
fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "auth audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}

/// Short stable fingerprint for correlating log lines about one credential.
///
/// First 16 hex characters of the SHA-256 digest. The credential itself
/// never reaches the log output.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(16);
    hex
}
