//! User directory port.
//!
//! Account storage belongs to the platform's relational layer; this service
//! only needs lookup by email (login) and by id (gate checks on every
//! authenticated request). The [`UserDirectory`] trait is that seam.
//! [`InMemoryUserDirectory`] backs it for tests and single-node deploys,
//! seeded from configuration at startup.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// An account as the auth service sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable account identifier.
    pub id: Uuid,
    /// Login identifier, stored lowercase.
    pub email: String,
    /// bcrypt hash of the account password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role name carried into issued tokens.
    pub role: String,
    /// Cleared when an account is deactivated.
    pub enabled: bool,
    /// Set by abuse handling; locked accounts cannot authenticate.
    pub locked: bool,
}

impl UserRecord {
    /// An account can authenticate only while enabled and not locked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.locked
    }
}

/// Lookup seam over the platform's account storage.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Find an account by its login email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Option<UserRecord>;

    /// Find an account by its stable id.
    async fn find_by_id(&self, id: Uuid) -> Option<UserRecord>;
}

#[derive(Default)]
struct Inner {
    by_email: HashMap<String, UserRecord>,
    by_id: HashMap<Uuid, String>,
}

/// In-memory directory seeded from configuration.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<Inner>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account. Emails are normalized to lowercase.
    pub fn insert(&self, mut user: UserRecord) {
        user.email = user.email.to_lowercase();
        let mut inner = self.inner.write();
        inner.by_id.insert(user.id, user.email.clone());
        inner.by_email.insert(user.email.clone(), user);
    }

    /// Number of seeded accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_email.len()
    }

    /// Return `true` when no accounts are seeded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_email.is_empty()
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.inner.read().by_email.get(&email.to_lowercase()).cloned()
    }

    async fn find_by_id(&self, id: Uuid) -> Option<UserRecord> {
        let inner = self.inner.read();
        let email = inner.by_id.get(&id)?;
        inner.by_email.get(email).cloned()
    }
}

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| Error::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| Error::Internal(format!("bcrypt verify: {e}")))
}
