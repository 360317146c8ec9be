//! Authentication orchestration.
//!
//! [`AuthService`] composes the token codec, validator, revocation ledger,
//! refresh session store, handoff broker and user directory into the
//! operations the HTTP layer exposes: login, refresh (with rotation),
//! logout, federated-login completion, handoff redemption and bulk
//! revocation.
//!
//! All credential failures surface as [`Error`] variants that the HTTP
//! layer folds into one generic 401; the precise reason is only ever
//! recorded on the audit trail.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLog, token_fingerprint};
use crate::config::AuthConfig;
use crate::directory::{UserDirectory, UserRecord, verify_password};
use crate::error::{Error, Result};
use crate::handoff::{HandoffBroker, TokenPair};
use crate::session::RefreshSessionStore;
use crate::token::{RevocationLedger, TokenCodec, TokenType, TokenValidator};

/// Composition root for every authentication flow.
pub struct AuthService {
    codec: Arc<TokenCodec>,
    validator: TokenValidator,
    ledger: Arc<dyn RevocationLedger>,
    sessions: Arc<dyn RefreshSessionStore>,
    handoff: Arc<HandoffBroker>,
    directory: Arc<dyn UserDirectory>,
    audit: AuditLog,
    access_ttl: Duration,
    refresh_ttl: Duration,
    frontend_redirect_url: Url,
}

impl AuthService {
    /// Wire the service from its collaborators and the auth settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configured frontend redirect URL
    /// does not parse.
    pub fn new(
        codec: Arc<TokenCodec>,
        ledger: Arc<dyn RevocationLedger>,
        sessions: Arc<dyn RefreshSessionStore>,
        handoff: Arc<HandoffBroker>,
        directory: Arc<dyn UserDirectory>,
        audit: AuditLog,
        settings: &AuthConfig,
    ) -> Result<Self> {
        let frontend_redirect_url = Url::parse(&settings.frontend_redirect_url).map_err(|e| {
            Error::Config(format!(
                "invalid frontend redirect URL `{}`: {e}",
                settings.frontend_redirect_url
            ))
        })?;
        Ok(Self {
            validator: TokenValidator::new(Arc::clone(&codec), Arc::clone(&ledger)),
            codec,
            ledger,
            sessions,
            handoff,
            directory,
            audit,
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            frontend_redirect_url,
        })
    }

    /// Validator for the authentication gate.
    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Directory handle for the authentication gate's account checks.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// Lifetime of issued access tokens, for `expiresIn` response fields.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Verify credentials and issue a token pair.
    ///
    /// # Errors
    ///
    /// Any failure (unknown address, wrong password, disabled or locked
    /// account) returns [`Error::Unauthorized`]; the distinguishing reason
    /// goes to the audit trail only.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<TokenPair> {
        let Some(user) = self.directory.find_by_email(email).await else {
            return Err(self.login_rejected(email, "unknown address", client_ip));
        };
        if !user.is_active() {
            let reason = if user.enabled {
                "account locked"
            } else {
                "account disabled"
            };
            return Err(self.login_rejected(email, reason, client_ip));
        }
        match verify_password(password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(self.login_rejected(email, "bad password", client_ip)),
            Err(e) => {
                tracing::error!(error = %e, "password hash verification failed");
                return Err(self.login_rejected(email, "hash verification error", client_ip));
            }
        }

        let pair = self.issue_pair(&user).await?;
        self.audit
            .record(AuditEvent::login_succeeded(&user, client_ip));
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh pair, rotating the session.
    ///
    /// The presented refresh token is revoked before its replacement is
    /// issued, so a replayed token fails [`RefreshSessionStore::verify`]
    /// from then on.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] when the token is unknown, expired, revoked,
    /// or its account is gone or inactive.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let previous = self.sessions.verify(refresh_token).await?;
        let Some(user) = self.directory.find_by_id(previous.user_id).await else {
            return Err(Error::unauthorized("no account for refresh session"));
        };
        if !user.is_active() {
            return Err(Error::unauthorized("account disabled or locked"));
        }

        self.sessions.revoke(refresh_token).await;
        let session = self.sessions.issue(user.id, self.refresh_ttl).await;
        let access = self
            .codec
            .encode(user.id, &user.email, &user.role, self.access_ttl)?;
        self.audit
            .record(AuditEvent::token_refreshed(user.id, previous.id, session.id));
        Ok(TokenPair {
            access_token: access,
            refresh_token: session.token,
        })
    }

    /// Revoke the presented access token and every refresh session of the
    /// user. Returns the number of sessions newly revoked.
    ///
    /// Infallible: revocation records a fallback deadline when the token
    /// cannot be introspected, and the audit write never blocks.
    pub async fn logout(&self, user_id: Uuid, bearer: &str) -> usize {
        self.ledger.revoke(bearer).await;
        let revoked = self.sessions.revoke_all(user_id).await;
        self.audit
            .record(AuditEvent::logout(user_id, token_fingerprint(bearer), revoked));
        revoked
    }

    /// Finish a federated login for an identity the provider has asserted.
    ///
    /// Issues a pair, parks it with the handoff broker, and returns the
    /// frontend redirect URL carrying only the one-time state id. The
    /// tokens themselves never appear in the URL.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] when no active local account matches the
    /// asserted address. Provisioning accounts for first-time federated
    /// identities is the directory owner's concern, not this service's.
    pub async fn complete_federated_login(&self, email: &str) -> Result<Url> {
        let Some(user) = self.directory.find_by_email(email).await else {
            return Err(self.login_rejected(email, "no local account for federated identity", None));
        };
        if !user.is_active() {
            return Err(self.login_rejected(email, "account disabled or locked", None));
        }

        let pair = self.issue_pair(&user).await?;
        let state_id = HandoffBroker::generate_state_id();
        self.handoff.store(&state_id, pair);
        self.audit
            .record(AuditEvent::handoff_stored(user.id, &state_id));
        self.audit
            .record(AuditEvent::login_succeeded(&user, None));

        let mut url = self.frontend_redirect_url.clone();
        url.query_pairs_mut().append_pair("state", &state_id);
        Ok(url)
    }

    /// Redeem a one-time handoff state id for its parked token pair.
    ///
    /// # Errors
    ///
    /// [`Error::HandoffNotFound`] whether the id never existed, expired,
    /// or was already redeemed; the three are indistinguishable.
    pub async fn redeem_handoff(&self, state_id: &str) -> Result<TokenPair> {
        match self.handoff.redeem(state_id) {
            Some(pair) => {
                self.audit.record(AuditEvent::handoff_redeemed(state_id));
                Ok(pair)
            }
            None => Err(Error::HandoffNotFound),
        }
    }

    /// Revoke every refresh session of a user (password reset, account
    /// lock). Returns the number of sessions newly revoked.
    pub async fn revoke_all_for(&self, user_id: Uuid) -> usize {
        let revoked = self.sessions.revoke_all(user_id).await;
        self.audit
            .record(AuditEvent::sessions_revoked(user_id, revoked));
        revoked
    }

    /// Record a password reset request for the audit trail.
    ///
    /// Outbound mail is an external collaborator; the HTTP layer answers
    /// 202 regardless of whether the address exists, so this method takes
    /// no position on it either.
    pub async fn request_password_reset(&self, email: &str, client_ip: Option<IpAddr>) {
        self.audit
            .record(AuditEvent::password_reset_requested(email, client_ip));
    }

    async fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair> {
        let access = self
            .codec
            .encode(user.id, &user.email, &user.role, self.access_ttl)?;
        let session = self.sessions.issue(user.id, self.refresh_ttl).await;
        Ok(TokenPair {
            access_token: access,
            refresh_token: session.token,
        })
    }

    fn login_rejected(&self, email: &str, reason: &'static str, client_ip: Option<IpAddr>) -> Error {
        self.audit
            .record(AuditEvent::login_failed(email, reason, client_ip));
        Error::unauthorized(reason)
    }

    /// Validate an access token through the shared validator.
    ///
    /// Convenience for callers outside the HTTP gate (tests, embedding).
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate`].
    pub async fn validate_access(&self, token: &str) -> Result<crate::token::AccessClaims> {
        self.validator.validate(token, TokenType::Access).await
    }
}
