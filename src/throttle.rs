//! Per-client request throttling.
//!
//! Buckets are token buckets with greedy refill (GCRA via `governor`): a
//! client may burst up to the bucket capacity, and capacity flows back
//! continuously over the window rather than in one batch at the boundary.
//! Each route class gets its own keyed limiter because credential-issuing
//! and password-reset endpoints are higher-value abuse targets than the
//! rest of the API and warrant tighter limits.
//!
//! Throttling runs before authentication, so buckets are keyed by client
//! network identity: the first `X-Forwarded-For` entry when present, the
//! peer address otherwise.
//!
//! Buckets are created lazily per client. A periodic sweep drops buckets
//! that have fully refilled, so the per-client map stays bounded no matter
//! how many distinct clients appear.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::config::{BucketConfig, ThrottleConfig};
use crate::error::Error;

/// Endpoint categories sharing one rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Ordinary API traffic.
    General,
    /// Endpoints that hand out credentials: login, refresh, exchange.
    CredentialIssuing,
    /// Password-reset requests.
    PasswordReset,
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::CredentialIssuing => write!(f, "credential-issuing"),
            Self::PasswordReset => write!(f, "password-reset"),
        }
    }
}

/// Map a request path to its rate-limit class.
#[must_use]
pub fn route_class(path: &str) -> RouteClass {
    match path {
        "/auth/login" | "/auth/refresh" | "/exchange-token" => RouteClass::CredentialIssuing,
        p if p.starts_with("/auth/password-reset") => RouteClass::PasswordReset,
        _ => RouteClass::General,
    }
}

/// Bucket key for a request: first `X-Forwarded-For` entry, else peer IP.
///
/// Runs before authentication so only network identity is available.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Keyed token buckets, one limiter per route class.
pub struct RequestThrottle {
    enabled: bool,
    general: DefaultKeyedRateLimiter<String>,
    credential_issuing: DefaultKeyedRateLimiter<String>,
    password_reset: DefaultKeyedRateLimiter<String>,
}

impl RequestThrottle {
    /// Build the per-class limiters from configuration.
    ///
    /// The bucket parameters live in [`ThrottleConfig`] and nowhere else;
    /// handlers and middleware all see the same numbers.
    #[must_use]
    pub fn new(config: &ThrottleConfig) -> Self {
        Self {
            enabled: config.enabled,
            general: RateLimiter::keyed(quota(&config.general)),
            credential_issuing: RateLimiter::keyed(quota(&config.credential_issuing)),
            password_reset: RateLimiter::keyed(quota(&config.password_reset)),
        }
    }

    fn limiter(&self, class: RouteClass) -> &DefaultKeyedRateLimiter<String> {
        match class {
            RouteClass::General => &self.general,
            RouteClass::CredentialIssuing => &self.credential_issuing,
            RouteClass::PasswordReset => &self.password_reset,
        }
    }

    /// Atomically try to consume one token from the client's bucket.
    ///
    /// Returns `true` when the request may proceed.
    #[must_use]
    pub fn admit(&self, client: &str, class: RouteClass) -> bool {
        if !self.enabled {
            return true;
        }
        self.limiter(class).check_key(&client.to_string()).is_ok()
    }

    /// Drop buckets that have fully refilled since their last use.
    ///
    /// Called by the background maintenance task to keep the lazily
    /// created per-client state bounded.
    pub fn sweep_idle(&self) {
        for limiter in [&self.general, &self.credential_issuing, &self.password_reset] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of client buckets currently tracked across all classes.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.general.len() + self.credential_issuing.len() + self.password_reset.len()
    }
}

/// Translate a [`BucketConfig`] into a GCRA quota: burst up to `capacity`,
/// refilling `refill` tokens per `window`.
fn quota(bucket: &BucketConfig) -> Quota {
    let capacity = NonZeroU32::new(bucket.capacity).unwrap_or(NonZeroU32::MIN);
    let refill = NonZeroU32::new(bucket.refill).unwrap_or(NonZeroU32::MIN);
    let period = bucket.window / refill.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(refill))
        .allow_burst(capacity)
}

/// Throttling middleware. Layered outside the authentication gate so the
/// cheap identity-independent check runs first.
pub async fn throttle_middleware(
    State(throttle): State<Arc<RequestThrottle>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let class = route_class(request.uri().path());
    let peer = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = client_key(request.headers(), peer);

    if throttle.admit(&client, class) {
        next.run(request).await
    } else {
        warn!(client = %client, class = %class, path = %request.uri().path(), "Rate limit exceeded");
        debug!(tracked = throttle.tracked_clients(), "Throttle bucket count");
        Error::TooManyRequests.into_response()
    }
}
