//! Bearer-token gate for protected routes.
//!
//! Applied with `middleware::from_fn_with_state` on the protected subset of
//! the router. The gate validates the presented access token, checks that
//! the account behind it still exists and is active, then attaches
//! [`CurrentUser`] and [`BearerToken`] extensions for the handler.
//!
//! Every rejection is the same generic 401: a caller cannot tell a
//! malformed token from an expired, revoked or orphaned one. The gate never
//! mutates token or session state; logout and revocation are handler
//! operations.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::service::AuthService;
use crate::token::TokenType;

/// Identity of the authenticated caller, from the validated token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Stable user identifier.
    pub user_id: Uuid,
    /// Email address the token was minted for.
    pub email: String,
    /// Role claim carried by the token.
    pub role: String,
}

/// The raw bearer credential as presented, for handlers that revoke it.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Extract the bearer credential from the `Authorization` header.
fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
}

/// Authentication middleware for protected routes.
pub async fn bearer_gate(
    State(service): State<Arc<AuthService>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_from_headers(request.headers()).map(str::to_string) else {
        debug!(path = %request.uri().path(), "Missing Authorization header");
        return Error::unauthorized("missing bearer credential").into_response();
    };

    let claims = match service.validator().validate(&token, TokenType::Access).await {
        Ok(claims) => claims,
        Err(e) => {
            debug!(path = %request.uri().path(), error = %e, "Bearer token rejected");
            return e.into_response();
        }
    };

    // The token is cryptographically fine; the account behind it must still
    // be live. A lock or disable takes effect here, mid-token-lifetime.
    let Some(user) = service.directory().find_by_id(claims.user_id).await else {
        debug!(user_id = %claims.user_id, "No account for token subject");
        return Error::unauthorized("no account for token subject").into_response();
    };
    if !user.is_active() {
        debug!(user_id = %user.id, "Inactive account presented a valid token");
        return Error::unauthorized("account disabled or locked").into_response();
    }

    request.extensions_mut().insert(CurrentUser {
        user_id: claims.user_id,
        email: claims.sub,
        role: claims.role,
    });
    request.extensions_mut().insert(BearerToken(token));
    next.run(request).await
}
