//! HTTP handlers for the authentication endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/auth/login` | Exchange email + password for a token pair |
//! | `POST` | `/auth/refresh` | Rotate a refresh token into a fresh pair |
//! | `POST` | `/auth/logout` | Revoke the bearer and every session (protected) |
//! | `GET` | `/auth/me` | Identity attached to the request (protected) |
//! | `GET` | `/exchange-token?state=` | One-time pickup of a parked pair |
//! | `POST` | `/auth/password-reset` | Record a reset request |
//! | `POST` | `/admin/revoke?user=` | Bulk session revocation (admin) |
//! | `GET` | `/health` | Liveness probe |
//!
//! ## Admin Authentication
//!
//! `/admin/revoke` requires `Authorization: Bearer <admin_token>` where
//! `admin_token` comes from `admin.bearer_token` in config. If no admin
//! token is configured the endpoint returns `503 Service Unavailable`.

use std::{net::IpAddr, sync::Arc, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::gate::{BearerToken, CurrentUser};
use super::router::AppState;
use crate::error::Error;
use crate::handoff::TokenPair;

// ── Request / Response types ───────────────────────────────────────────────

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Account email address.
    pub email: String,
    /// Plaintext password, verified against the stored bcrypt hash.
    pub password: String,
}

/// Refresh request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// The opaque refresh token to rotate.
    pub refresh_token: String,
}

/// Token pair response for login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Signed access token.
    pub access_token: String,
    /// Opaque refresh token.
    pub refresh_token: String,
    /// Always `"Bearer"`.
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: u64,
}

impl TokenResponse {
    fn from_pair(pair: TokenPair, access_ttl: Duration) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl.as_secs(),
        }
    }
}

/// Query params for the one-time token exchange.
#[derive(Debug, Deserialize)]
pub struct ExchangeQuery {
    /// State id from the federated-login redirect.
    pub state: String,
}

/// Query params for bulk revocation.
#[derive(Debug, Deserialize)]
pub struct RevokeQuery {
    /// User to revoke all refresh sessions for.
    pub user: Uuid,
}

/// Password reset request body.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    /// Address to send reset instructions to.
    pub email: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Extract client IP from `X-Forwarded-For` or `X-Real-IP` headers.
fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
        })
}

/// `POST /auth/login` — Exchange credentials for a token pair.
pub(super) async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    let client_ip = extract_client_ip(&headers);
    match state.service.login(&body.email, &body.password, client_ip).await {
        Ok(pair) => (
            StatusCode::OK,
            Json(TokenResponse::from_pair(pair, state.service.access_ttl())),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /auth/refresh` — Rotate a refresh token into a fresh pair.
pub(super) async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Response {
    match state.service.refresh(&body.refresh_token).await {
        Ok(pair) => (
            StatusCode::OK,
            Json(TokenResponse::from_pair(pair, state.service.access_ttl())),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /auth/logout` — Revoke the presented bearer and all sessions.
///
/// Mounted behind the gate, which injects the extensions read here.
pub(super) async fn logout(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Response {
    let user = request.extensions().get::<CurrentUser>().cloned();
    let bearer = request.extensions().get::<BearerToken>().cloned();
    let (Some(user), Some(BearerToken(bearer))) = (user, bearer) else {
        return Error::unauthorized("request bypassed the gate").into_response();
    };

    state.service.logout(user.user_id, &bearer).await;
    StatusCode::NO_CONTENT.into_response()
}

/// `GET /auth/me` — The identity the gate attached to this request.
pub(super) async fn me(request: Request<Body>) -> Response {
    let Some(user) = request.extensions().get::<CurrentUser>().cloned() else {
        return Error::unauthorized("request bypassed the gate").into_response();
    };

    (
        StatusCode::OK,
        Json(json!({
            "userId": user.user_id,
            "email": user.email,
            "role": user.role,
        })),
    )
        .into_response()
}

/// `GET /exchange-token?state=<id>` — One-time pickup of a parked pair.
pub(super) async fn exchange_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExchangeQuery>,
) -> Response {
    match state.service.redeem_handoff(&query.state).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /auth/password-reset` — Record a reset request.
///
/// Answers 202 whether or not the address exists; mail delivery is an
/// external collaborator.
pub(super) async fn password_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PasswordResetRequest>,
) -> Response {
    let client_ip = extract_client_ip(&headers);
    state
        .service
        .request_password_reset(&body.email, client_ip)
        .await;
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If the address exists, reset instructions will be sent"
        })),
    )
        .into_response()
}

/// `POST /admin/revoke?user=<uuid>` — Revoke all sessions of a user.
///
/// Requires admin authorization.
pub(super) async fn admin_revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RevokeQuery>,
) -> Response {
    if let Err(response) = check_admin_auth(state.admin_token.as_deref(), &headers) {
        return response;
    }

    let revoked = state.service.revoke_all_for(query.user).await;
    (
        StatusCode::OK,
        Json(json!({"revoked": revoked, "user": query.user})),
    )
        .into_response()
}

/// `GET /health` — Liveness probe, anonymous.
pub(super) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Check the `Authorization: Bearer <token>` header against the configured
/// admin token. Returns `Err(response)` if auth fails.
///
/// The `Err` variant carries the full HTTP response to be returned
/// immediately.
#[allow(clippy::result_large_err)]
fn check_admin_auth(admin_token: Option<&str>, headers: &HeaderMap) -> Result<(), Response> {
    use subtle::ConstantTimeEq;

    let Some(admin_token) = admin_token else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "admin_not_configured",
                "message": "Admin token not configured; revocation endpoint disabled"
            })),
        )
            .into_response());
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        });

    // Constant-time comparison to prevent timing side-channels
    let matches = provided.map_or(false, |p| p.as_bytes().ct_eq(admin_token.as_bytes()).into());

    if matches {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            Json(json!({
                "error": "unauthorized",
                "message": "Invalid admin token"
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    fn headers_with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    // =====================================================================
    // extract_client_ip
    // =====================================================================

    #[test]
    fn client_ip_from_forwarded_for_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );

        assert_eq!(
            extract_client_ip(&headers),
            Some("203.0.113.7".parse().unwrap())
        );
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(
            extract_client_ip(&headers),
            Some("198.51.100.4".parse().unwrap())
        );
    }

    #[test]
    fn unparsable_forwarded_for_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));

        assert_eq!(extract_client_ip(&headers), None);
    }

    // =====================================================================
    // wire shapes
    // =====================================================================

    #[test]
    fn token_response_uses_camel_case_names() {
        // GIVEN: a pair wrapped for the wire
        let response = TokenResponse::from_pair(
            TokenPair {
                access_token: "eyJ.access".to_string(),
                refresh_token: "apy_refresh".to_string(),
            },
            Duration::from_secs(900),
        );

        // WHEN: serialize
        let json = serde_json::to_value(&response).unwrap();

        // THEN: the documented field names and constants appear
        assert_eq!(json["accessToken"], "eyJ.access");
        assert_eq!(json["refreshToken"], "apy_refresh");
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresIn"], 900);
    }

    #[test]
    fn refresh_request_reads_camel_case() {
        let body: RefreshRequest =
            serde_json::from_str(r#"{"refreshToken": "apy_abc"}"#).unwrap();
        assert_eq!(body.refresh_token, "apy_abc");
    }

    #[test]
    fn revoke_query_parses_uuid() {
        let query: RevokeQuery =
            serde_urlencoded::from_str("user=7b1c8a52-3f0e-4d6a-9c1b-2f8e5a7d4c3b").unwrap();
        assert_eq!(
            query.user,
            "7b1c8a52-3f0e-4d6a-9c1b-2f8e5a7d4c3b".parse::<Uuid>().unwrap()
        );
    }

    // =====================================================================
    // check_admin_auth
    // =====================================================================

    #[test]
    fn admin_auth_unconfigured_is_service_unavailable() {
        let headers = headers_with_auth("Bearer anything");
        let err = check_admin_auth(None, &headers).unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn admin_auth_accepts_matching_token() {
        let headers = headers_with_auth("Bearer hive-admin-token");
        assert!(check_admin_auth(Some("hive-admin-token"), &headers).is_ok());
    }

    #[test]
    fn admin_auth_rejects_wrong_token() {
        let headers = headers_with_auth("Bearer wrong");
        let err = check_admin_auth(Some("hive-admin-token"), &headers).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn admin_auth_rejects_missing_header() {
        let headers = HeaderMap::new();
        let err = check_admin_auth(Some("hive-admin-token"), &headers).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
