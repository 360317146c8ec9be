//! End-to-end authentication flow tests
//!
//! Drives the full router the way the frontend does:
//! - Password login and the token pair it returns
//! - Bearer-gated routes and mid-lifetime revocation
//! - Refresh rotation (old refresh token dies on use)
//! - Federated handoff redemption (single use)
//! - Admin revocation and the password reset stub

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::read_json;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use apiary_auth::audit::AuditLog;
use apiary_auth::config::{AuthConfig, ThrottleConfig};
use apiary_auth::directory::{self, InMemoryUserDirectory, UserDirectory, UserRecord};
use apiary_auth::handoff::HandoffBroker;
use apiary_auth::http::{AppState, create_router};
use apiary_auth::service::AuthService;
use apiary_auth::session::{InMemorySessionStore, RefreshSessionStore};
use apiary_auth::throttle::RequestThrottle;
use apiary_auth::token::{InMemoryRevocationLedger, RevocationLedger, TokenCodec};

const PASSWORD: &str = "honeycomb-2024";
const ADMIN_TOKEN: &str = "test-admin-token";

struct TestWorld {
    app: Router,
    service: Arc<AuthService>,
    directory: Arc<InMemoryUserDirectory>,
    keeper: UserRecord,
}

/// Full router over in-memory stores, one seeded account, throttle
/// buckets sized so rate limiting never interferes here.
fn seeded_world() -> TestWorld {
    let codec = Arc::new(TokenCodec::new(b"integration-test-secret"));
    let ledger = Arc::new(InMemoryRevocationLedger::new(
        Duration::from_secs(600),
        Duration::from_secs(86_400),
    ));
    let sessions = Arc::new(InMemorySessionStore::new());
    let handoff = Arc::new(HandoffBroker::new(Duration::from_secs(60)));

    let directory = Arc::new(InMemoryUserDirectory::new());
    let keeper = UserRecord {
        id: Uuid::new_v4(),
        email: "keeper@meadow-farm.example".to_string(),
        password_hash: directory::hash_password(PASSWORD).unwrap(),
        role: "KEEPER".to_string(),
        enabled: true,
        locked: false,
    };
    directory.insert(keeper.clone());

    let service = Arc::new(
        AuthService::new(
            codec,
            ledger as Arc<dyn RevocationLedger>,
            sessions as Arc<dyn RefreshSessionStore>,
            Arc::clone(&handoff),
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            AuditLog::spawn(64),
            &AuthConfig::default(),
        )
        .unwrap(),
    );

    let mut throttle_config = ThrottleConfig::default();
    throttle_config.general.capacity = 10_000;
    throttle_config.credential_issuing.capacity = 10_000;
    throttle_config.password_reset.capacity = 10_000;
    let throttle = Arc::new(RequestThrottle::new(&throttle_config));

    let state = Arc::new(AppState {
        service: Arc::clone(&service),
        throttle,
        admin_token: Some(ADMIN_TOKEN.to_string()),
        request_timeout: Duration::from_secs(5),
        max_body_size: 256 * 1024,
    });

    TestWorld {
        app: create_router(state),
        service,
        directory,
        keeper,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

/// Log in as the seeded keeper and return (access, refresh)
async fn login(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"email": "keeper@meadow-farm.example", "password": PASSWORD}),
        ))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    let access = payload["accessToken"].as_str().expect("access").to_string();
    let refresh = payload["refreshToken"]
        .as_str()
        .expect("refresh")
        .to_string();
    (access, refresh)
}

/// Test the login response shape
#[tokio::test]
async fn test_login_returns_token_pair() {
    let world = seeded_world();

    let response = world
        .app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({"email": "keeper@meadow-farm.example", "password": PASSWORD}),
        ))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["tokenType"], "Bearer");
    assert_eq!(payload["expiresIn"], 900);
    assert!(!payload["accessToken"].as_str().unwrap().is_empty());
    assert!(payload["refreshToken"].as_str().unwrap().starts_with("apy_"));
}

/// Wrong password, unknown account and locked account all produce the
/// same 401 so callers cannot probe which addresses exist
#[tokio::test]
async fn test_login_failures_are_uniform() {
    let world = seeded_world();
    world.directory.insert(UserRecord {
        id: Uuid::new_v4(),
        email: "drone@meadow-farm.example".to_string(),
        password_hash: directory::hash_password(PASSWORD).unwrap(),
        role: "KEEPER".to_string(),
        enabled: true,
        locked: true,
    });

    let attempts = [
        json!({"email": "keeper@meadow-farm.example", "password": "wrong"}),
        json!({"email": "nobody@meadow-farm.example", "password": PASSWORD}),
        json!({"email": "drone@meadow-farm.example", "password": PASSWORD}),
    ];

    let mut bodies = Vec::new();
    for attempt in &attempts {
        let response = world
            .app
            .clone()
            .oneshot(post_json("/auth/login", attempt))
            .await
            .expect("login");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
        bodies.push(read_json(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
    assert_eq!(bodies[0]["error"], "unauthorized");
}

/// /auth/me reflects the identity carried in the validated token
#[tokio::test]
async fn test_me_returns_token_identity() {
    let world = seeded_world();
    let (access, _) = login(&world.app).await;

    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["userId"], world.keeper.id.to_string());
    assert_eq!(payload["email"], "keeper@meadow-farm.example");
    assert_eq!(payload["role"], "KEEPER");
}

/// Protected routes reject missing and malformed credentials
#[tokio::test]
async fn test_me_rejects_bad_credentials() {
    let world = seeded_world();

    let bare = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(bare).await.expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", "not-a-real-token"))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json(response).await;
    assert_eq!(payload["message"], "Authentication failed");
}

/// Refresh returns a fresh pair and kills the token that bought it
#[tokio::test]
async fn test_refresh_rotates_session() {
    let world = seeded_world();
    let (_, refresh) = login(&world.app).await;

    let response = world
        .app
        .clone()
        .oneshot(post_json("/auth/refresh", &json!({"refreshToken": refresh})))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    let rotated = payload["refreshToken"].as_str().expect("refresh");
    let access = payload["accessToken"].as_str().expect("access");
    assert_ne!(rotated, refresh);

    // The new access token is live
    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);

    // The spent refresh token is not
    let response = world
        .app
        .clone()
        .oneshot(post_json("/auth/refresh", &json!({"refreshToken": refresh})))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Garbage refresh tokens get the same generic 401
#[tokio::test]
async fn test_refresh_with_unknown_token_fails() {
    let world = seeded_world();

    let response = world
        .app
        .clone()
        .oneshot(post_json(
            "/auth/refresh",
            &json!({"refreshToken": "apy_fabricated"}),
        ))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json(response).await;
    assert_eq!(payload["error"], "unauthorized");
}

/// Logout denylists the presented access token and wipes every refresh
/// session, so both halves of the pair die together
#[tokio::test]
async fn test_logout_revokes_both_tokens() {
    let world = seeded_world();
    let (access, refresh) = login(&world.app).await;

    let logout = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(logout).await.expect("logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The access token is cryptographically valid for another 15 minutes,
    // but the denylist kills it now
    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = world
        .app
        .clone()
        .oneshot(post_json("/auth/refresh", &json!({"refreshToken": refresh})))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// A parked federated pair can be collected exactly once
#[tokio::test]
async fn test_exchange_token_is_single_use() {
    let world = seeded_world();

    let redirect = world
        .service
        .complete_federated_login("keeper@meadow-farm.example")
        .await
        .expect("federated login");
    let state_id = redirect
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state param");

    let uri = format!("/exchange-token?state={state_id}");
    let first = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(first).await.expect("exchange");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert!(!payload["accessToken"].as_str().unwrap().is_empty());
    assert!(payload["refreshToken"].as_str().unwrap().starts_with("apy_"));

    // Second collection finds nothing
    let again = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(again).await.expect("exchange");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json(response).await;
    assert_eq!(payload["error"], "not_found");
}

/// Never-issued state ids are indistinguishable from spent ones
#[tokio::test]
async fn test_exchange_token_unknown_state() {
    let world = seeded_world();

    let request = Request::builder()
        .method("GET")
        .uri("/exchange-token?state=never-issued")
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(request).await.expect("exchange");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Admin revocation requires the shared token and wipes the target's sessions
#[tokio::test]
async fn test_admin_revoke() {
    let world = seeded_world();
    let (_, refresh) = login(&world.app).await;
    let uri = format!("/admin/revoke?user={}", world.keeper.id);

    // No credentials
    let bare = Request::builder()
        .method("POST")
        .uri(&uri)
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(bare).await.expect("revoke");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong credentials
    let wrong = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(wrong).await.expect("revoke");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct credentials
    let authed = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(authed).await.expect("revoke");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["revoked"], 1);
    assert_eq!(payload["user"], world.keeper.id.to_string());

    // The wiped session no longer refreshes
    let response = world
        .app
        .clone()
        .oneshot(post_json("/auth/refresh", &json!({"refreshToken": refresh})))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Password reset acknowledges known and unknown addresses identically
#[tokio::test]
async fn test_password_reset_is_indistinguishable() {
    let world = seeded_world();

    let mut bodies = Vec::new();
    for email in ["keeper@meadow-farm.example", "nobody@meadow-farm.example"] {
        let response = world
            .app
            .clone()
            .oneshot(post_json("/auth/password-reset", &json!({"email": email})))
            .await
            .expect("reset");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        bodies.push(read_json(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);
}

/// Disabling an account invalidates its live access tokens immediately
#[tokio::test]
async fn test_disabled_account_dies_mid_token_lifetime() {
    let world = seeded_world();
    let (access, _) = login(&world.app).await;

    world.directory.insert(UserRecord {
        enabled: false,
        ..world.keeper.clone()
    });

    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Health stays reachable without credentials
#[tokio::test]
async fn test_health_is_public() {
    let world = seeded_world();

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(request).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    assert_eq!(payload["status"], "ok");
}

/// Full lifecycle: login, rotate, use the rotated pair, logout, then
/// every credential issued along the way is dead
#[tokio::test]
async fn test_full_lifecycle() {
    let world = seeded_world();
    let (first_access, first_refresh) = login(&world.app).await;

    // Rotate
    let response = world
        .app
        .clone()
        .oneshot(post_json(
            "/auth/refresh",
            &json!({"refreshToken": first_refresh}),
        ))
        .await
        .expect("refresh");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let second_access = payload["accessToken"].as_str().expect("access").to_string();
    let second_refresh = payload["refreshToken"]
        .as_str()
        .expect("refresh")
        .to_string();

    // The rotated access token works
    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &second_access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);

    // Logout with the rotated access token
    let logout = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {second_access}"))
        .body(Body::empty())
        .expect("request");
    let response = world.app.clone().oneshot(logout).await.expect("logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The denylisted access token and both refresh tokens are dead
    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &second_access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for refresh in [&first_refresh, &second_refresh] {
        let response = world
            .app
            .clone()
            .oneshot(post_json("/auth/refresh", &json!({"refreshToken": refresh})))
            .await
            .expect("refresh");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Logout denylists only the bearer it was called with. The earlier
    // access token was never presented, so it rides out its own short TTL.
    let response = world
        .app
        .clone()
        .oneshot(get_with_bearer("/auth/me", &first_access))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);

    // A fresh login still works; revocation is per-credential, not per-account
    let (_, _) = login(&world.app).await;
}

/// Bodies above the configured cap are rejected before parsing
#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let world = seeded_world();

    let huge = format!(
        "{{\"email\": \"keeper@meadow-farm.example\", \"password\": \"{}\"}}",
        "a".repeat(300 * 1024)
    );
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(huge))
        .expect("request");
    let response = world.app.clone().oneshot(request).await.expect("login");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
