//! Router assembly and shared application state.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::gate::bearer_gate;
use super::handlers;
use crate::service::AuthService;
use crate::throttle::{RequestThrottle, throttle_middleware};

/// Shared application state
pub struct AppState {
    /// Authentication flows.
    pub service: Arc<AuthService>,
    /// Pre-authentication request throttle.
    pub throttle: Arc<RequestThrottle>,
    /// Resolved admin bearer token; `None` disables `/admin/revoke`.
    pub admin_token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Request body cap in bytes.
    pub max_body_size: usize,
}

/// Create the router.
///
/// Layer order, outermost first: trace, timeout, panic catcher, throttle,
/// then the per-route stack. The throttle runs before the bearer gate so
/// unauthenticated floods are priced before any signature check; the gate
/// wraps only the protected subset.
pub fn create_router(state: Arc<AppState>) -> Router {
    let service = Arc::clone(&state.service);
    let throttle = Arc::clone(&state.throttle);
    let request_timeout = state.request_timeout;

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(service, bearer_gate));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/password-reset", post(handlers::password_reset))
        .route("/exchange-token", get(handlers::exchange_token))
        .route("/admin/revoke", post(handlers::admin_revoke))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.max_body_size))
        .layer(middleware::from_fn_with_state(throttle, throttle_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
