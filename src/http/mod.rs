//! HTTP surface: router, handlers, authentication gate and server loop.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

pub mod gate;
pub mod handlers;
pub mod router;
pub mod server;

pub use gate::{BearerToken, CurrentUser};
pub use router::{AppState, create_router};
pub use server::AuthServer;

impl IntoResponse for Error {
    /// Map the error taxonomy onto HTTP.
    ///
    /// Every credential failure collapses into the same generic 401 so the
    /// response cannot be used as an oracle for which check failed. The
    /// precise reason stays on the server side of the log.
    fn into_response(self) -> Response {
        if self.is_auth_failure() {
            tracing::debug!(reason = %self, "Authentication rejected");
            return (
                StatusCode::UNAUTHORIZED,
                [("WWW-Authenticate", "Bearer")],
                Json(json!({
                    "error": "unauthorized",
                    "message": "Authentication failed"
                })),
            )
                .into_response();
        }

        match self {
            // Plain text advisory, deliberately without a Retry-After
            // header: clients get no refill schedule to aim at.
            Error::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests, please slow down.")
                    .into_response()
            }
            Error::HandoffNotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "not_found",
                    "message": "Exchange ticket not found or already redeemed"
                })),
            )
                .into_response(),
            err => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal",
                        "message": "Internal server error"
                    })),
                )
                    .into_response()
            }
        }
    }
}
