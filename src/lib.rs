//! Apiary Auth Library
//!
//! Authentication and session lifecycle service for the Apiary hive-monitoring
//! platform.
//!
//! # Features
//!
//! - **Password Login**: bcrypt-checked credentials exchanged for a token pair
//! - **Stateless Access Tokens**: short-lived HS256 JWTs verified without a store lookup
//! - **Refresh Rotation**: opaque single-use refresh tokens, replaced on every refresh
//! - **Revocation**: per-token denylist and per-user session wipe, honored mid-lifetime
//! - **Federated Handoff**: single-use state ids keep tokens out of redirect URLs
//! - **Throttling**: per-client token buckets with tighter budgets on credential routes
//! - **Audit Trail**: structured security events that never block a request

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod handoff;
pub mod http;
pub mod service;
pub mod session;
pub mod throttle;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
