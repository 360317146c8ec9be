//! Auth server: store bootstrap, background maintenance and graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::router::{AppState, create_router};
use crate::audit::AuditLog;
use crate::config::Config;
use crate::directory::{InMemoryUserDirectory, UserDirectory, UserRecord};
use crate::handoff::HandoffBroker;
use crate::service::AuthService;
use crate::session::{InMemorySessionStore, RefreshSessionStore};
use crate::throttle::RequestThrottle;
use crate::token::{InMemoryRevocationLedger, RevocationLedger, TokenCodec};
use crate::{Error, Result};

/// Apiary authentication server
pub struct AuthServer {
    /// Configuration
    config: Config,
    /// Shutdown broadcast
    shutdown_tx: Option<tokio::sync::broadcast::Sender<()>>,
}

impl AuthServer {
    /// Create a new server from loaded configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown_tx: None,
        }
    }

    /// Run the server until ctrl-c or SIGTERM.
    ///
    /// # Errors
    ///
    /// Configuration problems (unparsable host, missing secret env var,
    /// invalid redirect URL) and bind failures surface here; everything
    /// after startup is handled per request.
    pub async fn run(mut self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        // Create shutdown channel
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        // Shared stores
        let secret = self.config.auth.resolve_jwt_secret()?;
        if self.config.auth.jwt_secret == "auto" {
            warn!("jwt_secret is 'auto'; issued tokens will not survive a restart");
        }
        let codec = Arc::new(TokenCodec::new(secret.as_bytes()));
        let ledger = Arc::new(InMemoryRevocationLedger::new(
            self.config.auth.revocation_min_ttl,
            self.config.auth.revocation_fallback_ttl,
        ));
        let sessions = Arc::new(InMemorySessionStore::new());
        let handoff = Arc::new(HandoffBroker::new(self.config.auth.handoff_ttl));

        let directory = Arc::new(InMemoryUserDirectory::new());
        for seed in &self.config.users {
            directory.insert(UserRecord {
                id: Uuid::new_v4(),
                email: seed.email.clone(),
                password_hash: seed.password_hash.clone(),
                role: seed.role.clone(),
                enabled: seed.enabled,
                locked: seed.locked,
            });
            info!(email = %seed.email, role = %seed.role, "Seeded user");
        }
        if directory.is_empty() {
            warn!("No users configured, every password login will fail");
        }

        let audit = AuditLog::spawn(self.config.audit.buffer);
        let throttle = Arc::new(RequestThrottle::new(&self.config.throttle));
        let service = Arc::new(AuthService::new(
            codec,
            Arc::clone(&ledger) as Arc<dyn RevocationLedger>,
            Arc::clone(&sessions) as Arc<dyn RefreshSessionStore>,
            Arc::clone(&handoff),
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            audit,
            &self.config.auth,
        )?);

        // Background maintenance: one loop sweeps every store. Expired
        // entries are also dropped lazily on read, so the sweep only bounds
        // memory for entries nobody touches again.
        let ledger_sweep = Arc::clone(&ledger);
        let sessions_sweep = Arc::clone(&sessions);
        let handoff_sweep = Arc::clone(&handoff);
        let throttle_sweep = Arc::clone(&throttle);
        let sweep_every = self.config.maintenance_interval;
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let revocations = ledger_sweep.reap_expired().await;
                        let sessions_reaped = sessions_sweep.reap_expired().await;
                        let handoffs = handoff_sweep.evict_expired();
                        throttle_sweep.sweep_idle();
                        if revocations + sessions_reaped + handoffs > 0 {
                            debug!(
                                revocations,
                                sessions = sessions_reaped,
                                handoffs,
                                "Maintenance sweep"
                            );
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        let admin_token = self.config.admin.resolve_token();
        let state = Arc::new(AppState {
            service,
            throttle,
            admin_token: admin_token.clone(),
            request_timeout: self.config.server.request_timeout,
            max_body_size: self.config.server.max_body_size,
        });
        let app = create_router(state);

        // Bind listener
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("APIARY AUTH v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!(users = directory.len(), "User directory seeded");

        if admin_token.is_some() {
            info!("ADMIN revocation enabled (POST /admin/revoke)");
        } else {
            warn!("Admin token not configured, POST /admin/revoke answers 503");
        }

        if self.config.throttle.enabled {
            info!(
                general = self.config.throttle.general.capacity,
                credential_issuing = self.config.throttle.credential_issuing.capacity,
                password_reset = self.config.throttle.password_reset.capacity,
                "THROTTLING enabled (burst capacity per class)"
            );
        } else {
            warn!("THROTTLING disabled, credential endpoints are open to floods");
        }
        info!("============================================================");

        // Run server with graceful shutdown. The connect-info make-service
        // gives the throttle a peer address to key on when no proxy header
        // is present.
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
