//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving secrets.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `env:VAR` references
    /// and `${VAR}` expansion.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token and session configuration
    pub auth: AuthConfig,
    /// Per-client request throttling
    pub throttle: ThrottleConfig,
    /// Admin endpoint configuration
    pub admin: AdminConfig,
    /// Audit trail configuration
    pub audit: AuditConfig,
    /// Accounts seeded into the in-memory directory at startup
    #[serde(default)]
    pub users: Vec<SeedUserConfig>,
    /// Interval between background sweeps of the token, session, handoff
    /// and throttle stores
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: Vec::new(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            throttle: ThrottleConfig::default(),
            admin: AdminConfig::default(),
            audit: AuditConfig::default(),
            users: Vec::new(),
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8642,
            request_timeout: Duration::from_secs(30),
            max_body_size: 256 * 1024, // 256KB, auth payloads are small
        }
    }
}

/// Token and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing access tokens.
    /// Supports: literal value, `env:VAR_NAME`, or `auto` (generates an
    /// ephemeral secret at startup; tokens do not survive a restart).
    pub jwt_secret: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Refresh session lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    /// Minimum time a revocation entry is retained
    #[serde(with = "humantime_serde")]
    pub revocation_min_ttl: Duration,
    /// Retention for revoked tokens whose expiry cannot be read
    #[serde(with = "humantime_serde")]
    pub revocation_fallback_ttl: Duration,
    /// Lifetime of parked federated-login token pairs
    #[serde(with = "humantime_serde")]
    pub handoff_ttl: Duration,
    /// Frontend URL that receives the federated-login state id.
    /// Supports `${VAR}` and `${VAR:-default}` expansion.
    pub frontend_redirect_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "auto".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            revocation_min_ttl: Duration::from_secs(10 * 60),
            revocation_fallback_ttl: Duration::from_secs(24 * 60 * 60),
            handoff_ttl: Duration::from_secs(60),
            frontend_redirect_url: "http://localhost:5173/auth/callback".to_string(),
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret (expand env refs, generate if `auto`).
    ///
    /// Unlike the admin token, an unresolvable secret is a hard error:
    /// falling back to the literal `env:VAR` string would sign every token
    /// with a guessable value.
    ///
    /// # Errors
    ///
    /// Returns an error if an `env:VAR_NAME` reference names an unset
    /// variable, or if the resolved secret is empty.
    pub fn resolve_jwt_secret(&self) -> Result<String> {
        let secret = if self.jwt_secret == "auto" {
            // Generate a random secret
            use rand::RngExt;
            let random_bytes: [u8; 32] = rand::rng().random();
            base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                random_bytes,
            )
        } else if let Some(var_name) = self.jwt_secret.strip_prefix("env:") {
            env::var(var_name).map_err(|_| {
                Error::Config(format!(
                    "jwt_secret references unset environment variable: {var_name}"
                ))
            })?
        } else {
            self.jwt_secret.clone()
        };

        if secret.is_empty() {
            return Err(Error::Config("jwt_secret must not be empty".to_string()));
        }
        Ok(secret)
    }
}

/// Per-client request throttling configuration.
///
/// Each route class gets its own token bucket per client; see
/// [`crate::throttle`] for the classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Enable request throttling
    pub enabled: bool,
    /// Budget for ordinary API traffic
    pub general: BucketConfig,
    /// Budget for routes that mint credentials (login, refresh, exchange)
    pub credential_issuing: BucketConfig,
    /// Budget for password reset requests
    pub password_reset: BucketConfig,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            general: BucketConfig {
                capacity: 100,
                refill: 100,
                window: Duration::from_secs(60),
            },
            credential_issuing: BucketConfig {
                capacity: 10,
                refill: 10,
                window: Duration::from_secs(60),
            },
            password_reset: BucketConfig {
                capacity: 3,
                refill: 3,
                window: Duration::from_secs(15 * 60),
            },
        }
    }
}

/// One token bucket: bursts up to `capacity`, refills `refill` tokens
/// per `window`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Burst capacity
    pub capacity: u32,
    /// Tokens restored per window
    pub refill: u32,
    /// Refill window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Admin endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token guarding `/admin/revoke`. Unset disables the endpoint.
    /// Supports: literal value, `env:VAR_NAME`, or `auto`.
    pub bearer_token: Option<String>,
}

impl AdminConfig {
    /// Resolve the admin token (expand env vars, generate if `auto`)
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|token| {
            if token == "auto" {
                // Generate a random token
                use rand::RngExt;
                let random_bytes: [u8; 32] = rand::rng().random();
                let generated = format!(
                    "apy_admin_{}",
                    base64::Engine::encode(
                        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                        random_bytes
                    )
                );
                tracing::info!("Auto-generated admin token: {generated}");
                generated
            } else if let Some(var_name) = token.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| token.clone())
            } else {
                token.clone()
            }
        })
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Event buffer size. When the buffer is full, events are dropped
    /// and counted rather than blocking the request that produced them.
    pub buffer: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { buffer: 1024 }
    }
}

/// An account seeded into the in-memory directory at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUserConfig {
    /// Email address (the login identifier)
    pub email: String,
    /// bcrypt hash of the password (generate with `apiary-auth hash-password`)
    pub password_hash: String,
    /// Role carried in issued tokens
    #[serde(default = "default_role")]
    pub role: String,
    /// Whether the account may log in
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the account is administratively locked
    #[serde(default)]
    pub locked: bool,
}

fn default_role() -> String {
    "KEEPER".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (APIARY_AUTH_ prefix)
        figment = figment.merge(Env::prefixed("APIARY_AUTH_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in deployment-specific values
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        self.auth.frontend_redirect_url =
            Self::expand_string(&re, &self.auth.frontend_redirect_url);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}
