//! Apiary Auth - Authentication and session service
//!
//! Issues, refreshes and revokes the credentials every other Apiary service
//! trusts.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use apiary_auth::{
    cli::{Cli, Command},
    config::Config,
    directory,
    http::AuthServer,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Handle subcommands
    match cli.command {
        Some(Command::HashPassword { ref password }) => run_hash_password(password),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Hash a password for the config file's `users` section
fn run_hash_password(password: &str) -> ExitCode {
    match directory::hash_password(password) {
        Ok(hash) => {
            println!("{hash}");
            println!();
            println!("💡 Tip: Add it to the users section of your config:");
            println!("  - email: keeper@meadow-farm.example");
            println!("    password_hash: \"{hash}\"");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to hash password: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the auth server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        users = config.users.len(),
        "Starting Apiary Auth"
    );

    // Run with graceful shutdown
    let server = AuthServer::new(config);
    if let Err(e) = server.run().await {
        error!("Auth server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Auth server stopped");
    ExitCode::SUCCESS
}
