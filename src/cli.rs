//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Apiary Auth - Authentication and session service for hive monitoring
#[derive(Parser, Debug)]
#[command(name = "apiary-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "APIARY_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "APIARY_AUTH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "APIARY_AUTH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "APIARY_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "APIARY_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the auth server (default)
    Serve,

    /// Hash a password for the `users` section of the config file
    HashPassword {
        /// Password to hash
        #[arg(required = true)]
        password: String,
    },
}
