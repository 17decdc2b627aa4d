//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OAuth Gate - browser-delegated OAuth 2.0 login for web applications
#[derive(Parser, Debug)]
#[command(name = "oauth-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "OAUTH_GATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Name of the provider block to use
    #[arg(long, env = "OAUTH_GATE_PROVIDER", global = true)]
    pub provider: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "OAUTH_GATE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "OAUTH_GATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the demonstration server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "OAUTH_GATE_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "OAUTH_GATE_HOST")]
        host: Option<String>,
    },

    /// Report required keys missing from the provider block
    CheckConfig,

    /// Print a freshly generated authorization URL
    LoginUrl,
}
