//! OAuth Gate - browser-delegated OAuth 2.0 Authorization Code login
//!
//! Runs the demonstration server or inspects a provider configuration.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use oauth_gate::{
    Settings,
    cli::{Cli, Command},
    oauth::{CorrelationCache, QueryParams, begin_login},
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&settings, cli.provider.as_deref()),
        Some(Command::LoginUrl) => run_login_url(&settings, cli.provider.as_deref()),
        Some(Command::Serve { port, host }) => {
            run_server(settings, cli.provider.as_deref(), port, host).await
        }
        None => run_server(settings, cli.provider.as_deref(), None, None).await,
    }
}

/// Report missing required keys
fn run_check_config(settings: &Settings, provider: Option<&str>) -> ExitCode {
    let config = match settings.oauth_block(provider) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let missing = config.missing_keys();
    if missing.is_empty() {
        println!("✅ OAuth configuration complete");
        ExitCode::SUCCESS
    } else {
        println!("❌ Missing required keys:");
        for key in missing {
            println!("   {key}");
        }
        ExitCode::FAILURE
    }
}

/// Print an authorization URL with a fresh state
fn run_login_url(settings: &Settings, provider: Option<&str>) -> ExitCode {
    let login = settings
        .oauth_block(provider)
        .and_then(|config| {
            config.ensure_valid()?;
            begin_login(config, &QueryParams::new(), &CorrelationCache::default(), None)
        });

    match login {
        Ok(login) => {
            println!("{}", login.url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    mut settings: Settings,
    provider: Option<&str>,
    port: Option<u16>,
    host: Option<String>,
) -> ExitCode {
    // Apply CLI overrides
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %settings.server.host,
        port = settings.server.port,
        providers = settings.oauth.len(),
        "Starting OAuth gate"
    );

    if let Err(e) = server::run(&settings, provider).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
