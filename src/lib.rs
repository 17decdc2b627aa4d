//! OAuth Gate Library
//!
//! Browser-delegated OAuth 2.0 Authorization Code login for interactive
//! web applications.
//!
//! # Features
//!
//! - **Login initiation**: authorization URL with an opaque state token
//! - **Deep-link restore**: pre-login query parameters survive the redirect
//! - **Token exchange**: authorization code traded at the token endpoint
//! - **JWT validation**: RS256 signatures checked against a cached JWKS
//! - **Session lifecycle**: expiry detection, re-login and logout
//!
//! # Flow
//!
//! Each request goes through [`oauth::SessionManager::authenticate`], which
//! either reports the user as authenticated or returns a login link to show.
//! Nothing blocks waiting for the browser: the flow resumes when the provider
//! redirects back with `code` and `state`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod oauth;
pub mod server;

#[cfg(test)]
mod test_support;

pub use config::{OAuthConfig, Settings, validate_config};
pub use error::{Error, Result};
pub use oauth::{AuthOutcome, Notice, SessionManager};

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
