//! Error types for OAuth Gate

use std::io;

use thiserror::Error;

/// Result type alias for OAuth Gate
pub type Result<T> = std::result::Result<T, Error>;

/// OAuth Gate errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing or unreadable provider settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token exchange failed at the transport level or with a non-2xx status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Signing key could not be resolved from the provider's key set
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// JWT decoding or verification error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Session storage error in the web host
    #[error("Session error: {0}")]
    Session(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must stop the request cycle instead of sending the
    /// user back to the login link.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
